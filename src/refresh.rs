//! Balance and position refresh after a completed transaction
//!
//! Refresh is best effort: each query failure is logged and that field is
//! left empty in the snapshot. Nothing here is ever surfaced as an error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::amount::format_usdc;
use crate::chains::{EthereumClient, StacksClient, VaultTransaction};
use crate::types::ConnectedAccounts;

#[async_trait]
pub trait AccountRefresher: Send + Sync {
    async fn refresh(&self, accounts: &ConnectedAccounts);
}

/// Latest balances for the connected accounts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub usdc: Option<u128>,
    /// USDC approved for the xReserve contract
    pub usdc_allowance: Option<u128>,
    pub usdcx: Option<u128>,
    pub vault_history: Vec<VaultTransaction>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl BalanceSnapshot {
    pub fn summary(&self) -> String {
        let show = |v: Option<u128>| v.map(format_usdc).unwrap_or_else(|| "-".to_string());
        format!(
            "USDC {} (approved {}), USDCx {}, {} vault txs",
            show(self.usdc),
            show(self.usdc_allowance),
            show(self.usdcx),
            self.vault_history.len()
        )
    }
}

/// Queries both chains and keeps the last snapshot
pub struct DashboardRefresher {
    ethereum: EthereumClient,
    stacks: StacksClient,
    latest: RwLock<BalanceSnapshot>,
}

impl DashboardRefresher {
    pub fn new(ethereum: EthereumClient, stacks: StacksClient) -> Self {
        Self {
            ethereum,
            stacks,
            latest: RwLock::new(BalanceSnapshot::default()),
        }
    }

    pub async fn snapshot(&self) -> BalanceSnapshot {
        self.latest.read().await.clone()
    }

    /// Query everything available for `accounts` without storing it
    pub async fn fetch(&self, accounts: &ConnectedAccounts) -> BalanceSnapshot {
        let mut snapshot = BalanceSnapshot {
            refreshed_at: Some(Utc::now()),
            ..Default::default()
        };

        if let Some(owner) = &accounts.ethereum {
            snapshot.usdc = self
                .ethereum
                .usdc_balance(owner)
                .await
                .map_err(|e| warn!(error = %e, owner = %owner, "Failed to refresh USDC balance"))
                .ok();
            snapshot.usdc_allowance = self
                .ethereum
                .usdc_allowance(owner)
                .await
                .map_err(|e| warn!(error = %e, owner = %owner, "Failed to refresh USDC allowance"))
                .ok();
        }

        if let Some(address) = &accounts.stacks {
            snapshot.usdcx = self
                .stacks
                .usdcx_balance(address)
                .await
                .map_err(|e| warn!(error = %e, address = %address, "Failed to refresh USDCx balance"))
                .ok();
            snapshot.vault_history = self
                .stacks
                .vault_transactions(address)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, address = %address, "Failed to refresh vault history");
                    Vec::new()
                });
        }

        snapshot
    }
}

#[async_trait]
impl AccountRefresher for DashboardRefresher {
    async fn refresh(&self, accounts: &ConnectedAccounts) {
        if accounts.is_empty() {
            return;
        }
        let snapshot = self.fetch(accounts).await;
        debug!(summary = %snapshot.summary(), "Balances refreshed");
        *self.latest.write().await = snapshot;
    }
}
