//! Stacks reads through the Hiro API: USDCx balance and vault history

use std::collections::HashMap;

use eyre::{Result, WrapErr};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::NetworkContracts;

/// Vault contract call kinds, by public function name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultTxType {
    Deposit,
    InstantWithdraw,
    RequestWithdrawal,
    Withdraw,
}

impl VaultTxType {
    fn from_function(name: &str) -> Option<Self> {
        match name {
            "deposit" => Some(VaultTxType::Deposit),
            "instant-withdraw" => Some(VaultTxType::InstantWithdraw),
            "request-withdrawal" => Some(VaultTxType::RequestWithdrawal),
            "process-withdrawal" => Some(VaultTxType::Withdraw),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultTxStatus {
    Success,
    Pending,
    Failed,
}

/// One vault interaction from the account's history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultTransaction {
    pub tx_id: String,
    pub kind: VaultTxType,
    pub status: VaultTxStatus,
    pub block_height: Option<u64>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalancesResponse {
    #[serde(default)]
    fungible_tokens: HashMap<String, TokenBalance>,
}

#[derive(Debug, Deserialize)]
struct TokenBalance {
    balance: String,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    #[serde(default)]
    results: Vec<AccountTx>,
}

#[derive(Debug, Deserialize)]
struct AccountTx {
    tx_id: String,
    tx_type: String,
    tx_status: String,
    block_height: Option<u64>,
    burn_block_time_iso: Option<String>,
    contract_call: Option<ContractCall>,
}

#[derive(Debug, Deserialize)]
struct ContractCall {
    contract_id: String,
    function_name: String,
}

/// Hiro history page size
const HISTORY_LIMIT: u32 = 50;

pub struct StacksClient {
    client: Client,
    api_url: String,
    usdcx_token_key: String,
    vault_contract: Option<String>,
}

impl StacksClient {
    pub fn new(client: Client, api_url: impl Into<String>, contracts: &NetworkContracts) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            usdcx_token_key: contracts.usdcx_token_key(),
            vault_contract: contracts.vault_contract.clone(),
        }
    }

    /// USDCx balance in base units; an account without the token holds zero
    pub async fn usdcx_balance(&self, address: &str) -> Result<u128> {
        let url = format!("{}/extended/v1/address/{}/balances", self.api_url, address);
        let resp: BalancesResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .wrap_err("Failed to parse Hiro balances")?;

        let Some(entry) = resp.fungible_tokens.get(&self.usdcx_token_key) else {
            return Ok(0);
        };
        let balance: u128 = entry
            .balance
            .parse()
            .wrap_err_with(|| format!("Invalid USDCx balance: {}", entry.balance))?;
        debug!(address = %address, %balance, "USDCx balance");
        Ok(balance)
    }

    /// Recent vault contract calls made by `address`, newest first
    pub async fn vault_transactions(&self, address: &str) -> Result<Vec<VaultTransaction>> {
        let Some(vault) = &self.vault_contract else {
            return Ok(Vec::new());
        };

        let url = format!(
            "{}/extended/v1/address/{}/transactions",
            self.api_url, address
        );
        let resp: TransactionsResponse = self
            .client
            .get(&url)
            .query(&[("limit", HISTORY_LIMIT)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .wrap_err("Failed to parse Hiro transactions")?;

        Ok(resp
            .results
            .into_iter()
            .filter(|tx| tx.tx_type == "contract_call")
            .filter_map(|tx| {
                let call = tx.contract_call.as_ref()?;
                if &call.contract_id != vault {
                    return None;
                }
                let kind = VaultTxType::from_function(&call.function_name)?;
                let status = match tx.tx_status.as_str() {
                    "success" => VaultTxStatus::Success,
                    "pending" => VaultTxStatus::Pending,
                    _ => VaultTxStatus::Failed,
                };
                Some(VaultTransaction {
                    tx_id: tx.tx_id,
                    kind,
                    status,
                    block_height: tx.block_height,
                    timestamp: tx.burn_block_time_iso,
                })
            })
            .collect())
    }
}
