//! Common types for tracked cross-chain operations
//!
//! The JSON shape of [`PendingTransaction`] matches what the dashboard kept in
//! browser storage, so an exported `pendingTxs` array loads unchanged.

use chrono::{DateTime, TimeZone, Utc};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Network
// ============================================================================

/// Deployment the tracker is pointed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Testnet,
    Mainnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Network {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            other => Err(eyre!("Unknown network: {}", other)),
        }
    }
}

// ============================================================================
// Transaction Classification
// ============================================================================

/// What a tracked transaction does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TxKind {
    /// Ethereum USDC -> Stacks USDCx via xReserve
    Bridge,
    /// Stacks USDCx burn -> Ethereum USDC
    BridgeBack,
    /// USDCx deposit into the vault
    Deposit,
    /// Vault withdrawal
    Withdraw,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Bridge => "bridge",
            TxKind::BridgeBack => "bridge-back",
            TxKind::Deposit => "deposit",
            TxKind::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TxKind {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bridge" => Ok(TxKind::Bridge),
            "bridge-back" => Ok(TxKind::BridgeBack),
            "deposit" => Ok(TxKind::Deposit),
            "withdraw" => Ok(TxKind::Withdraw),
            other => Err(eyre!("Unknown transaction kind: {}", other)),
        }
    }
}

/// Chain a transaction was submitted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OriginChain {
    #[serde(rename = "eth")]
    Ethereum,
    #[serde(rename = "stacks")]
    Stacks,
}

impl OriginChain {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginChain::Ethereum => "eth",
            OriginChain::Stacks => "stacks",
        }
    }
}

impl fmt::Display for OriginChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OriginChain {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eth" | "ethereum" => Ok(OriginChain::Ethereum),
            "stacks" => Ok(OriginChain::Stacks),
            other => Err(eyre!("Unknown origin chain: {}", other)),
        }
    }
}

/// Lifecycle of a tracked transaction
///
/// `Confirming` is representable (and persisted if present) but the poller
/// never moves a record into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirming,
    Completed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirming => "confirming",
            TxStatus::Completed => "completed",
            TxStatus::Failed => "failed",
        }
    }

    /// Completed and Failed never change again and may be dismissed
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Completed | TxStatus::Failed)
    }

    /// Label shown next to a record
    pub fn label(&self) -> &'static str {
        match self {
            TxStatus::Pending => "Confirming...",
            TxStatus::Confirming => "Processing...",
            TxStatus::Completed => "Completed",
            TxStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Pending Transaction Record
// ============================================================================

/// One in-flight cross-chain operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    /// Client-assigned opaque identifier
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TxKind,
    #[serde(rename = "txType")]
    pub origin_chain: OriginChain,
    pub tx_hash: String,
    /// Decimal amount, display only
    pub amount: String,
    pub status: TxStatus,
    /// Creation time in epoch milliseconds
    pub start_time: i64,
    pub message: String,
}

impl PendingTransaction {
    /// Creation time; out-of-range timestamps clamp to the earliest date
    pub fn started_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.start_time)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Time since creation; zero if the start time lies in the future
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        let elapsed_ms = now.timestamp_millis().saturating_sub(self.start_time);
        Duration::from_millis(elapsed_ms.max(0) as u64)
    }

    /// Whole minutes since creation, rounded to nearest
    pub fn minutes_ago(&self, now: DateTime<Utc>) -> u64 {
        (self.age(now).as_millis() as f64 / 60_000.0).round() as u64
    }

    pub fn is_stale(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.age(now) >= retention
    }

    /// Block explorer link for the origin transaction
    pub fn explorer_url(&self, network: Network) -> String {
        match (self.origin_chain, network) {
            (OriginChain::Ethereum, Network::Mainnet) => {
                format!("https://etherscan.io/tx/{}", self.tx_hash)
            }
            (OriginChain::Ethereum, Network::Testnet) => {
                format!("https://sepolia.etherscan.io/tx/{}", self.tx_hash)
            }
            (OriginChain::Stacks, network) => format!(
                "https://explorer.hiro.so/txid/{}?chain={}",
                self.tx_hash, network
            ),
        }
    }
}

impl fmt::Display for PendingTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}, {}) {}",
            self.id,
            self.message,
            self.origin_chain,
            self.status.label(),
            self.tx_hash
        )
    }
}

/// Input for creating a tracked record; id and start time are assigned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPendingTransaction {
    pub kind: TxKind,
    pub origin_chain: OriginChain,
    pub tx_hash: String,
    pub amount: String,
    pub message: String,
}

impl NewPendingTransaction {
    /// Record for an xReserve deposit submitted on Ethereum
    pub fn bridge(tx_hash: impl Into<String>, amount: impl Into<String>) -> Self {
        let amount = amount.into();
        Self {
            kind: TxKind::Bridge,
            origin_chain: OriginChain::Ethereum,
            tx_hash: tx_hash.into(),
            message: format!("Bridging ${} USDC → Stacks", amount),
            amount,
        }
    }

    /// Record for any transaction submitted on Stacks
    pub fn stacks(kind: TxKind, tx_hash: impl Into<String>, amount: impl Into<String>) -> Self {
        let amount = amount.into();
        let message = match kind {
            TxKind::BridgeBack => format!("Bridging ${} USDCx → Ethereum", amount),
            TxKind::Deposit => format!("Depositing ${} USDCx to vault", amount),
            TxKind::Withdraw => format!("Withdrawing ${} from vault", amount),
            TxKind::Bridge => format!("Bridging ${} USDC → Stacks", amount),
        };
        Self {
            kind,
            origin_chain: OriginChain::Stacks,
            tx_hash: tx_hash.into(),
            amount,
            message,
        }
    }
}

/// Accounts whose balances should be refreshed after a completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectedAccounts {
    pub ethereum: Option<String>,
    pub stacks: Option<String>,
}

impl ConnectedAccounts {
    pub fn is_empty(&self) -> bool {
        self.ethereum.is_none() && self.stacks.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(start_time: i64) -> PendingTransaction {
        PendingTransaction {
            id: "abc123".to_string(),
            kind: TxKind::BridgeBack,
            origin_chain: OriginChain::Stacks,
            tx_hash: "0xfeed".to_string(),
            amount: "12.5".to_string(),
            status: TxStatus::Pending,
            start_time,
            message: "Bridging $12.5 USDCx → Ethereum".to_string(),
        }
    }

    #[test]
    fn test_record_json_matches_dashboard_shape() {
        let json = serde_json::to_value(sample(1_700_000_000_000)).unwrap();
        assert_eq!(json["type"], "bridge-back");
        assert_eq!(json["txType"], "stacks");
        assert_eq!(json["txHash"], "0xfeed");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["startTime"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_record_parses_dashboard_json() {
        let raw = r#"{"id":"k3j2l","type":"bridge","txHash":"0xabc","txType":"eth",
            "amount":"5","status":"confirming","startTime":1700000000000,
            "message":"Bridging $5 USDC → Stacks"}"#;
        let tx: PendingTransaction = serde_json::from_str(raw).unwrap();
        assert_eq!(tx.kind, TxKind::Bridge);
        assert_eq!(tx.origin_chain, OriginChain::Ethereum);
        assert_eq!(tx.status, TxStatus::Confirming);
    }

    #[test]
    fn test_status_terminal() {
        assert!(!TxStatus::Pending.is_terminal());
        assert!(!TxStatus::Confirming.is_terminal());
        assert!(TxStatus::Completed.is_terminal());
        assert!(TxStatus::Failed.is_terminal());
    }

    #[test]
    fn test_age_and_staleness() {
        let now = Utc.timestamp_millis_opt(1_700_007_200_000).unwrap();
        let tx = sample(1_700_000_000_000);
        assert_eq!(tx.age(now), Duration::from_secs(7200));
        assert_eq!(tx.minutes_ago(now), 120);
        assert!(tx.is_stale(now, Duration::from_secs(7200)));
        assert!(!tx.is_stale(now, Duration::from_secs(7201)));

        let future = sample(1_800_000_000_000);
        assert_eq!(future.age(now), Duration::ZERO);

        assert_eq!(
            tx.started_at(),
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
        );
    }

    #[test]
    fn test_explorer_urls() {
        let mut tx = sample(0);
        assert_eq!(
            tx.explorer_url(Network::Testnet),
            "https://explorer.hiro.so/txid/0xfeed?chain=testnet"
        );
        tx.origin_chain = OriginChain::Ethereum;
        assert_eq!(
            tx.explorer_url(Network::Testnet),
            "https://sepolia.etherscan.io/tx/0xfeed"
        );
        assert_eq!(
            tx.explorer_url(Network::Mainnet),
            "https://etherscan.io/tx/0xfeed"
        );
    }

    #[test]
    fn test_kind_round_trip_strings() {
        for kind in [
            TxKind::Bridge,
            TxKind::BridgeBack,
            TxKind::Deposit,
            TxKind::Withdraw,
        ] {
            assert_eq!(kind.as_str().parse::<TxKind>().unwrap(), kind);
        }
        assert!("swap".parse::<TxKind>().is_err());
    }
}
