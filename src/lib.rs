//! USDCx Vault Tracker
//!
//! Headless companion for the USDC → USDCx bridge and yield vault:
//!
//! - **Address Codec** - Stacks c32 addresses to the 32-byte xReserve recipient format
//! - **Reconciler** - Tracks submitted transactions and polls explorers until they settle
//! - **Explorer Sources** - Etherscan receipt status and Hiro transaction status
//! - **Chains** - USDC / USDCx balances and vault history for refresh after completion
//! - **Amounts** - Decimal parsing, fee estimates and vault withdrawal quotes
//! - **Session** - Last connected wallet account for auto-reconnect

pub mod address_codec;
pub mod amount;
pub mod backoff;
pub mod chains;
pub mod config;
pub mod explorer;
pub mod notify;
pub mod reconciler;
pub mod refresh;
pub mod session;
pub mod store;
pub mod types;

// Re-export commonly used items at the crate root
pub use address_codec::{
    bytes32_to_hex, c32_decode, encode_stacks_recipient, eth_address_to_bytes,
    stacks_address_to_bytes32, ChecksumPolicy, CodecError, DecodeMode,
};
pub use config::{Config, NetworkContracts};
pub use explorer::{EtherscanSource, ExplorerError, HiroSource, ProbeOutcome, TxStatusSource};
pub use notify::{ChannelNotifier, LogNotifier, Notification, NotificationLevel, Notifier};
pub use reconciler::{PollSummary, Reconciler, ReconcilerSettings};
pub use refresh::{AccountRefresher, BalanceSnapshot, DashboardRefresher};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use types::{
    ConnectedAccounts, Network, NewPendingTransaction, OriginChain, PendingTransaction, TxKind,
    TxStatus,
};
