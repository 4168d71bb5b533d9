//! Read-only chain clients used to refresh balances and positions

pub mod ethereum;
pub mod stacks;

pub use ethereum::EthereumClient;
pub use stacks::{StacksClient, VaultTransaction, VaultTxStatus, VaultTxType};
