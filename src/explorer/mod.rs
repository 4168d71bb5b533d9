//! Transaction status sources
//!
//! One source per origin chain. A source answers a single question: has this
//! transaction reached a final state yet? Every network or parsing problem is
//! an [`ExplorerError`]; the reconciler decides how often to ask again.

mod etherscan;
mod hiro;

pub use etherscan::{EtherscanSource, ReceiptStatus};
pub use hiro::{HiroSource, HiroTxStatus};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::types::OriginChain;

/// Final-or-not answer for one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Confirmed,
    Failed { reason: String },
    /// Unknown, still pending, or not yet indexed
    NotFinal,
}

impl ProbeOutcome {
    pub fn is_final(&self) -> bool {
        !matches!(self, ProbeOutcome::NotFinal)
    }
}

#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("Explorer request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Explorer returned HTTP {0}")]
    Status(u16),

    #[error("Unrecognized explorer response: {0}")]
    Unrecognized(String),
}

#[async_trait]
pub trait TxStatusSource: Send + Sync {
    /// Chain whose transactions this source can answer for
    fn chain(&self) -> OriginChain;

    async fn probe(&self, tx_hash: &str) -> Result<ProbeOutcome, ExplorerError>;
}

/// HTTP client shared by the explorer and balance clients
pub fn http_client(timeout: Duration) -> Result<Client, ExplorerError> {
    Ok(Client::builder().timeout(timeout).build()?)
}
