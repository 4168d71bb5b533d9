use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ExplorerError, ProbeOutcome, TxStatusSource};
use crate::types::OriginChain;

/// Receipt status as reported by `gettxreceiptstatus`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
    /// Empty or unexpected status (not yet mined)
    Unknown(String),
}

impl From<&str> for ReceiptStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "1" => ReceiptStatus::Success,
            "0" => ReceiptStatus::Reverted,
            other => ReceiptStatus::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReceiptEnvelope {
    #[serde(default)]
    message: Option<String>,
    result: Option<ReceiptResult>,
}

/// `result` is an object on success and a bare string on errors such as
/// rate limiting or a bad API key
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReceiptResult {
    Receipt { status: String },
    Message(String),
}

/// Ethereum receipt status via the Etherscan API
pub struct EtherscanSource {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

impl EtherscanSource {
    pub fn new(client: Client, api_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    /// Fetch the raw receipt status for a transaction
    pub async fn receipt_status(&self, tx_hash: &str) -> Result<ReceiptStatus, ExplorerError> {
        let mut query = vec![
            ("module", "transaction"),
            ("action", "gettxreceiptstatus"),
            ("txhash", tx_hash),
        ];
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.as_str()));
        }

        let resp = self.client.get(&self.api_url).query(&query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            warn!(tx_hash = %tx_hash, status = status.as_u16(), "Etherscan HTTP error");
            return Err(ExplorerError::Status(status.as_u16()));
        }

        let envelope: ReceiptEnvelope = resp.json().await?;
        match envelope.result {
            Some(ReceiptResult::Receipt { status }) => Ok(ReceiptStatus::from(status.as_str())),
            Some(ReceiptResult::Message(msg)) => Err(ExplorerError::Unrecognized(msg)),
            None => Err(ExplorerError::Unrecognized(
                envelope
                    .message
                    .unwrap_or_else(|| "missing result".to_string()),
            )),
        }
    }
}

#[async_trait]
impl TxStatusSource for EtherscanSource {
    fn chain(&self) -> OriginChain {
        OriginChain::Ethereum
    }

    async fn probe(&self, tx_hash: &str) -> Result<ProbeOutcome, ExplorerError> {
        let status = self.receipt_status(tx_hash).await?;
        debug!(tx_hash = %tx_hash, ?status, "Etherscan receipt status");

        Ok(match status {
            ReceiptStatus::Success => ProbeOutcome::Confirmed,
            ReceiptStatus::Reverted => ProbeOutcome::Failed {
                reason: "transaction reverted".to_string(),
            },
            ReceiptStatus::Unknown(_) => ProbeOutcome::NotFinal,
        })
    }
}
