use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ExplorerError, ProbeOutcome, TxStatusSource};
use crate::types::OriginChain;

/// `tx_status` values reported by the Hiro API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HiroTxStatus {
    Success,
    AbortByResponse,
    AbortByPostCondition,
    Pending,
    /// Dropped, replaced, or anything newer than this client
    Other(String),
}

impl From<&str> for HiroTxStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "success" => HiroTxStatus::Success,
            "abort_by_response" => HiroTxStatus::AbortByResponse,
            "abort_by_post_condition" => HiroTxStatus::AbortByPostCondition,
            "pending" => HiroTxStatus::Pending,
            other => HiroTxStatus::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HiroTx {
    tx_status: Option<String>,
}

/// Stacks transaction status via the Hiro API
pub struct HiroSource {
    client: Client,
    api_url: String,
}

impl HiroSource {
    pub fn new(client: Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the status; `None` when the API has not indexed the transaction
    pub async fn tx_status(&self, tx_hash: &str) -> Result<Option<HiroTxStatus>, ExplorerError> {
        let url = format!("{}/extended/v1/tx/{}", self.api_url, tx_hash);
        let resp = self.client.get(&url).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            warn!(tx_hash = %tx_hash, status = resp.status().as_u16(), "Hiro HTTP error");
            return Err(ExplorerError::Status(resp.status().as_u16()));
        }

        let tx: HiroTx = resp.json().await?;
        let raw = tx
            .tx_status
            .ok_or_else(|| ExplorerError::Unrecognized("missing tx_status".to_string()))?;
        Ok(Some(HiroTxStatus::from(raw.as_str())))
    }
}

#[async_trait]
impl TxStatusSource for HiroSource {
    fn chain(&self) -> OriginChain {
        OriginChain::Stacks
    }

    async fn probe(&self, tx_hash: &str) -> Result<ProbeOutcome, ExplorerError> {
        let Some(status) = self.tx_status(tx_hash).await? else {
            debug!(tx_hash = %tx_hash, "Stacks transaction not indexed yet");
            return Ok(ProbeOutcome::NotFinal);
        };
        debug!(tx_hash = %tx_hash, ?status, "Hiro transaction status");

        Ok(match status {
            HiroTxStatus::Success => ProbeOutcome::Confirmed,
            HiroTxStatus::AbortByResponse => ProbeOutcome::Failed {
                reason: "abort_by_response".to_string(),
            },
            HiroTxStatus::AbortByPostCondition => ProbeOutcome::Failed {
                reason: "abort_by_post_condition".to_string(),
            },
            HiroTxStatus::Pending | HiroTxStatus::Other(_) => ProbeOutcome::NotFinal,
        })
    }
}
