//! User-facing notifications
//!
//! The dashboard showed these as toasts; here they go to the log or to a
//! channel a front end can drain.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::types::{OriginChain, PendingTransaction, TxKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    pub tx_hash: Option<String>,
    pub chain: Option<OriginChain>,
}

impl Notification {
    /// Success notice for a transaction that reached `completed`
    pub fn completed(tx: &PendingTransaction) -> Self {
        let (title, message) = match tx.kind {
            TxKind::Bridge => ("Bridge Confirmed!", "USDCx should arrive shortly on Stacks."),
            TxKind::BridgeBack => ("Bridge Back Confirmed!", "Transaction confirmed."),
            TxKind::Deposit => ("Deposit Confirmed!", "Transaction confirmed."),
            TxKind::Withdraw => ("Withdrawal Confirmed!", "Transaction confirmed."),
        };
        Self {
            level: NotificationLevel::Success,
            title: title.to_string(),
            message: message.to_string(),
            tx_hash: Some(tx.tx_hash.clone()),
            chain: Some(tx.origin_chain),
        }
    }

    /// Warning that status checks for a record keep failing
    pub fn status_unavailable(tx: &PendingTransaction, failures: u32, error: &str) -> Self {
        Self {
            level: NotificationLevel::Error,
            title: "Status Check Failing".to_string(),
            message: format!(
                "{}: explorer unreachable after {} attempts ({}). Still tracking.",
                tx.message, failures, error
            ),
            tx_hash: Some(tx.tx_hash.clone()),
            chain: Some(tx.origin_chain),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Emits notifications as log events
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, n: &Notification) {
        match n.level {
            NotificationLevel::Error => warn!(
                title = %n.title,
                tx_hash = ?n.tx_hash,
                chain = ?n.chain,
                "{}",
                n.message
            ),
            NotificationLevel::Success | NotificationLevel::Info => info!(
                title = %n.title,
                tx_hash = ?n.tx_hash,
                chain = ?n.chain,
                "{}",
                n.message
            ),
        }
    }
}

/// Forwards notifications into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: &Notification) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(notification.clone());
    }
}
