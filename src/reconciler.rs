//! Pending transaction reconciler
//!
//! Owns the set of tracked cross-chain operations and drives each one from
//! `pending` to a terminal state by polling the explorer for its origin
//! chain.
//!
//! # Persistence
//!
//! The whole record array lives under [`PENDING_TXS_KEY`]. Every mutation is
//! a read-modify-write of that array keyed by record id, and every poll pass
//! starts by re-reading it, so a `track` issued from another process is picked
//! up on the next tick.
//!
//! # Failure handling
//!
//! Explorer errors leave the record untouched. The first few are retried on
//! the next tick; after that the record backs off exponentially and the user
//! is told once (see [`crate::backoff`]).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use eyre::{eyre, Result, WrapErr};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backoff::{FailureAction, ProbeBackoff, ProbeBackoffConfig};
use crate::config::Config;
use crate::explorer::{ProbeOutcome, TxStatusSource};
use crate::notify::{Notification, Notifier};
use crate::refresh::AccountRefresher;
use crate::store::{KeyValueStore, PENDING_TXS_KEY};
use crate::types::{
    ConnectedAccounts, NewPendingTransaction, OriginChain, PendingTransaction, TxStatus,
};

/// Reconciler timing
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub poll_interval: Duration,
    /// Records older than this are evicted
    pub retention: Duration,
    pub backoff: ProbeBackoffConfig,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            retention: Duration::from_secs(2 * 60 * 60),
            backoff: ProbeBackoffConfig::default(),
        }
    }
}

impl From<&Config> for ReconcilerSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            retention: config.retention(),
            backoff: config.probe.clone(),
        }
    }
}

/// Counts from one poll pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub probed: usize,
    pub completed: usize,
    pub failed: usize,
    pub unchanged: usize,
    pub errors: usize,
    /// Pending records skipped because they are backing off
    pub deferred: usize,
}

pub struct Reconciler {
    records: Vec<PendingTransaction>,
    store: Arc<dyn KeyValueStore>,
    /// Status sources keyed by the chain they answer for
    sources: HashMap<OriginChain, Arc<dyn TxStatusSource>>,
    notifier: Arc<dyn Notifier>,
    refresher: Arc<dyn AccountRefresher>,
    accounts: ConnectedAccounts,
    settings: ReconcilerSettings,
    /// Probe backoff by record id
    backoff: HashMap<String, ProbeBackoff>,
}

impl Reconciler {
    /// Sources are routed by their own [`TxStatusSource::chain`], not by
    /// argument position.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        ethereum: Arc<dyn TxStatusSource>,
        stacks: Arc<dyn TxStatusSource>,
        notifier: Arc<dyn Notifier>,
        refresher: Arc<dyn AccountRefresher>,
        settings: ReconcilerSettings,
    ) -> Self {
        let sources = [ethereum, stacks]
            .into_iter()
            .map(|source| (source.chain(), source))
            .collect();

        Self {
            records: Vec::new(),
            store,
            sources,
            notifier,
            refresher,
            accounts: ConnectedAccounts::default(),
            settings,
            backoff: HashMap::new(),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn records(&self) -> &[PendingTransaction] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&PendingTransaction> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn pending_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == TxStatus::Pending)
            .count()
    }

    pub fn accounts(&self) -> &ConnectedAccounts {
        &self.accounts
    }

    pub fn set_accounts(&mut self, accounts: ConnectedAccounts) {
        debug!(
            ethereum = ?accounts.ethereum,
            stacks = ?accounts.stacks,
            "Connected accounts updated"
        );
        self.accounts = accounts;
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Load persisted records, dropping any past retention.
    ///
    /// Returns the number of records kept.
    pub fn load(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let dropped = self.sync(now)?;
        info!(
            loaded = self.records.len(),
            dropped,
            pending = self.pending_count(),
            "Loaded tracked transactions"
        );
        Ok(self.records.len())
    }

    /// Drop records past retention from memory and storage.
    ///
    /// Returns the number of records evicted.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> Result<usize> {
        self.sync(now)
    }

    /// Start tracking a submitted transaction; returns the new record id
    pub fn track(&mut self, new: NewPendingTransaction, now: DateTime<Utc>) -> Result<String> {
        if new.tx_hash.trim().is_empty() {
            return Err(eyre!("Transaction hash must not be empty"));
        }

        let record = PendingTransaction {
            id: Uuid::new_v4().simple().to_string(),
            kind: new.kind,
            origin_chain: new.origin_chain,
            tx_hash: new.tx_hash.trim().to_string(),
            amount: new.amount,
            status: TxStatus::Pending,
            start_time: now.timestamp_millis(),
            message: new.message,
        };

        let persisted = record.clone();
        self.modify_persisted(|records| records.push(persisted))?;

        info!(
            id = %record.id,
            kind = %record.kind,
            chain = %record.origin_chain,
            tx_hash = %record.tx_hash,
            "Tracking transaction"
        );

        let id = record.id.clone();
        self.records.push(record);
        Ok(id)
    }

    /// Delete one record by id; returns whether it existed
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let existed = self.records.iter().any(|r| r.id == id);
        self.modify_persisted(|records| records.retain(|r| r.id != id))?;
        self.records.retain(|r| r.id != id);
        self.backoff.remove(id);

        if existed {
            debug!(id = %id, "Removed transaction");
        }
        Ok(existed)
    }

    /// User dismissal; only completed or failed records can be dismissed
    pub fn dismiss(&mut self, id: &str) -> Result<()> {
        let record = self
            .get(id)
            .ok_or_else(|| eyre!("Unknown transaction id: {}", id))?;

        if !record.status.is_terminal() {
            return Err(eyre!(
                "Transaction {} is still {} and cannot be dismissed",
                id,
                record.status
            ));
        }

        self.remove(id)?;
        Ok(())
    }

    // ========================================================================
    // Polling
    // ========================================================================

    pub async fn poll_once(&mut self) -> Result<PollSummary> {
        self.poll_once_at(Utc::now()).await
    }

    /// One reconciliation pass: at most one probe per pending record
    pub async fn poll_once_at(&mut self, now: DateTime<Utc>) -> Result<PollSummary> {
        self.sync(now)?;

        let mut summary = PollSummary::default();

        let candidates: Vec<(String, OriginChain, String)> = self
            .records
            .iter()
            .filter(|r| r.status == TxStatus::Pending)
            .map(|r| (r.id.clone(), r.origin_chain, r.tx_hash.clone()))
            .collect();

        for (id, chain, tx_hash) in candidates {
            if let Some(state) = self.backoff.get(&id) {
                if !state.is_ready(now) {
                    summary.deferred += 1;
                    continue;
                }
            }

            let Some(source) = self.source_for(chain) else {
                summary.errors += 1;
                self.record_probe_failure(&id, format!("No status source for {}", chain), now);
                continue;
            };
            summary.probed += 1;

            match source.probe(&tx_hash).await {
                Ok(ProbeOutcome::Confirmed) => {
                    self.backoff.remove(&id);
                    self.complete(&id).await?;
                    summary.completed += 1;
                }
                Ok(ProbeOutcome::Failed { reason }) => {
                    self.backoff.remove(&id);
                    self.set_status(&id, TxStatus::Failed)?;
                    warn!(id = %id, tx_hash = %tx_hash, chain = %chain, reason = %reason, "Transaction failed on-chain");
                    summary.failed += 1;
                }
                Ok(ProbeOutcome::NotFinal) => {
                    if let Some(state) = self.backoff.get_mut(&id) {
                        state.reset();
                    }
                    summary.unchanged += 1;
                }
                Err(e) => {
                    summary.errors += 1;
                    self.record_probe_failure(&id, e.to_string(), now);
                }
            }
        }

        if summary.probed > 0 {
            debug!(?summary, "Poll pass finished");
        }
        Ok(summary)
    }

    /// Poll on a fixed interval until shutdown. The first pass runs
    /// immediately.
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        info!(
            interval_ms = self.settings.poll_interval.as_millis() as u64,
            "Reconciler starting"
        );

        let period = self.settings.poll_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!(error = %e, "Error polling transactions");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn source_for(&self, chain: OriginChain) -> Option<Arc<dyn TxStatusSource>> {
        let source = self.sources.get(&chain).cloned();
        if source.is_none() {
            warn!(chain = %chain, "No status source configured");
        }
        source
    }

    async fn complete(&mut self, id: &str) -> Result<()> {
        self.set_status(id, TxStatus::Completed)?;

        let Some(record) = self.get(id) else {
            return Ok(());
        };
        info!(id = %id, tx_hash = %record.tx_hash, kind = %record.kind, "Transaction confirmed");
        self.notifier.notify(&Notification::completed(record));

        self.refresher.refresh(&self.accounts).await;
        Ok(())
    }

    fn record_probe_failure(&mut self, id: &str, error: String, now: DateTime<Utc>) {
        let state = self.backoff.entry(id.to_string()).or_default();
        let action = state.record_failure(&self.settings.backoff, error.clone(), now);
        let failures = state.consecutive_failures;

        match action {
            FailureAction::Retry => {
                debug!(id = %id, failures, error = %error, "Status probe failed, retrying next tick");
            }
            FailureAction::Defer(until) => {
                debug!(id = %id, failures, %until, error = %error, "Status probe failed, backing off");
            }
            FailureAction::Surface(until) => {
                warn!(id = %id, failures, %until, error = %error, "Status checks keep failing");
                if let Some(record) = self.records.iter().find(|r| r.id == id) {
                    self.notifier
                        .notify(&Notification::status_unavailable(record, failures, &error));
                }
            }
        }
    }

    fn set_status(&mut self, id: &str, status: TxStatus) -> Result<()> {
        self.modify_persisted(|records| {
            for record in records.iter_mut().filter(|r| r.id == id) {
                record.status = status;
            }
        })?;
        for record in self.records.iter_mut().filter(|r| r.id == id) {
            record.status = status;
        }
        Ok(())
    }

    /// Reload from storage, evicting stale records. Returns the number evicted.
    fn sync(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let persisted = self.read_persisted()?;
        let before = persisted.len();
        let retention = self.settings.retention;

        let kept: Vec<PendingTransaction> = persisted
            .into_iter()
            .filter(|r| !r.is_stale(now, retention))
            .collect();
        let dropped = before - kept.len();

        if dropped > 0 {
            self.write_persisted(&kept)?;
            info!(dropped, "Evicted stale transactions");
        }

        self.records = kept;
        let records = &self.records;
        self.backoff
            .retain(|id, _| records.iter().any(|r| &r.id == id));
        Ok(dropped)
    }

    fn read_persisted(&self) -> Result<Vec<PendingTransaction>> {
        let Some(raw) = self
            .store
            .get(PENDING_TXS_KEY)
            .wrap_err("Failed to read tracked transactions")?
        else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(error = %e, "Persisted transactions are corrupt, starting empty");
                Ok(Vec::new())
            }
        }
    }

    fn write_persisted(&self, records: &[PendingTransaction]) -> Result<()> {
        let body = serde_json::to_string(records)?;
        self.store
            .set(PENDING_TXS_KEY, &body)
            .wrap_err("Failed to persist tracked transactions")
    }

    fn modify_persisted(&self, f: impl FnOnce(&mut Vec<PendingTransaction>)) -> Result<()> {
        let mut records = self.read_persisted()?;
        f(&mut records);
        self.write_persisted(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::ExplorerError;
    use crate::notify::{ChannelNotifier, NotificationLevel};
    use crate::store::MemoryStore;
    use crate::types::TxKind;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc::UnboundedReceiver;

    #[derive(Clone)]
    enum Reply {
        Outcome(ProbeOutcome),
        Error,
    }

    /// Status source answering from a table; unknown hashes are not final
    struct FakeSource {
        chain: OriginChain,
        replies: Mutex<HashMap<String, Reply>>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(chain: OriginChain) -> Arc<Self> {
            Arc::new(Self {
                chain,
                replies: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
            })
        }

        fn reply(&self, tx_hash: &str, reply: Reply) {
            self.replies
                .lock()
                .unwrap()
                .insert(tx_hash.to_string(), reply);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TxStatusSource for FakeSource {
        fn chain(&self) -> OriginChain {
            self.chain
        }

        async fn probe(&self, tx_hash: &str) -> Result<ProbeOutcome, ExplorerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.replies.lock().unwrap().get(tx_hash).cloned();
            match reply {
                Some(Reply::Outcome(outcome)) => Ok(outcome),
                Some(Reply::Error) => Err(ExplorerError::Status(503)),
                None => Ok(ProbeOutcome::NotFinal),
            }
        }
    }

    #[derive(Default)]
    struct CountingRefresher {
        calls: AtomicUsize,
        last: Mutex<Option<ConnectedAccounts>>,
    }

    #[async_trait]
    impl AccountRefresher for CountingRefresher {
        async fn refresh(&self, accounts: &ConnectedAccounts) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(accounts.clone());
        }
    }

    struct Harness {
        reconciler: Reconciler,
        store: Arc<MemoryStore>,
        eth: Arc<FakeSource>,
        stacks: Arc<FakeSource>,
        refresher: Arc<CountingRefresher>,
        notifications: UnboundedReceiver<Notification>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let eth = FakeSource::new(OriginChain::Ethereum);
        let stacks = FakeSource::new(OriginChain::Stacks);
        let refresher = Arc::new(CountingRefresher::default());
        let (notifier, notifications) = ChannelNotifier::new();

        let reconciler = Reconciler::new(
            store.clone(),
            eth.clone(),
            stacks.clone(),
            Arc::new(notifier),
            refresher.clone(),
            ReconcilerSettings::default(),
        );

        Harness {
            reconciler,
            store,
            eth,
            stacks,
            refresher,
            notifications,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    fn persisted(store: &MemoryStore) -> Vec<PendingTransaction> {
        let raw = store.get(PENDING_TXS_KEY).unwrap().unwrap_or_default();
        serde_json::from_str(&raw).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_success_completes_and_notifies_once() {
        let mut h = harness();
        h.reconciler.set_accounts(ConnectedAccounts {
            ethereum: Some("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".into()),
            stacks: None,
        });
        let id = h
            .reconciler
            .track(NewPendingTransaction::bridge("0xaaa", "10"), t0())
            .unwrap();
        h.eth.reply("0xaaa", Reply::Outcome(ProbeOutcome::Confirmed));

        let summary = h.reconciler.poll_once_at(t0()).await.unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(h.reconciler.get(&id).unwrap().status, TxStatus::Completed);
        assert_eq!(persisted(&h.store)[0].status, TxStatus::Completed);

        let note = h.notifications.try_recv().unwrap();
        assert_eq!(note.level, NotificationLevel::Success);
        assert_eq!(note.title, "Bridge Confirmed!");
        assert!(h.notifications.try_recv().is_err());

        assert_eq!(h.refresher.calls.load(Ordering::SeqCst), 1);
        let refreshed = h.refresher.last.lock().unwrap().clone().unwrap();
        assert!(refreshed.ethereum.is_some());

        // Terminal records are not probed again
        h.reconciler.poll_once_at(t0()).await.unwrap();
        assert_eq!(h.eth.calls(), 1);
        assert!(h.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_abort_marks_failed_without_notification() {
        let mut h = harness();
        let id = h
            .reconciler
            .track(
                NewPendingTransaction::stacks(TxKind::Deposit, "0xbbb", "5"),
                t0(),
            )
            .unwrap();
        h.stacks.reply(
            "0xbbb",
            Reply::Outcome(ProbeOutcome::Failed {
                reason: "abort_by_response".into(),
            }),
        );

        let summary = h.reconciler.poll_once_at(t0()).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(h.reconciler.get(&id).unwrap().status, TxStatus::Failed);
        assert!(h.notifications.try_recv().is_err());
        assert_eq!(h.refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_probe_error_leaves_status_unchanged() {
        let mut h = harness();
        let id = h
            .reconciler
            .track(NewPendingTransaction::bridge("0xccc", "1"), t0())
            .unwrap();
        h.eth.reply("0xccc", Reply::Error);

        let summary = h.reconciler.poll_once_at(t0()).await.unwrap();
        assert_eq!(summary.errors, 1);
        assert_eq!(h.reconciler.get(&id).unwrap().status, TxStatus::Pending);
        assert!(h.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_persistent_errors_back_off_and_surface_once() {
        let mut h = harness();
        h.reconciler
            .track(NewPendingTransaction::bridge("0xddd", "1"), t0())
            .unwrap();
        h.eth.reply("0xddd", Reply::Error);

        let mut now = t0();
        // Quiet failures retry on consecutive ticks
        for _ in 0..3 {
            h.reconciler.poll_once_at(now).await.unwrap();
        }
        assert_eq!(h.eth.calls(), 3);

        // Fourth failure defers the record by 30s
        h.reconciler.poll_once_at(now).await.unwrap();
        let summary = h.reconciler.poll_once_at(now).await.unwrap();
        assert_eq!(summary.deferred, 1);
        assert_eq!(h.eth.calls(), 4);
        assert!(h.notifications.try_recv().is_err());

        // Fifth failure surfaces
        now += chrono::Duration::seconds(30);
        h.reconciler.poll_once_at(now).await.unwrap();
        let note = h.notifications.try_recv().unwrap();
        assert_eq!(note.level, NotificationLevel::Error);
        assert_eq!(note.tx_hash.as_deref(), Some("0xddd"));

        // Later failures stay quiet
        now += chrono::Duration::seconds(60);
        h.reconciler.poll_once_at(now).await.unwrap();
        assert_eq!(h.eth.calls(), 6);
        assert!(h.notifications.try_recv().is_err());

        // Recovery resets the streak
        h.eth.reply("0xddd", Reply::Outcome(ProbeOutcome::Confirmed));
        now += chrono::Duration::seconds(120);
        let summary = h.reconciler.poll_once_at(now).await.unwrap();
        assert_eq!(summary.completed, 1);
    }

    #[tokio::test]
    async fn test_load_evicts_stale_and_repersists() {
        let mut h = harness();
        h.reconciler
            .track(NewPendingTransaction::bridge("0xold", "1"), t0())
            .unwrap();
        let later = t0() + chrono::Duration::minutes(90);
        h.reconciler
            .track(NewPendingTransaction::bridge("0xnew", "2"), later)
            .unwrap();
        assert_eq!(persisted(&h.store).len(), 2);

        let reload_at = t0() + chrono::Duration::hours(2);
        let loaded = h.reconciler.load(reload_at).unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(h.reconciler.records()[0].tx_hash, "0xnew");

        let stored = persisted(&h.store);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].tx_hash, "0xnew");
    }

    #[tokio::test]
    async fn test_same_hash_tracked_independently() {
        let mut h = harness();
        let a = h
            .reconciler
            .track(NewPendingTransaction::bridge("0xsame", "1"), t0())
            .unwrap();
        let b = h
            .reconciler
            .track(NewPendingTransaction::bridge("0xsame", "1"), t0())
            .unwrap();
        assert_ne!(a, b);

        assert!(h.reconciler.remove(&a).unwrap());
        assert!(h.reconciler.get(&a).is_none());
        assert!(h.reconciler.get(&b).is_some());
        assert_eq!(persisted(&h.store).len(), 1);

        h.eth.reply("0xsame", Reply::Outcome(ProbeOutcome::Confirmed));
        h.reconciler.poll_once_at(t0()).await.unwrap();
        assert_eq!(h.reconciler.get(&b).unwrap().status, TxStatus::Completed);
        assert!(!h.reconciler.remove(&a).unwrap());
    }

    #[tokio::test]
    async fn test_dismiss_only_terminal() {
        let mut h = harness();
        let id = h
            .reconciler
            .track(
                NewPendingTransaction::stacks(TxKind::Withdraw, "0xeee", "3"),
                t0(),
            )
            .unwrap();

        assert!(h.reconciler.dismiss(&id).is_err());
        assert!(h.reconciler.dismiss("missing").is_err());

        h.stacks.reply("0xeee", Reply::Outcome(ProbeOutcome::Confirmed));
        h.reconciler.poll_once_at(t0()).await.unwrap();
        h.reconciler.dismiss(&id).unwrap();
        assert!(h.reconciler.records().is_empty());
        assert!(persisted(&h.store).is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_storage_treated_as_empty() {
        let mut h = harness();
        h.store.set(PENDING_TXS_KEY, "{not json").unwrap();
        assert_eq!(h.reconciler.load(t0()).unwrap(), 0);

        h.reconciler
            .track(NewPendingTransaction::bridge("0xfff", "1"), t0())
            .unwrap();
        assert_eq!(persisted(&h.store).len(), 1);
    }

    #[tokio::test]
    async fn test_picks_up_records_tracked_elsewhere() {
        let mut h = harness();
        h.reconciler.load(t0()).unwrap();

        // A second reconciler sharing the store, e.g. the CLI
        let mut other = Reconciler::new(
            h.store.clone(),
            h.eth.clone(),
            h.stacks.clone(),
            Arc::new(crate::notify::LogNotifier),
            h.refresher.clone(),
            ReconcilerSettings::default(),
        );
        other
            .track(NewPendingTransaction::bridge("0x123", "4"), t0())
            .unwrap();

        h.eth.reply("0x123", Reply::Outcome(ProbeOutcome::Confirmed));
        let summary = h.reconciler.poll_once_at(t0()).await.unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(h.reconciler.records().len(), 1);
    }

    #[tokio::test]
    async fn test_confirming_is_not_probed() {
        let mut h = harness();
        let raw = r#"[{"id":"x1","type":"bridge","txHash":"0x9","txType":"eth","amount":"1",
            "status":"confirming","startTime":1700000000000,"message":"m"}]"#;
        h.store.set(PENDING_TXS_KEY, raw).unwrap();

        let summary = h.reconciler.poll_once_at(t0()).await.unwrap();
        assert_eq!(summary.probed, 0);
        assert_eq!(h.eth.calls(), 0);
        assert_eq!(h.reconciler.pending_count(), 0);
    }

    #[test]
    fn test_track_rejects_empty_hash() {
        let mut h = harness();
        assert!(h
            .reconciler
            .track(NewPendingTransaction::bridge("  ", "1"), t0())
            .is_err());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut h = harness();
        let (tx, rx) = mpsc::channel(1);
        tx.send(()).await.unwrap();
        h.reconciler.run(rx).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_checks_pending_before_first_interval() {
        let mut h = harness();
        let id = h
            .reconciler
            .track(NewPendingTransaction::bridge("0xeee", "1"), Utc::now())
            .unwrap();
        h.eth.reply("0xeee", Reply::Outcome(ProbeOutcome::Confirmed));

        // Shutdown is already queued; only the immediate pass can run
        let (tx, rx) = mpsc::channel(1);
        tx.send(()).await.unwrap();
        h.reconciler.run(rx).await.unwrap();

        assert_eq!(h.eth.calls(), 1);
        assert_eq!(h.reconciler.get(&id).unwrap().status, TxStatus::Completed);
        assert_eq!(
            h.notifications.try_recv().unwrap().level,
            NotificationLevel::Success
        );
    }

    #[tokio::test]
    async fn test_not_final_reply_restarts_failure_streak() {
        let mut h = harness();
        let mut now = t0();
        h.reconciler
            .track(NewPendingTransaction::bridge("0xfff", "1"), now)
            .unwrap();
        h.eth.reply("0xfff", Reply::Error);

        // Three quiet retries, then the fourth failure defers
        for _ in 0..4 {
            h.reconciler.poll_once_at(now).await.unwrap();
        }
        assert_eq!(h.reconciler.poll_once_at(now).await.unwrap().deferred, 1);

        now += chrono::Duration::seconds(30);
        h.eth
            .reply("0xfff", Reply::Outcome(ProbeOutcome::NotFinal));
        assert_eq!(h.reconciler.poll_once_at(now).await.unwrap().unchanged, 1);

        // A fresh streak retries on the next tick instead of deferring
        h.eth.reply("0xfff", Reply::Error);
        assert_eq!(h.reconciler.poll_once_at(now).await.unwrap().errors, 1);
        let summary = h.reconciler.poll_once_at(now).await.unwrap();
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.deferred, 0);
        assert_eq!(h.eth.calls(), 7);
    }

    fn reconciler_with(
        store: Arc<MemoryStore>,
        first: Arc<FakeSource>,
        second: Arc<FakeSource>,
    ) -> Reconciler {
        let (notifier, _rx) = ChannelNotifier::new();
        Reconciler::new(
            store,
            first,
            second,
            Arc::new(notifier),
            Arc::new(CountingRefresher::default()),
            ReconcilerSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_sources_routed_by_their_chain() {
        let eth = FakeSource::new(OriginChain::Ethereum);
        let stacks = FakeSource::new(OriginChain::Stacks);
        let mut reconciler =
            reconciler_with(Arc::new(MemoryStore::new()), stacks.clone(), eth.clone());

        reconciler
            .track(NewPendingTransaction::bridge("0x111", "1"), t0())
            .unwrap();
        reconciler
            .track(
                NewPendingTransaction::stacks(TxKind::Deposit, "0x222", "1"),
                t0(),
            )
            .unwrap();
        eth.reply("0x111", Reply::Outcome(ProbeOutcome::Confirmed));

        let summary = reconciler.poll_once_at(t0()).await.unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(eth.calls(), 1);
        assert_eq!(stacks.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_source_counts_as_error() {
        let eth = FakeSource::new(OriginChain::Ethereum);
        let other_eth = FakeSource::new(OriginChain::Ethereum);
        let mut reconciler =
            reconciler_with(Arc::new(MemoryStore::new()), eth.clone(), other_eth.clone());

        let id = reconciler
            .track(
                NewPendingTransaction::stacks(TxKind::Withdraw, "0x333", "1"),
                t0(),
            )
            .unwrap();

        let summary = reconciler.poll_once_at(t0()).await.unwrap();
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.probed, 0);
        assert_eq!(eth.calls() + other_eth.calls(), 0);
        assert_eq!(reconciler.get(&id).unwrap().status, TxStatus::Pending);
    }
}
