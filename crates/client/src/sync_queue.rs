//! Persisted queue of writes awaiting delivery to the sync server.
//!
//! Entries live as one JSON list under [`PENDING_WRITES_KEY`]; every
//! read-modify-write of that list holds the key's storage lock, so enqueues
//! that race a running flush are never lost. At most one flush runs at a
//! time; a second request while one is in flight is dropped.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use selrs_core::LedgerKind;

use crate::clock::Clock;
use crate::config::clamp_interval;
use crate::error::StoreError;
use crate::storage::Storage;
use crate::sync_client::SyncTarget;
use crate::types::{ConnectivityState, FlushOutcome, FlushPolicy, PendingWrite, SyncStatus};

pub const PENDING_WRITES_KEY: &str = "selrs.pending_writes";
pub const SYNC_CONFIG_KEY: &str = "selrs.sync_config";

/// Persisted part of the sync state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SyncSettings {
    enabled: bool,
    last_sync_time: Option<DateTime<Utc>>,
    interval_secs: u64,
}

#[derive(Debug)]
struct SyncState {
    enabled: bool,
    last_sync_time: Option<DateTime<Utc>>,
    interval: Duration,
    connectivity: Option<ConnectivityState>,
    items_pending: usize,
}

struct Inner {
    storage: Storage,
    target: Arc<dyn SyncTarget>,
    clock: Arc<dyn Clock>,
    policy: FlushPolicy,
    is_syncing: AtomicBool,
    state: Mutex<SyncState>,
}

/// Resets the in-flight flag even if the flush future is dropped.
struct SyncingFlag<'a>(&'a AtomicBool);

impl Drop for SyncingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Cloneable handle to the pending-write queue.
#[derive(Clone)]
pub struct SyncQueue {
    inner: Arc<Inner>,
}

impl core::fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SyncQueue")
            .field("policy", &self.inner.policy)
            .field("state", &*self.state())
            .finish_non_exhaustive()
    }
}

impl SyncQueue {
    /// A queue with sync enabled and no recorded sync; see [`SyncQueue::load`].
    ///
    /// An `interval` below [`MIN_INTERVAL`](crate::config::MIN_INTERVAL) is raised to it.
    pub fn new(
        storage: Storage,
        target: Arc<dyn SyncTarget>,
        clock: Arc<dyn Clock>,
        policy: FlushPolicy,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                target,
                clock,
                policy,
                is_syncing: AtomicBool::new(false),
                state: Mutex::new(SyncState {
                    enabled: true,
                    last_sync_time: None,
                    interval: clamp_interval("sync", interval),
                    connectivity: None,
                    items_pending: 0,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restore persisted settings and count what is already queued.
    pub async fn load(&self) -> Result<(), StoreError> {
        let settings: Option<SyncSettings> = self.inner.storage.get_json(SYNC_CONFIG_KEY).await?;
        let pending = self.pending_items().await?.len();

        let mut state = self.state();
        if let Some(settings) = settings {
            state.enabled = settings.enabled;
            state.last_sync_time = settings.last_sync_time;
            if settings.interval_secs > 0 {
                state.interval = Duration::from_secs(settings.interval_secs);
            }
        }
        state.items_pending = pending;
        Ok(())
    }

    async fn persist_settings(&self) -> Result<(), StoreError> {
        // Snapshot under the key lock so the newest state is the last one written.
        let _guard = self.inner.storage.lock(SYNC_CONFIG_KEY).await;
        let settings = {
            let state = self.state();
            SyncSettings {
                enabled: state.enabled,
                last_sync_time: state.last_sync_time,
                interval_secs: state.interval.as_secs(),
            }
        };
        self.inner.storage.set_json(SYNC_CONFIG_KEY, &settings).await
    }

    pub fn policy(&self) -> FlushPolicy {
        self.inner.policy
    }

    pub fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.is_syncing.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Duration {
        self.state().interval
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.state().enabled = enabled;
        self.persist_settings().await?;
        info!(enabled, "background sync toggled");
        Ok(())
    }

    /// Change the timer period; takes effect after the current wait.
    pub async fn set_interval(&self, interval: Duration) -> Result<(), StoreError> {
        if interval.is_zero() {
            return Err(StoreError::Validation("sync interval must be positive".to_string()));
        }
        self.state().interval = interval;
        self.persist_settings().await?;
        info!(interval_secs = interval.as_secs(), "sync interval changed");
        Ok(())
    }

    pub async fn pending_items(&self) -> Result<Vec<PendingWrite>, StoreError> {
        Ok(self
            .inner
            .storage
            .get_json(PENDING_WRITES_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Append a write and, when sync is enabled and idle, start a flush
    /// without waiting for it.
    pub async fn enqueue(&self, kind: LedgerKind, payload: Value) -> Result<PendingWrite, StoreError> {
        let entry = PendingWrite::new(kind, payload, self.inner.clock.now());
        let pending = {
            let _guard = self.inner.storage.lock(PENDING_WRITES_KEY).await;
            let mut items = self.pending_items().await?;
            items.push(entry.clone());
            self.inner.storage.set_json(PENDING_WRITES_KEY, &items).await?;
            items.len()
        };
        self.state().items_pending = pending;
        debug!(%kind, id = %entry.id, pending, "pending write enqueued");

        if self.is_enabled() && !self.is_syncing() {
            let queue = self.clone();
            tokio::spawn(async move {
                queue.flush().await;
            });
        }
        Ok(entry)
    }

    /// Push every queued entry, grouped by ledger kind, then remove what was
    /// delivered according to the flush policy.
    pub async fn flush(&self) -> FlushOutcome {
        if self
            .inner
            .is_syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("flush already in progress, skipping");
            return FlushOutcome::Skipped;
        }
        let _flag = SyncingFlag(&self.inner.is_syncing);

        let outcome = self.flush_snapshot().await;
        match &outcome {
            FlushOutcome::Flushed { pushed } => info!(pushed, "pending writes flushed"),
            FlushOutcome::Failed { kind, pushed, error } => {
                warn!(kind = ?kind, pushed, %error, "flush failed, entries kept for retry")
            }
            FlushOutcome::Empty | FlushOutcome::Skipped => debug!(?outcome, "flush finished"),
        }
        outcome
    }

    async fn flush_snapshot(&self) -> FlushOutcome {
        let snapshot = match self.pending_items().await {
            Ok(items) => items,
            Err(err) => return self.fail(None, 0, err.to_string()),
        };
        if snapshot.is_empty() {
            self.record_success(0).await;
            return FlushOutcome::Empty;
        }

        let mut groups: BTreeMap<LedgerKind, Vec<&PendingWrite>> = BTreeMap::new();
        for entry in &snapshot {
            groups.entry(entry.kind).or_default().push(entry);
        }

        let mut delivered: HashSet<Uuid> = HashSet::new();
        let mut pushed = 0;
        for (kind, entries) in groups {
            debug!(%kind, count = entries.len(), "pushing pending group");
            for entry in &entries {
                if let Err(err) = self.inner.target.push(kind, &entry.payload).await {
                    return self.fail(Some(kind), pushed, err.to_string());
                }
                pushed += 1;
            }

            let ids = entries.iter().map(|entry| entry.id);
            if self.inner.policy == FlushPolicy::PerGroup {
                let ids: HashSet<Uuid> = ids.collect();
                if let Err(err) = self.remove_entries(&ids).await {
                    return self.fail(Some(kind), pushed, err.to_string());
                }
            } else {
                delivered.extend(ids);
            }
        }

        if let Err(err) = self.remove_entries(&delivered).await {
            return self.fail(None, pushed, err.to_string());
        }
        let remaining = self.pending_items().await.map(|items| items.len()).unwrap_or_default();
        self.record_success(remaining).await;
        FlushOutcome::Flushed { pushed }
    }

    /// Remove flushed entries only; anything enqueued meanwhile stays.
    async fn remove_entries(&self, ids: &HashSet<Uuid>) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let _guard = self.inner.storage.lock(PENDING_WRITES_KEY).await;
        let mut items = self.pending_items().await?;
        items.retain(|item| !ids.contains(&item.id));
        if items.is_empty() {
            self.inner.storage.remove(PENDING_WRITES_KEY).await?;
        } else {
            self.inner.storage.set_json(PENDING_WRITES_KEY, &items).await?;
        }
        self.state().items_pending = items.len();
        Ok(())
    }

    fn fail(&self, kind: Option<LedgerKind>, pushed: usize, error: String) -> FlushOutcome {
        self.state().connectivity = Some(ConnectivityState::Offline);
        FlushOutcome::Failed { kind, pushed, error }
    }

    async fn record_success(&self, remaining: usize) {
        {
            let mut state = self.state();
            state.connectivity = Some(ConnectivityState::Online);
            state.last_sync_time = Some(self.inner.clock.now());
            state.items_pending = remaining;
        }
        if let Err(err) = self.persist_settings().await {
            warn!(error = %err, "failed to persist sync settings");
        }
    }

    pub fn status(&self) -> SyncStatus {
        let state = self.state();
        let interval = chrono::Duration::from_std(state.interval).ok();
        SyncStatus {
            enabled: state.enabled,
            last_sync_time: state.last_sync_time,
            is_syncing: self.is_syncing(),
            next_sync_time: state
                .last_sync_time
                .filter(|_| state.enabled)
                .zip(interval)
                .and_then(|(last, interval)| last.checked_add_signed(interval)),
            items_pending: state.items_pending,
            is_online: state.connectivity != Some(ConnectivityState::Offline),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::RemoteError;

    /// Records deliveries; fails every push for `failing`; optionally waits on `gate`.
    #[derive(Default)]
    struct FakeTarget {
        pushed: StdMutex<Vec<(LedgerKind, Value)>>,
        failing: StdMutex<Option<LedgerKind>>,
        gate: Option<Arc<Notify>>,
    }

    impl FakeTarget {
        fn failing(kind: LedgerKind) -> Self {
            Self {
                failing: StdMutex::new(Some(kind)),
                ..Self::default()
            }
        }

        fn pushed(&self) -> Vec<(LedgerKind, Value)> {
            self.pushed.lock().unwrap().clone()
        }

        fn heal(&self) {
            *self.failing.lock().unwrap() = None;
        }
    }

    #[async_trait]
    impl SyncTarget for FakeTarget {
        async fn push(&self, kind: LedgerKind, payload: &Value) -> Result<(), RemoteError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if *self.failing.lock().unwrap() == Some(kind) {
                return Err(RemoteError::Request {
                    status: Some(500),
                    message: "rejected".to_string(),
                });
            }
            self.pushed.lock().unwrap().push((kind, payload.clone()));
            Ok(())
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()))
    }

    async fn queue_with(target: Arc<FakeTarget>, policy: FlushPolicy) -> (SyncQueue, Storage) {
        let storage = Storage::in_memory();
        let queue = SyncQueue::new(storage.clone(), target, clock(), policy, Duration::from_secs(300));
        // Manual flushes only.
        queue.set_enabled(false).await.unwrap();
        (queue, storage)
    }

    async fn seed(queue: &SyncQueue) {
        queue.enqueue(LedgerKind::Khazina, json!({ "n": 1 })).await.unwrap();
        queue.enqueue(LedgerKind::Khazina, json!({ "n": 2 })).await.unwrap();
        queue.enqueue(LedgerKind::Sulf, json!({ "n": 3 })).await.unwrap();
    }

    #[tokio::test]
    async fn failed_group_keeps_whole_queue() {
        let target = Arc::new(FakeTarget::failing(LedgerKind::Sulf));
        let (queue, _) = queue_with(target.clone(), FlushPolicy::AllOrNothing).await;
        seed(&queue).await;
        let before = queue.pending_items().await.unwrap();

        let outcome = queue.flush().await;
        assert!(matches!(outcome, FlushOutcome::Failed { kind: Some(LedgerKind::Sulf), pushed: 2, .. }));
        assert_eq!(queue.pending_items().await.unwrap(), before);
        assert_eq!(target.pushed().len(), 2);

        let status = queue.status();
        assert!(!status.is_online);
        assert_eq!(status.items_pending, 3);
        assert_eq!(status.last_sync_time, None);
    }

    #[tokio::test]
    async fn successful_flush_empties_queue() {
        let target = Arc::new(FakeTarget::default());
        let (queue, storage) = queue_with(target.clone(), FlushPolicy::AllOrNothing).await;
        seed(&queue).await;

        assert_eq!(queue.flush().await, FlushOutcome::Flushed { pushed: 3 });
        assert!(queue.pending_items().await.unwrap().is_empty());
        assert_eq!(storage.get(PENDING_WRITES_KEY).await.unwrap(), None);

        let kinds: Vec<_> = target.pushed().into_iter().map(|(kind, _)| kind).collect();
        assert_eq!(kinds, vec![LedgerKind::Khazina, LedgerKind::Khazina, LedgerKind::Sulf]);

        let status = queue.status();
        assert!(status.is_online);
        assert_eq!(status.items_pending, 0);
        assert_eq!(status.last_sync_time, Some(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()));
    }

    #[tokio::test]
    async fn per_group_policy_keeps_only_failed_groups() {
        let target = Arc::new(FakeTarget::failing(LedgerKind::Sulf));
        let (queue, _) = queue_with(target.clone(), FlushPolicy::PerGroup).await;
        seed(&queue).await;

        let outcome = queue.flush().await;
        assert!(matches!(outcome, FlushOutcome::Failed { kind: Some(LedgerKind::Sulf), .. }));
        let left = queue.pending_items().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].kind, LedgerKind::Sulf);

        target.heal();
        assert_eq!(queue.flush().await, FlushOutcome::Flushed { pushed: 1 });
        assert!(queue.pending_items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_flush_is_a_success() {
        let (queue, _) = queue_with(Arc::new(FakeTarget::default()), FlushPolicy::AllOrNothing).await;
        assert_eq!(queue.flush().await, FlushOutcome::Empty);
        assert!(queue.status().is_online);
    }

    #[tokio::test]
    async fn overlapping_flush_is_dropped_and_late_enqueues_survive() {
        let gate = Arc::new(Notify::new());
        let target = Arc::new(FakeTarget {
            gate: Some(gate.clone()),
            ..FakeTarget::default()
        });
        let (queue, _) = queue_with(target.clone(), FlushPolicy::AllOrNothing).await;
        queue.enqueue(LedgerKind::Qard, json!({ "n": 1 })).await.unwrap();

        let running = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.flush().await })
        };
        while !queue.is_syncing() {
            tokio::task::yield_now().await;
        }

        assert_eq!(queue.flush().await, FlushOutcome::Skipped);
        assert!(queue.status().is_syncing);

        // Arrives while the first flush is blocked in the target.
        queue.enqueue(LedgerKind::Bait, json!({ "n": 2 })).await.unwrap();

        gate.notify_one();
        assert_eq!(running.await.unwrap(), FlushOutcome::Flushed { pushed: 1 });
        assert!(!queue.is_syncing());

        let left = queue.pending_items().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].kind, LedgerKind::Bait);
    }

    #[tokio::test]
    async fn enqueue_triggers_flush_when_enabled() {
        let target = Arc::new(FakeTarget::default());
        let storage = Storage::in_memory();
        let queue = SyncQueue::new(storage, target.clone(), clock(), FlushPolicy::AllOrNothing, Duration::from_secs(300));

        queue.enqueue(LedgerKind::InstaPay, json!({ "n": 1 })).await.unwrap();
        for _ in 0..100 {
            if queue.pending_items().await.unwrap().is_empty() && !queue.is_syncing() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(queue.pending_items().await.unwrap().is_empty());
        assert_eq!(target.pushed().len(), 1);
    }

    #[tokio::test]
    async fn settings_persist_across_instances() {
        let storage = Storage::in_memory();
        let target = Arc::new(FakeTarget::default());
        let queue = SyncQueue::new(storage.clone(), target.clone(), clock(), FlushPolicy::AllOrNothing, Duration::from_secs(300));
        queue.set_enabled(false).await.unwrap();
        queue.set_interval(Duration::from_secs(60)).await.unwrap();
        queue.enqueue(LedgerKind::Sulf, json!({})).await.unwrap();

        let restored = SyncQueue::new(storage, target, clock(), FlushPolicy::AllOrNothing, Duration::from_secs(300));
        restored.load().await.unwrap();
        assert!(!restored.is_enabled());
        assert_eq!(restored.interval(), Duration::from_secs(60));
        assert_eq!(restored.status().items_pending, 1);

        assert!(restored.set_interval(Duration::ZERO).await.is_err());
    }

    #[tokio::test]
    async fn next_sync_time_follows_interval() {
        let (queue, _) = queue_with(Arc::new(FakeTarget::default()), FlushPolicy::AllOrNothing).await;
        queue.set_enabled(true).await.unwrap();
        assert_eq!(queue.status().next_sync_time, None);

        queue.flush().await;
        let status = queue.status();
        assert_eq!(
            status.next_sync_time,
            Some(Utc.with_ymd_and_hms(2025, 6, 1, 12, 5, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn zero_interval_is_raised_to_the_minimum() {
        let queue = SyncQueue::new(
            Storage::in_memory(),
            Arc::new(FakeTarget::default()),
            clock(),
            FlushPolicy::AllOrNothing,
            Duration::ZERO,
        );
        assert_eq!(queue.interval(), crate::config::MIN_INTERVAL);
    }

    #[tokio::test]
    async fn fresh_queue_reports_online_until_a_flush_fails() {
        let target = Arc::new(FakeTarget::failing(LedgerKind::Bait));
        let (queue, _) = queue_with(target, FlushPolicy::AllOrNothing).await;
        assert!(queue.status().is_online);

        queue.enqueue(LedgerKind::Bait, json!({ "n": 1 })).await.unwrap();
        queue.flush().await;
        assert!(!queue.status().is_online);
    }

    #[tokio::test]
    async fn settings_writes_wait_for_the_config_lock() {
        let (queue, storage) = queue_with(Arc::new(FakeTarget::default()), FlushPolicy::AllOrNothing).await;
        let guard = storage.lock(SYNC_CONFIG_KEY).await;

        let toggle = tokio::spawn({
            let queue = queue.clone();
            async move { queue.set_enabled(true).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!toggle.is_finished());

        drop(guard);
        toggle.await.unwrap().unwrap();
        let saved: SyncSettings = storage.get_json(SYNC_CONFIG_KEY).await.unwrap().unwrap();
        assert!(saved.enabled);
        assert_eq!(saved.enabled, queue.is_enabled());
    }
}
