//! Periodic refresh of every ledger through the facade.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use selrs_core::{
    BaitRecord, InstaPayRecord, KhazinaRecord, LedgerKind, QardRecord, SulfRecord,
};

use crate::clock::Clock;
use crate::config::clamp_interval;
use crate::error::StoreError;
use crate::hybrid::HybridStorage;
use crate::sync_worker::WorkerHandle;
use crate::wire::WireRecord;

/// Last successful read of every ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerSnapshot {
    pub khazina: Vec<KhazinaRecord>,
    pub sulf: Vec<SulfRecord>,
    pub qard: Vec<QardRecord>,
    pub bait: Vec<BaitRecord>,
    pub instapay: Vec<InstaPayRecord>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Shared in-memory copy of the ledgers for display layers.
#[derive(Debug, Clone, Default)]
pub struct LedgerCache {
    inner: Arc<RwLock<LedgerSnapshot>>,
}

impl LedgerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update(&self, apply: impl FnOnce(&mut LedgerSnapshot)) {
        let mut snapshot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut snapshot);
    }
}

/// Per-ledger outcome of one refresh round.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub results: Vec<(LedgerKind, Result<usize, StoreError>)>,
}

impl RefreshReport {
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|(_, result)| result.is_err()).count()
    }
}

async fn refresh_one<R: WireRecord>(
    hybrid: &HybridStorage,
    cache: &LedgerCache,
    store: fn(&mut LedgerSnapshot, Vec<R>),
) -> Result<usize, StoreError> {
    let records = hybrid.ledger::<R>().list(None).await?;
    let count = records.len();
    cache.update(|snapshot| store(snapshot, records));
    Ok(count)
}

/// Read every ledger once; a failing ledger does not stop the others.
pub async fn refresh_all(
    hybrid: &HybridStorage,
    cache: &LedgerCache,
    clock: &dyn Clock,
) -> RefreshReport {
    let results = vec![
        (
            LedgerKind::Khazina,
            refresh_one::<KhazinaRecord>(hybrid, cache, |s, r| s.khazina = r).await,
        ),
        (
            LedgerKind::Sulf,
            refresh_one::<SulfRecord>(hybrid, cache, |s, r| s.sulf = r).await,
        ),
        (
            LedgerKind::Qard,
            refresh_one::<QardRecord>(hybrid, cache, |s, r| s.qard = r).await,
        ),
        (
            LedgerKind::Bait,
            refresh_one::<BaitRecord>(hybrid, cache, |s, r| s.bait = r).await,
        ),
        (
            LedgerKind::InstaPay,
            refresh_one::<InstaPayRecord>(hybrid, cache, |s, r| s.instapay = r).await,
        ),
    ];

    for (kind, result) in &results {
        if let Err(err) = result {
            tracing::error!(%kind, error = %err, "ledger refresh failed");
        }
    }
    cache.update(|snapshot| snapshot.refreshed_at = Some(clock.now()));

    RefreshReport { results }
}

/// Refreshes the [`LedgerCache`] immediately and then every `interval`.
pub struct RefreshWorker {
    hybrid: HybridStorage,
    cache: LedgerCache,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl RefreshWorker {
    /// An `interval` below [`MIN_INTERVAL`](crate::config::MIN_INTERVAL) is raised to it.
    pub fn new(
        hybrid: HybridStorage,
        cache: LedgerCache,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            hybrid,
            cache,
            clock,
            interval: clamp_interval("refresh", interval),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn start(self) -> WorkerHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();

        let join = tokio::spawn(async move {
            tracing::info!(interval_secs = self.interval.as_secs(), "refresh worker started");

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = signal.notified() => break,
                    _ = ticker.tick() => {
                        let report = refresh_all(&self.hybrid, &self.cache, self.clock.as_ref()).await;
                        tracing::debug!(failures = report.failures(), "ledger refresh finished");
                    }
                }
            }
            tracing::info!("refresh worker stopped");
        });

        WorkerHandle::new("refresh", shutdown, join)
    }
}
