//! Single entry point for ledger operations across remote and local storage.
//!
//! Each operation reads the storage mode, probes the remote when in API mode,
//! tries the remote, and on any remote problem performs the same operation
//! locally. The route taken is reported as a [`Routed`] value; remote
//! failures are logged and never returned to the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use selrs_core::RecordId;

use crate::clock::Clock;
use crate::error::{RemoteError, StoreError};
use crate::local::LocalLedgerStore;
use crate::offline::{AvailabilityProber, ModeStore, StorageMode};
use crate::remote::RemoteLedgerClient;
use crate::storage::Storage;
use crate::sync_queue::SyncQueue;
use crate::wire::WireRecord;

pub const LAST_SYNC_KEY: &str = "selrs.last_sync";

/// Why an operation ran against local storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The user chose offline mode.
    OfflineMode,
    /// The prober found no token or no healthy server.
    RemoteUnavailable,
    /// The remote call itself failed.
    RemoteFailed(RemoteError),
}

/// Result of a facade operation tagged with the path that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed<T> {
    Remote(T),
    Local { reason: FallbackReason, value: T },
}

impl<T> Routed<T> {
    pub fn value(&self) -> &T {
        match self {
            Routed::Remote(value) | Routed::Local { value, .. } => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Routed::Remote(value) | Routed::Local { value, .. } => value,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Routed::Remote(_))
    }

    pub fn fallback_reason(&self) -> Option<&FallbackReason> {
        match self {
            Routed::Remote(_) => None,
            Routed::Local { reason, .. } => Some(reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HybridStorage {
    storage: Storage,
    modes: ModeStore,
    prober: AvailabilityProber,
    remote: RemoteLedgerClient,
    queue: Option<SyncQueue>,
    clock: Arc<dyn Clock>,
}

impl HybridStorage {
    pub fn new(storage: Storage, remote: RemoteLedgerClient, clock: Arc<dyn Clock>) -> Self {
        Self {
            modes: ModeStore::new(storage.clone()),
            prober: AvailabilityProber::new(remote.clone()),
            storage,
            remote,
            queue: None,
            clock,
        }
    }

    /// Also enqueue creates that land locally while sync is enabled.
    pub fn with_sync_queue(mut self, queue: SyncQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Operations on one ledger kind.
    pub fn ledger<R: WireRecord>(&self) -> Ledger<'_, R> {
        Ledger {
            hybrid: self,
            local: LocalLedgerStore::new(self.storage.clone()),
        }
    }

    pub async fn mode(&self) -> StorageMode {
        self.modes.get().await
    }

    pub async fn set_mode(&self, mode: StorageMode) -> Result<(), StoreError> {
        self.modes.set(mode).await
    }

    pub async fn is_remote_available(&self) -> bool {
        self.prober.is_available().await
    }

    /// Time of the last successful remote operation.
    pub async fn last_sync(&self) -> Option<DateTime<Utc>> {
        match self.storage.get(LAST_SYNC_KEY).await {
            Ok(Some(raw)) => DateTime::parse_from_rfc3339(&raw)
                .map(|at| at.with_timezone(&Utc))
                .ok(),
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "failed to read last sync time");
                None
            }
        }
    }

    async fn record_sync(&self) {
        let now = self.clock.now().to_rfc3339();
        if let Err(err) = self.storage.set(LAST_SYNC_KEY, now).await {
            warn!(error = %err, "failed to record last sync time");
        }
    }

    /// `Ok` when the remote should be attempted.
    async fn route(&self) -> Result<(), FallbackReason> {
        if self.modes.get().await == StorageMode::Offline {
            return Err(FallbackReason::OfflineMode);
        }
        if !self.prober.is_available().await {
            return Err(FallbackReason::RemoteUnavailable);
        }
        Ok(())
    }
}

/// Facade operations for records of type `R`.
pub struct Ledger<'a, R> {
    hybrid: &'a HybridStorage,
    local: LocalLedgerStore<R>,
}

impl<R: WireRecord> Ledger<'_, R> {
    fn fallback(&self, op: &'static str, err: RemoteError) -> FallbackReason {
        warn!(kind = %R::KIND, op, error = %err, "remote call failed, using local storage");
        FallbackReason::RemoteFailed(err)
    }

    /// Run `remote` if routing allows, else report why not.
    async fn try_remote<T, F>(&self, op: &'static str, remote: F) -> Result<T, FallbackReason>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        self.hybrid.route().await?;
        match remote.await {
            Ok(value) => {
                self.hybrid.record_sync().await;
                debug!(kind = %R::KIND, op, "served by remote");
                Ok(value)
            }
            Err(err) => Err(self.fallback(op, err)),
        }
    }

    pub async fn list(&self, partition: Option<i32>) -> Result<Vec<R>, StoreError> {
        Ok(self.list_routed(partition).await?.into_inner())
    }

    pub async fn list_routed(&self, partition: Option<i32>) -> Result<Routed<Vec<R>>, StoreError> {
        let remote = self.hybrid.remote.get_all::<R>(partition);
        match self.try_remote("list", remote).await {
            Ok(records) => Ok(Routed::Remote(records)),
            Err(reason) => Ok(Routed::Local {
                reason,
                value: self.local.list(partition).await?,
            }),
        }
    }

    pub async fn get(&self, id: &RecordId) -> Result<Option<R>, StoreError> {
        Ok(self.get_routed(id).await?.into_inner())
    }

    pub async fn get_routed(&self, id: &RecordId) -> Result<Routed<Option<R>>, StoreError> {
        let remote = self.hybrid.remote.get_by_id::<R>(id);
        match self.try_remote("get", remote).await {
            Ok(record) => Ok(Routed::Remote(record)),
            Err(reason) => Ok(Routed::Local {
                reason,
                value: self.local.get(id).await?,
            }),
        }
    }

    pub async fn create(&self, input: R::Input) -> Result<R, StoreError> {
        Ok(self.create_routed(input).await?.into_inner())
    }

    /// Validates `input` before touching any storage.
    pub async fn create_routed(&self, input: R::Input) -> Result<Routed<R>, StoreError> {
        let input = R::normalize_input(input)?;

        let remote = self.hybrid.remote.create::<R>(&input);
        let reason = match self.try_remote("create", remote).await {
            Ok(Some(record)) => return Ok(Routed::Remote(record)),
            Ok(None) => return Ok(Routed::Remote(R::from_input(RecordId::generate(), input))),
            Err(reason) => reason,
        };

        let record = self.local.create(input).await?;
        self.enqueue_local_create(&record).await;
        Ok(Routed::Local {
            reason,
            value: record,
        })
    }

    async fn enqueue_local_create(&self, record: &R) {
        let Some(queue) = &self.hybrid.queue else {
            return;
        };
        if !queue.is_enabled() {
            return;
        }
        let payload = R::to_wire(&record.to_input());
        if let Err(err) = queue.enqueue(R::KIND, payload).await {
            warn!(kind = %R::KIND, id = %record.id(), error = %err, "failed to enqueue local create");
        }
    }

    pub async fn update(&self, id: &RecordId, input: R::Input) -> Result<(), StoreError> {
        self.update_routed(id, input).await.map(|_| ())
    }

    pub async fn update_routed(&self, id: &RecordId, input: R::Input) -> Result<Routed<()>, StoreError> {
        let input = R::normalize_input(input)?;

        let remote = self.hybrid.remote.update::<R>(id, &input);
        match self.try_remote("update", remote).await {
            Ok(()) => Ok(Routed::Remote(())),
            Err(reason) => {
                self.local.update(id, input).await?;
                Ok(Routed::Local { reason, value: () })
            }
        }
    }

    pub async fn delete(&self, id: &RecordId) -> Result<(), StoreError> {
        self.delete_routed(id).await.map(|_| ())
    }

    pub async fn delete_routed(&self, id: &RecordId) -> Result<Routed<()>, StoreError> {
        let remote = self.hybrid.remote.delete::<R>(id);
        match self.try_remote("delete", remote).await {
            Ok(()) => Ok(Routed::Remote(())),
            Err(reason) => {
                self.local.delete(id).await?;
                Ok(Routed::Local { reason, value: () })
            }
        }
    }

    /// Local only; the remote API has no bulk delete.
    pub async fn clear(&self, partition: Option<i32>) -> Result<(), StoreError> {
        self.local.clear(partition).await
    }
}
