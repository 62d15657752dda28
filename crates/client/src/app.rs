//! Application wiring and the operations exposed to UI collaborators.

use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;

use selrs_core::LedgerKind;

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::StoreError;
use crate::hybrid::{HybridStorage, Ledger};
use crate::kv::{KeyValueStore, SqliteKeyValueStore};
use crate::offline::StorageMode;
use crate::refresh::{LedgerCache, RefreshWorker};
use crate::remote::RemoteLedgerClient;
use crate::storage::Storage;
use crate::sync_client::{ServiceClient, SyncTarget};
use crate::sync_queue::SyncQueue;
use crate::sync_worker::{SyncWorker, WorkerHandle};
use crate::types::{FlushOutcome, PendingWrite, SyncStatus};
use crate::wire::WireRecord;

/// Fully wired client state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: ClientConfig,
    pub storage: Storage,
    pub remote: RemoteLedgerClient,
    pub hybrid: HybridStorage,
    pub sync_queue: SyncQueue,
    pub cache: LedgerCache,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Open the SQLite store under the configured data directory.
    pub async fn open(config: ClientConfig) -> anyhow::Result<Self> {
        let path = config
            .db_path()
            .context("no data directory available; set SELRS_DATA_DIR")?;
        tracing::info!(db = %path.display(), "opening local database");
        Self::with_store(config, Arc::new(SqliteKeyValueStore::open(path))).await
    }

    pub async fn with_store(config: ClientConfig, kv: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        let target = Arc::new(ServiceClient::new(&config).context("failed to build sync client")?);
        Self::with_parts(config, kv, target, Arc::new(SystemClock)).await
    }

    /// Wire every component from injected persistence, sync target and clock.
    pub async fn with_parts(
        config: ClientConfig,
        kv: Arc<dyn KeyValueStore>,
        target: Arc<dyn SyncTarget>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let storage = Storage::new(kv);
        let remote = RemoteLedgerClient::new(&config, storage.clone(), clock.clone())
            .context("failed to build remote ledger client")?;
        let sync_queue = SyncQueue::new(
            storage.clone(),
            target,
            clock.clone(),
            config.flush_policy,
            config.sync_interval,
        );
        sync_queue
            .load()
            .await
            .context("failed to load sync state")?;
        let hybrid = HybridStorage::new(storage.clone(), remote.clone(), clock.clone())
            .with_sync_queue(sync_queue.clone());

        Ok(Self {
            config,
            storage,
            remote,
            hybrid,
            sync_queue,
            cache: LedgerCache::new(),
            clock,
        })
    }

    /// Start the sync timer and the refresh poller.
    pub fn start_background(&self) -> BackgroundServices {
        let sync = SyncWorker::new(self.sync_queue.clone()).start();
        let refresh = RefreshWorker::new(
            self.hybrid.clone(),
            self.cache.clone(),
            self.clock.clone(),
            self.config.refresh_interval,
        )
        .start();
        BackgroundServices { sync, refresh }
    }

    pub fn ledger<R: WireRecord>(&self) -> Ledger<'_, R> {
        self.hybrid.ledger()
    }

    pub async fn get_mode(&self) -> StorageMode {
        self.hybrid.mode().await
    }

    pub async fn set_mode(&self, mode: StorageMode) -> Result<(), StoreError> {
        self.hybrid.set_mode(mode).await
    }

    pub async fn is_remote_available(&self) -> bool {
        self.hybrid.is_remote_available().await
    }

    pub async fn enqueue_pending_write(&self, kind: LedgerKind, payload: Value) -> Result<PendingWrite, StoreError> {
        self.sync_queue.enqueue(kind, payload).await
    }

    pub async fn pending_writes(&self) -> Result<Vec<PendingWrite>, StoreError> {
        self.sync_queue.pending_items().await
    }

    pub async fn flush_now(&self) -> FlushOutcome {
        self.sync_queue.flush().await
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync_queue.status()
    }

    pub async fn set_sync_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.sync_queue.set_enabled(enabled).await
    }

    pub async fn login(&self, username: &str, password: &str) -> anyhow::Result<()> {
        self.remote
            .login(username, password)
            .await
            .context("login failed")
    }

    pub async fn logout(&self) -> Result<(), StoreError> {
        self.remote.logout().await
    }
}

/// Running background workers.
#[derive(Debug)]
pub struct BackgroundServices {
    pub sync: WorkerHandle,
    pub refresh: WorkerHandle,
}

impl BackgroundServices {
    pub async fn stop(self) {
        self.sync.stop().await;
        self.refresh.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use selrs_core::{SulfInput, SulfRecord};
    use serde_json::json;

    use super::*;
    use crate::kv::MemoryKeyValueStore;

    async fn app() -> AppState {
        let config = ClientConfig::default()
            .with_api_url("http://127.0.0.1:9")
            .with_timeouts(Duration::from_secs(1), Duration::from_secs(1), Duration::from_secs(1));
        AppState::with_store(config, Arc::new(MemoryKeyValueStore::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn offline_round_trip_through_app_state() {
        let app = app().await;
        app.set_sync_enabled(false).await.unwrap();
        assert_eq!(app.get_mode().await, StorageMode::Offline);
        assert!(!app.is_remote_available().await);

        let rec = app
            .ledger::<SulfRecord>()
            .create(SulfInput {
                name: "Hassan".to_string(),
                advance: 300.0,
                payment: 100.0,
                date: "12/05/2025".to_string(),
                notes: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(rec.remaining, 200.0);
        assert_eq!(rec.date, "12-05-2025");
        assert_eq!(app.ledger::<SulfRecord>().list(None).await.unwrap(), vec![rec]);
    }

    #[tokio::test]
    async fn manual_queue_operations() {
        let app = app().await;
        app.set_sync_enabled(false).await.unwrap();

        app.enqueue_pending_write(LedgerKind::Bait, json!({ "name": "x" }))
            .await
            .unwrap();
        assert_eq!(app.pending_writes().await.unwrap().len(), 1);
        assert_eq!(app.sync_status().items_pending, 1);
        assert!(!app.sync_status().enabled);

        // Sync server unreachable: entry stays queued.
        let outcome = app.flush_now().await;
        assert!(!outcome.is_success());
        assert_eq!(app.pending_writes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn background_services_start_and_stop() {
        let app = app().await;
        app.set_sync_enabled(false).await.unwrap();
        let services = app.start_background();
        services.stop().await;
    }
}
