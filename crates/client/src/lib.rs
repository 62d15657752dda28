//! `selrs-client`
//!
//! Offline-first storage and reconciliation for the Khazina, Sulf, Qard, Bait
//! and InstaPay ledgers:
//! - a local ledger store over device key-value storage
//! - a remote ledger client for the HTTP API
//! - a hybrid facade that prefers the remote and falls back to local storage
//! - a persisted pending-write queue flushed to the sync server
//! - background workers for flushing and refreshing

pub mod app;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod hybrid;
pub mod kv;
pub mod local;
pub mod offline;
pub mod refresh;
pub mod remote;
pub mod storage;
pub mod sync_client;
pub mod sync_queue;
pub mod sync_worker;
pub mod types;
pub mod wire;

pub use app::{AppState, BackgroundServices};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, ConfigError, MIN_INTERVAL};
pub use credentials::CredentialStore;
pub use error::{KvError, RemoteError, StoreError};
pub use hybrid::{FallbackReason, HybridStorage, Ledger, Routed};
pub use kv::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
pub use local::LocalLedgerStore;
pub use offline::{AvailabilityProber, ModeStore, StorageMode};
pub use refresh::{LedgerCache, LedgerSnapshot, RefreshReport, RefreshWorker, refresh_all};
pub use remote::RemoteLedgerClient;
pub use storage::Storage;
pub use sync_client::{ServiceClient, SyncTarget};
pub use sync_queue::SyncQueue;
pub use sync_worker::{SyncWorker, WorkerHandle};
pub use types::{ConnectivityState, FlushOutcome, FlushPolicy, PendingWrite, SyncStatus};
pub use wire::{ApiResponse, WireRecord};
