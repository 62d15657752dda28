//! Device key-value persistence.
//!
//! Every ledger collection, queue and setting lives under a single string key
//! as a JSON document. Backends only move strings; [`crate::storage::Storage`]
//! layers per-key locking and JSON on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use crate::error::KvError;

/// String key-value persistence with get/set/remove/multi-remove.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn set(&self, key: &str, value: String) -> Result<(), KvError>;

    async fn remove(&self, key: &str) -> Result<(), KvError>;

    async fn multi_remove(&self, keys: &[&str]) -> Result<(), KvError> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

/// In-process store, used by tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), KvError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), KvError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }

    async fn multi_remove(&self, keys: &[&str]) -> Result<(), KvError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum SqliteLocation {
    File(PathBuf),
    Memory,
}

/// SQLite-backed store (table `kv_store`), opened lazily on first use.
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    location: SqliteLocation,
    pool: Arc<Mutex<Option<SqlitePool>>>,
}

impl SqliteKeyValueStore {
    /// A database file at `path`; parent directories are created on first use.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            location: SqliteLocation::File(path.as_ref().to_path_buf()),
            pool: Arc::new(Mutex::new(None)),
        }
    }

    /// A private in-memory database.
    pub fn in_memory() -> Self {
        Self {
            location: SqliteLocation::Memory,
            pool: Arc::new(Mutex::new(None)),
        }
    }

    async fn connect(&self) -> Result<SqlitePool, String> {
        match &self.location {
            SqliteLocation::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|err| {
                        format!("failed to create data directory {}: {err}", parent.display())
                    })?;
                }
                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true);
                SqlitePoolOptions::new()
                    .connect_with(options)
                    .await
                    .map_err(|err| format!("failed to open {}: {err}", path.display()))
            }
            // One connection, otherwise every pooled connection sees its own database.
            SqliteLocation::Memory => SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
                .map_err(|err| format!("failed to open in-memory database: {err}")),
        }
    }

    async fn get_pool(&self) -> Result<SqlitePool, String> {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }

        let pool = self.connect().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|err| format!("failed to create kv_store table: {err}"))?;

        tracing::debug!(location = ?self.location, "key-value store initialized");
        *guard = Some(pool.clone());
        Ok(pool)
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let pool = self.get_pool().await.map_err(|err| KvError::read(key, err))?;
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&pool)
            .await
            .map_err(|err| KvError::read(key, err))?;

        row.map(|row| row.try_get::<String, _>("value"))
            .transpose()
            .map_err(|err| KvError::read(key, err))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), KvError> {
        let pool = self.get_pool().await.map_err(|err| KvError::write(key, err))?;
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key)
            DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&value)
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .map_err(|err| KvError::write(key, err))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), KvError> {
        let pool = self.get_pool().await.map_err(|err| KvError::write(key, err))?;
        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&pool)
            .await
            .map_err(|err| KvError::write(key, err))?;
        Ok(())
    }

    async fn multi_remove(&self, keys: &[&str]) -> Result<(), KvError> {
        let joined = keys.join(",");
        let pool = self
            .get_pool()
            .await
            .map_err(|err| KvError::write(&joined, err))?;
        let mut tx = pool
            .begin()
            .await
            .map_err(|err| KvError::write(&joined, err))?;
        for key in keys {
            sqlx::query("DELETE FROM kv_store WHERE key = ?1")
                .bind(*key)
                .execute(&mut *tx)
                .await
                .map_err(|err| KvError::write(key, err))?;
        }
        tx.commit()
            .await
            .map_err(|err| KvError::write(&joined, err))?;
        Ok(())
    }
}
