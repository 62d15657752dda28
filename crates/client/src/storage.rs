//! Shared handle over the key-value backend with per-key write serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::OwnedMutexGuard;

use crate::error::{KvError, StoreError};
use crate::kv::{KeyValueStore, MemoryKeyValueStore};

/// Registry of one async mutex per storage key.
#[derive(Debug, Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    fn entry(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.to_string()).or_default().clone()
    }
}

/// Cloneable storage handle shared by every component.
///
/// Read-modify-write cycles on a key must hold [`Storage::lock`] for that key
/// so concurrent writers cannot lose each other's updates.
#[derive(Clone)]
pub struct Storage {
    kv: Arc<dyn KeyValueStore>,
    locks: Arc<KeyLocks>,
}

impl core::fmt::Debug for Storage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

impl Storage {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            locks: Arc::new(KeyLocks::default()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKeyValueStore::new()))
    }

    /// Acquire the write lock for `key`.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        self.locks.entry(key).lock_owned().await
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.kv.get(key).await
    }

    pub async fn set(&self, key: &str, value: String) -> Result<(), KvError> {
        self.kv.set(key, value).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), KvError> {
        self.kv.remove(key).await
    }

    pub async fn multi_remove(&self, keys: &[&str]) -> Result<(), KvError> {
        self.kv.multi_remove(keys).await
    }

    /// Read and decode a JSON document; an undecodable value is [`StoreError::Corrupt`].
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| StoreError::Corrupt(format!("{key}: {err}")))
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)
            .map_err(|err| StoreError::StorageWrite(format!("{key}: {err}")))?;
        self.kv.set(key, raw).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn json_helpers_flag_corrupt_documents() {
        let storage = Storage::in_memory();
        storage.set_json("list", &vec![1, 2, 3]).await.unwrap();
        let list: Option<Vec<i32>> = storage.get_json("list").await.unwrap();
        assert_eq!(list, Some(vec![1, 2, 3]));

        storage.set("list", "{not json".to_string()).await.unwrap();
        let err = storage.get_json::<Vec<i32>>("list").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));

        assert_eq!(storage.get_json::<Vec<i32>>("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn lock_serializes_same_key_only() {
        let storage = Storage::in_memory();
        let guard = storage.lock("a").await;

        // A different key is independent.
        let other = tokio::time::timeout(Duration::from_millis(50), storage.lock("b")).await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(Duration::from_millis(50), storage.lock("a")).await;
        assert!(same.is_err());

        drop(guard);
        let same = tokio::time::timeout(Duration::from_millis(50), storage.lock("a")).await;
        assert!(same.is_ok());
    }
}
