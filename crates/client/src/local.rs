//! Device-local persistence of ledger collections.
//!
//! Each ledger kind is one JSON array under its storage key. Every write
//! rewrites the whole collection while holding that key's lock.

use std::collections::HashSet;
use std::marker::PhantomData;

use selrs_core::{LedgerRecord, RecordId};

use crate::error::StoreError;
use crate::storage::Storage;

/// Local store for one ledger kind.
pub struct LocalLedgerStore<R> {
    storage: Storage,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for LocalLedgerStore<R> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            _record: PhantomData,
        }
    }
}

impl<R: LedgerRecord> LocalLedgerStore<R> {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            _record: PhantomData,
        }
    }

    fn key(&self) -> &'static str {
        R::KIND.storage_key()
    }

    /// `None` when the collection has never been written.
    async fn load(&self) -> Result<Option<Vec<R>>, StoreError> {
        self.storage.get_json(self.key()).await
    }

    async fn save(&self, items: &[R]) -> Result<(), StoreError> {
        self.storage.set_json(self.key(), items).await
    }

    /// All records in insertion order, optionally restricted to one partition.
    pub async fn list(&self, partition: Option<i32>) -> Result<Vec<R>, StoreError> {
        let items = self.load().await?.unwrap_or_default();
        Ok(match partition {
            Some(p) => items
                .into_iter()
                .filter(|item| item.partition() == Some(p))
                .collect(),
            None => items,
        })
    }

    pub async fn get(&self, id: &RecordId) -> Result<Option<R>, StoreError> {
        let items = self.load().await?.unwrap_or_default();
        Ok(items.into_iter().find(|item| item.id() == id))
    }

    /// Append a record with a freshly generated id.
    pub async fn create(&self, input: R::Input) -> Result<R, StoreError> {
        let mut created = self.create_many(vec![input]).await?;
        created
            .pop()
            .ok_or_else(|| StoreError::StorageWrite("no record was created".to_string()))
    }

    /// Append several records in a single write.
    pub async fn create_many(&self, inputs: Vec<R::Input>) -> Result<Vec<R>, StoreError> {
        let _guard = self.storage.lock(self.key()).await;
        let mut items = self.load().await?.unwrap_or_default();

        let taken: HashSet<RecordId> = items.iter().map(|item| item.id().clone()).collect();
        let mut created = Vec::with_capacity(inputs.len());
        for input in inputs {
            let mut id = RecordId::generate();
            while taken.contains(&id) {
                id = RecordId::generate();
            }
            created.push(R::from_input(id, input));
        }

        items.extend(created.iter().cloned());
        self.save(&items).await?;
        tracing::debug!(kind = %R::KIND, count = created.len(), "created local records");
        Ok(created)
    }

    /// Replace the editable fields of an existing record and recompute derived ones.
    pub async fn update(&self, id: &RecordId, input: R::Input) -> Result<R, StoreError> {
        let _guard = self.storage.lock(self.key()).await;
        let mut items = self
            .load()
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("no {} data stored", R::KIND)))?;

        let slot = items
            .iter_mut()
            .find(|item| item.id() == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        *slot = R::from_input(id.clone(), input);
        let updated = slot.clone();

        self.save(&items).await?;
        tracing::debug!(kind = %R::KIND, %id, "updated local record");
        Ok(updated)
    }

    /// Remove a record. Deleting an id that is not present is a no-op, but the
    /// collection itself must exist.
    pub async fn delete(&self, id: &RecordId) -> Result<(), StoreError> {
        let _guard = self.storage.lock(self.key()).await;
        let mut items = self
            .load()
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("no {} data stored", R::KIND)))?;

        let before = items.len();
        items.retain(|item| item.id() != id);
        if items.len() == before {
            tracing::debug!(kind = %R::KIND, %id, "delete of unknown record ignored");
            return Ok(());
        }

        self.save(&items).await?;
        tracing::debug!(kind = %R::KIND, %id, "deleted local record");
        Ok(())
    }

    /// Remove every record, or only those in `partition`.
    pub async fn clear(&self, partition: Option<i32>) -> Result<(), StoreError> {
        let _guard = self.storage.lock(self.key()).await;
        let remaining = match partition {
            Some(p) => {
                let mut items = self.load().await?.unwrap_or_default();
                items.retain(|item| item.partition() != Some(p));
                items
            }
            None => Vec::new(),
        };
        self.save(&remaining).await?;
        tracing::info!(kind = %R::KIND, ?partition, remaining = remaining.len(), "cleared local records");
        Ok(())
    }
}
