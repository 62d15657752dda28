//! Storage mode selection and remote availability probing.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::remote::RemoteLedgerClient;
use crate::storage::Storage;

pub const STORAGE_MODE_KEY: &str = "selrs.storage_mode";

/// User-chosen routing mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Local storage only.
    #[default]
    Offline,
    /// Remote first, local fallback.
    Api,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Offline => "offline",
            StorageMode::Api => "api",
        }
    }
}

impl core::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "offline" => Ok(StorageMode::Offline),
            "api" => Ok(StorageMode::Api),
            other => Err(format!("unknown storage mode '{other}'")),
        }
    }
}

/// Persisted storage mode. Missing or unreadable values read as offline.
#[derive(Debug, Clone)]
pub struct ModeStore {
    storage: Storage,
}

impl ModeStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn get(&self) -> StorageMode {
        match self.storage.get(STORAGE_MODE_KEY).await {
            Ok(Some(raw)) => raw.parse().unwrap_or_else(|err| {
                tracing::warn!(error = %err, "ignoring stored storage mode");
                StorageMode::Offline
            }),
            Ok(None) => StorageMode::Offline,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read storage mode, assuming offline");
                StorageMode::Offline
            }
        }
    }

    pub async fn set(&self, mode: StorageMode) -> Result<(), StoreError> {
        self.storage.set(STORAGE_MODE_KEY, mode.as_str().to_string()).await?;
        tracing::info!(%mode, "storage mode changed");
        Ok(())
    }
}

/// Answers "can the remote be used right now?": a token must be stored and
/// the health endpoint must answer ok within its timeout.
#[derive(Debug, Clone)]
pub struct AvailabilityProber {
    remote: RemoteLedgerClient,
}

impl AvailabilityProber {
    pub fn new(remote: RemoteLedgerClient) -> Self {
        Self { remote }
    }

    /// Never fails; every problem reads as unavailable.
    pub async fn is_available(&self) -> bool {
        match self.remote.credentials().get_token().await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::debug!("remote unavailable: not authenticated");
                return false;
            }
            Err(err) => {
                tracing::debug!(error = %err, "remote unavailable: token unreadable");
                return false;
            }
        }

        match self.remote.health().await {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(error = %err, "remote unavailable: health check failed");
                false
            }
        }
    }
}
