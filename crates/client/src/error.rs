//! Error types of the storage/reconciliation layer.

use selrs_core::DomainError;
use thiserror::Error;

/// Failure of the key-value persistence backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KvError {
    #[error("failed to read key '{key}': {message}")]
    Read { key: String, message: String },
    #[error("failed to write key '{key}': {message}")]
    Write { key: String, message: String },
}

impl KvError {
    pub fn read(key: &str, message: impl ToString) -> Self {
        Self::Read {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    pub fn write(key: &str, message: impl ToString) -> Self {
        Self::Write {
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}

/// Local storage failure. This is the only error the hybrid facade surfaces.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("storage write failed: {0}")]
    StorageWrite(String),
    #[error("storage read failed: {0}")]
    StorageRead(String),
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
    #[error("invalid input: {0}")]
    Validation(String),
}

impl From<KvError> for StoreError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::Read { .. } => StoreError::StorageRead(err.to_string()),
            KvError::Write { .. } => StoreError::StorageWrite(err.to_string()),
        }
    }
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound(id) => StoreError::NotFound(id),
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                StoreError::Validation(msg)
            }
        }
    }
}

/// Remote path failure. Recovered locally by the facade and by retry in the
/// sync queue; never surfaced to callers of ledger operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("remote request failed ({}): {message}", status.map(|s| s.to_string()).unwrap_or_else(|| "no status".to_string()))]
    Request { status: Option<u16>, message: String },
    #[error("remote request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed remote response: {0}")]
    Parse(String),
    #[error("'{0}' is not a remote record id")]
    InvalidId(String),
    #[error("credential storage failed: {0}")]
    Credentials(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_decode() {
            RemoteError::Parse(err.to_string())
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}
