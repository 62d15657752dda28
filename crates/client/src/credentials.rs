//! Persisted bearer token for the remote API.

use crate::error::KvError;
use crate::storage::Storage;

pub const AUTH_TOKEN_KEY: &str = "selrs.auth_token";

#[derive(Debug, Clone)]
pub struct CredentialStore {
    storage: Storage,
}

impl CredentialStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// The stored token; blank values count as absent.
    pub async fn get_token(&self) -> Result<Option<String>, KvError> {
        Ok(self
            .storage
            .get(AUTH_TOKEN_KEY)
            .await?
            .filter(|token| !token.trim().is_empty()))
    }

    pub async fn set_token(&self, token: &str) -> Result<(), KvError> {
        self.storage.set(AUTH_TOKEN_KEY, token.to_string()).await
    }

    pub async fn clear_token(&self) -> Result<(), KvError> {
        self.storage.remove(AUTH_TOKEN_KEY).await
    }
}
