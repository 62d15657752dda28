//! Delivery of pending writes to the sync server.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use selrs_core::LedgerKind;

use crate::config::ClientConfig;
use crate::error::RemoteError;
use crate::wire::ApiResponse;

/// Destination of flushed pending writes.
#[async_trait]
pub trait SyncTarget: Send + Sync {
    /// Deliver one queued payload for `kind`.
    async fn push(&self, kind: LedgerKind, payload: &Value) -> Result<(), RemoteError>;
}

/// Sync server client: `POST {server}/api/{kind}` with HTTP basic auth.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    server_url: String,
    username: String,
    password: String,
    timeout: Duration,
}

impl ServiceClient {
    pub fn new(config: &ClientConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| RemoteError::Network(err.to_string()))?;
        Ok(Self {
            http,
            server_url: config.sync_server_url.trim_end_matches('/').to_string(),
            username: config.sync_username.clone(),
            password: config.sync_password.clone(),
            timeout: config.sync_timeout,
        })
    }
}

#[async_trait]
impl SyncTarget for ServiceClient {
    async fn push(&self, kind: LedgerKind, payload: &Value) -> Result<(), RemoteError> {
        let url = format!("{}/api/{kind}", self.server_url);
        let response = self
            .http
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiResponse<Value>>(&body)
            .ok()
            .and_then(|envelope| envelope.failure_message().map(str::to_string))
            .unwrap_or_else(|| format!("sync server rejected {kind} write"));
        Err(RemoteError::Request {
            status: Some(status.as_u16()),
            message,
        })
    }
}
