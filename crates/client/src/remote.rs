//! HTTP client for the remote ledger API.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use selrs_core::RecordId;

use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::{RemoteError, StoreError};
use crate::storage::Storage;
use crate::wire::{ApiResponse, WireRecord};

/// Storage key of the runtime API URL override.
pub const API_URL_KEY: &str = "selrs.api_url";

/// Authenticated client for `/api/...` endpoints.
///
/// Data calls require a stored bearer token; without one they fail with
/// [`RemoteError::NotAuthenticated`] before touching the network.
#[derive(Debug, Clone)]
pub struct RemoteLedgerClient {
    http: reqwest::Client,
    storage: Storage,
    credentials: CredentialStore,
    default_base_url: String,
    health_timeout: Duration,
    data_timeout: Duration,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

impl RemoteLedgerClient {
    pub fn new(config: &ClientConfig, storage: Storage, clock: Arc<dyn Clock>) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| RemoteError::Network(err.to_string()))?;
        Ok(Self {
            http,
            credentials: CredentialStore::new(storage.clone()),
            storage,
            default_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            health_timeout: config.health_timeout,
            data_timeout: config.data_timeout,
            clock,
        })
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Effective base URL: the persisted override, else the configured default.
    pub async fn api_url(&self) -> String {
        match self.storage.get(API_URL_KEY).await {
            Ok(Some(url)) if !url.trim().is_empty() => url.trim().trim_end_matches('/').to_string(),
            Ok(_) => self.default_base_url.clone(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read API URL override, using default");
                self.default_base_url.clone()
            }
        }
    }

    pub async fn set_api_url(&self, url: &str) -> Result<(), StoreError> {
        let url = url.trim().trim_end_matches('/');
        if url.is_empty() {
            self.storage.remove(API_URL_KEY).await?;
        } else {
            self.storage.set(API_URL_KEY, url.to_string()).await?;
        }
        tracing::info!(api_url = %url, "API URL updated");
        Ok(())
    }

    async fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.api_url().await, path)
    }

    async fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder, RemoteError> {
        let token = self
            .credentials
            .get_token()
            .await
            .map_err(|err| RemoteError::Credentials(err.to_string()))?
            .ok_or(RemoteError::NotAuthenticated)?;
        let url = self.url(path).await;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token)
            .timeout(self.data_timeout))
    }

    /// Send a data request and unwrap the `{success, data, error}` envelope.
    async fn execute<T: DeserializeOwned>(request: RequestBuilder) -> Result<ApiResponse<T>, RemoteError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiResponse<Value>>(&body)
                .ok()
                .and_then(|envelope| envelope.failure_message().map(str::to_string))
                .unwrap_or_else(|| {
                    if body.trim().is_empty() {
                        status.canonical_reason().unwrap_or("request failed").to_string()
                    } else {
                        body.clone()
                    }
                });
            return Err(RemoteError::Request {
                status: Some(status.as_u16()),
                message,
            });
        }

        let envelope: ApiResponse<T> =
            serde_json::from_str(&body).map_err(|err| RemoteError::Parse(err.to_string()))?;
        if !envelope.success {
            return Err(RemoteError::Request {
                status: Some(status.as_u16()),
                message: envelope
                    .failure_message()
                    .unwrap_or("request was not successful")
                    .to_string(),
            });
        }
        Ok(envelope)
    }

    fn remote_id(id: &RecordId) -> Result<u64, RemoteError> {
        id.as_remote().ok_or_else(|| RemoteError::InvalidId(id.to_string()))
    }

    /// All records of a ledger, optionally one Khazina year.
    pub async fn get_all<R: WireRecord>(&self, partition: Option<i32>) -> Result<Vec<R>, RemoteError> {
        let mut request = self.authorized(Method::GET, &format!("/{}", R::KIND)).await?;
        if let Some(year) = partition {
            request = request.query(&[("year", year)]);
        }
        let envelope: ApiResponse<Vec<Value>> = Self::execute(request).await?;
        let rows = envelope
            .data
            .ok_or_else(|| RemoteError::Parse("response carries no data".to_string()))?;

        let today = self.clock.today();
        let records = rows
            .iter()
            .map(|row| R::from_wire(row, today))
            .collect::<Result<Vec<R>, _>>()?;
        tracing::debug!(kind = %R::KIND, count = records.len(), "fetched remote records");
        Ok(records)
    }

    pub async fn get_by_id<R: WireRecord>(&self, id: &RecordId) -> Result<Option<R>, RemoteError> {
        let remote_id = Self::remote_id(id)?;
        let request = self
            .authorized(Method::GET, &format!("/{}/{remote_id}", R::KIND))
            .await?;
        let envelope: ApiResponse<Value> = Self::execute(request).await?;
        envelope
            .data
            .filter(Value::is_object)
            .map(|row| R::from_wire(&row, self.clock.today()))
            .transpose()
    }

    /// Create a record; the server may or may not echo it back.
    pub async fn create<R: WireRecord>(&self, input: &R::Input) -> Result<Option<R>, RemoteError> {
        let request = self
            .authorized(Method::POST, &format!("/{}", R::KIND))
            .await?
            .json(&R::to_wire(input));
        let envelope: ApiResponse<Value> = Self::execute(request).await?;
        envelope
            .data
            .filter(Value::is_object)
            .map(|row| R::from_wire(&row, self.clock.today()))
            .transpose()
    }

    pub async fn update<R: WireRecord>(&self, id: &RecordId, input: &R::Input) -> Result<(), RemoteError> {
        let remote_id = Self::remote_id(id)?;
        let request = self
            .authorized(Method::PUT, &format!("/{}/{remote_id}", R::KIND))
            .await?
            .json(&R::to_wire(input));
        Self::execute::<Value>(request).await?;
        Ok(())
    }

    pub async fn delete<R: WireRecord>(&self, id: &RecordId) -> Result<(), RemoteError> {
        let remote_id = Self::remote_id(id)?;
        let request = self
            .authorized(Method::DELETE, &format!("/{}/{remote_id}", R::KIND))
            .await?;
        Self::execute::<Value>(request).await?;
        Ok(())
    }

    /// `GET /api/health`, expecting `{"status":"ok"}`. No token needed.
    pub async fn health(&self) -> Result<(), RemoteError> {
        let url = self.url("/health").await;
        let response = self
            .http
            .get(url)
            .timeout(self.health_timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Request {
                status: Some(status.as_u16()),
                message: "health check failed".to_string(),
            });
        }
        let body: Value = response.json().await?;
        match body.get("status").and_then(Value::as_str) {
            Some("ok") => Ok(()),
            _ => Err(RemoteError::Parse(format!("unexpected health response: {body}"))),
        }
    }

    /// Exchange credentials for a token and store it.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), RemoteError> {
        let url = self.url("/auth/login").await;
        let response = self
            .http
            .post(url)
            .timeout(self.health_timeout)
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        let parsed = serde_json::from_str::<LoginResponse>(&body).ok();

        let token = match parsed {
            Some(LoginResponse { token: Some(token), .. }) if status.is_success() && !token.is_empty() => token,
            Some(LoginResponse { error, message, .. }) => {
                return Err(RemoteError::Request {
                    status: Some(status.as_u16()),
                    message: error.or(message).unwrap_or_else(|| "login failed".to_string()),
                });
            }
            None if status.is_success() => {
                return Err(RemoteError::Parse(format!("unexpected login response: {body}")));
            }
            None => {
                return Err(RemoteError::Request {
                    status: Some(status.as_u16()),
                    message: "login failed".to_string(),
                });
            }
        };

        self.credentials
            .set_token(&token)
            .await
            .map_err(|err| RemoteError::Credentials(err.to_string()))?;
        tracing::info!(%username, "logged in to remote ledger API");
        Ok(())
    }

    pub async fn logout(&self) -> Result<(), StoreError> {
        self.credentials.clear_token().await?;
        tracing::info!("logged out of remote ledger API");
        Ok(())
    }
}
