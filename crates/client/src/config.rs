//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::FlushPolicy;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";

/// Shortest period the background timers run at.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// `interval`, raised to [`MIN_INTERVAL`] when shorter.
pub(crate) fn clamp_interval(timer: &'static str, interval: Duration) -> Duration {
    if interval < MIN_INTERVAL {
        tracing::warn!(
            timer,
            requested_ms = interval.as_millis() as u64,
            "interval below minimum, using {}s",
            MIN_INTERVAL.as_secs()
        );
        return MIN_INTERVAL;
    }
    interval
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration of the storage and sync layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Default remote API base URL; a persisted override wins.
    pub api_base_url: String,
    pub sync_server_url: String,
    pub sync_username: String,
    pub sync_password: String,
    /// Timeout of health and auth calls.
    pub health_timeout: Duration,
    /// Timeout of data calls.
    pub data_timeout: Duration,
    /// Timeout of each sync-server push.
    pub sync_timeout: Duration,
    pub sync_interval: Duration,
    pub refresh_interval: Duration,
    pub flush_policy: FlushPolicy,
    /// Where the SQLite database lives; `None` if no data directory is known.
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            sync_server_url: DEFAULT_API_URL.to_string(),
            sync_username: "admin".to_string(),
            sync_password: String::new(),
            health_timeout: Duration::from_secs(5),
            data_timeout: Duration::from_secs(15),
            sync_timeout: Duration::from_secs(10),
            sync_interval: Duration::from_secs(300),
            refresh_interval: Duration::from_secs(300),
            flush_policy: FlushPolicy::default(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .map(|base| base.join("selrs"))
}

fn trim_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

impl ClientConfig {
    /// Both the API and the sync server at `url`.
    pub fn with_api_url(mut self, url: impl AsRef<str>) -> Self {
        self.api_base_url = trim_url(url.as_ref());
        self.sync_server_url = self.api_base_url.clone();
        self
    }

    pub fn with_sync_server(
        mut self,
        url: impl AsRef<str>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.sync_server_url = trim_url(url.as_ref());
        self.sync_username = username.into();
        self.sync_password = password.into();
        self
    }

    pub fn with_timeouts(mut self, health: Duration, data: Duration, sync: Duration) -> Self {
        self.health_timeout = health;
        self.data_timeout = data;
        self.sync_timeout = sync;
        self
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush_policy = policy;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// SQLite database file inside the data directory.
    pub fn db_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("selrs.db"))
    }

    /// Load from `SELRS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using `lookup` for variable values; unset variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get("SELRS_API_URL") {
            config = config.with_api_url(url);
        }
        if let Some(url) = get("SELRS_SYNC_URL") {
            config.sync_server_url = trim_url(&url);
        }
        if let Some(user) = get("SELRS_SYNC_USER") {
            config.sync_username = user;
        }
        if let Some(password) = lookup("SELRS_SYNC_PASSWORD") {
            config.sync_password = password;
        }

        let secs = |var: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match get(var) {
                None => Ok(default),
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(n) if n > 0 => Ok(Duration::from_secs(n)),
                    Ok(_) => Err(ConfigError::Invalid {
                        var,
                        value: raw,
                        reason: "must be greater than zero".to_string(),
                    }),
                    Err(err) => Err(ConfigError::Invalid {
                        var,
                        value: raw,
                        reason: err.to_string(),
                    }),
                },
            }
        };
        config.health_timeout = secs("SELRS_HEALTH_TIMEOUT_SECS", config.health_timeout)?;
        config.data_timeout = secs("SELRS_DATA_TIMEOUT_SECS", config.data_timeout)?;
        config.sync_timeout = secs("SELRS_SYNC_TIMEOUT_SECS", config.sync_timeout)?;
        config.sync_interval = secs("SELRS_SYNC_INTERVAL_SECS", config.sync_interval)?;
        config.refresh_interval = secs("SELRS_REFRESH_INTERVAL_SECS", config.refresh_interval)?;

        if let Some(raw) = get("SELRS_FLUSH_POLICY") {
            config.flush_policy = raw.parse().map_err(|reason| ConfigError::Invalid {
                var: "SELRS_FLUSH_POLICY",
                value: raw.clone(),
                reason,
            })?;
        }
        if let Some(dir) = get("SELRS_DATA_DIR") {
            config.data_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        let default = ClientConfig::default();
        assert_eq!(config, default);
        assert_eq!(config.health_timeout, Duration::from_secs(5));
        assert_eq!(config.sync_interval, Duration::from_secs(300));
        assert_eq!(config.flush_policy, FlushPolicy::AllOrNothing);
        assert_eq!(config.sync_server_url, config.api_base_url);
    }

    #[test]
    fn overrides_are_read() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("SELRS_API_URL", "http://ledger.local:8080/"),
            ("SELRS_SYNC_USER", "sync"),
            ("SELRS_SYNC_PASSWORD", "secret"),
            ("SELRS_DATA_TIMEOUT_SECS", "30"),
            ("SELRS_FLUSH_POLICY", "per-group"),
            ("SELRS_DATA_DIR", "/tmp/selrs-test"),
        ]))
        .unwrap();

        assert_eq!(config.api_base_url, "http://ledger.local:8080");
        assert_eq!(config.sync_server_url, "http://ledger.local:8080");
        assert_eq!(config.sync_username, "sync");
        assert_eq!(config.sync_password, "secret");
        assert_eq!(config.data_timeout, Duration::from_secs(30));
        assert_eq!(config.flush_policy, FlushPolicy::PerGroup);
        assert_eq!(config.db_path(), Some(PathBuf::from("/tmp/selrs-test/selrs.db")));
    }

    #[test]
    fn separate_sync_server_is_kept() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("SELRS_SYNC_URL", "http://sync.local"),
            ("SELRS_API_URL", "http://api.local"),
        ]))
        .unwrap();
        assert_eq!(config.api_base_url, "http://api.local");
        assert_eq!(config.sync_server_url, "http://sync.local");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[("SELRS_SYNC_INTERVAL_SECS", "often")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "SELRS_SYNC_INTERVAL_SECS", .. }));

        let err = ClientConfig::from_lookup(lookup(&[("SELRS_DATA_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = ClientConfig::from_lookup(lookup(&[("SELRS_FLUSH_POLICY", "sometimes")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "SELRS_FLUSH_POLICY", .. }));
    }
}
