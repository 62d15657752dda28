//! Shared value types of the sync layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use selrs_core::LedgerKind;

/// Connectivity as observed by the last flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Online,
    Offline,
}

/// What a flush does when one ledger group fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlushPolicy {
    /// Nothing is removed from the queue unless every group succeeds.
    #[default]
    AllOrNothing,
    /// Each group is removed as soon as it has been delivered.
    PerGroup,
}

impl FlushPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushPolicy::AllOrNothing => "all-or-nothing",
            FlushPolicy::PerGroup => "per-group",
        }
    }
}

impl core::str::FromStr for FlushPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all-or-nothing" => Ok(FlushPolicy::AllOrNothing),
            "per-group" => Ok(FlushPolicy::PerGroup),
            other => Err(format!("unknown flush policy '{other}'")),
        }
    }
}

/// A write captured while offline, waiting to be pushed to the sync server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub id: Uuid,
    pub kind: LedgerKind,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
}

impl PendingWrite {
    pub fn new(kind: LedgerKind, payload: Value, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            payload,
            enqueued_at,
        }
    }
}

/// Snapshot of the sync queue for status displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub enabled: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub is_syncing: bool,
    pub next_sync_time: Option<DateTime<Utc>>,
    pub items_pending: usize,
    /// True until a flush fails, and again after the next one succeeds.
    pub is_online: bool,
}

/// Result of one flush attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// Another flush was already running.
    Skipped,
    /// The queue was empty.
    Empty,
    /// Every entry of the snapshot was delivered and removed.
    Flushed { pushed: usize },
    /// A group failed. `pushed` counts entries delivered before the failure.
    Failed {
        kind: Option<LedgerKind>,
        pushed: usize,
        error: String,
    },
}

impl FlushOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FlushOutcome::Empty | FlushOutcome::Flushed { .. })
    }
}
