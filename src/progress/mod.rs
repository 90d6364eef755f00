//! Progress of running and recent syncs
//!
//! The admin API keeps progress in memory ([`MemoryProgressStore`]); CLI runs
//! persist it to a fjall keyspace ([`LedgerProgressStore`]) so interrupted
//! syncs can be listed afterwards.

mod ledger;
mod memory;
mod tracker;

pub use ledger::LedgerProgressStore;
pub use memory::MemoryProgressStore;
pub use tracker::ProgressTracker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::vendor::DateRange;

/// Default age after which finished entries are dropped
pub const DEFAULT_PRUNE_AGE: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("progress store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, ProgressError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Submitting,
    Polling,
    Mirroring,
    Completed,
    Partial,
    Failed,
}

impl SyncStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Partial | SyncStatus::Failed)
    }
}

/// Snapshot of one sync as shown by the API and the `progress` command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub sync_id: String,
    pub label: String,
    pub date_range: DateRange,
    pub status: SyncStatus,
    /// 1-based index of the (batch, chunk) pair being processed
    pub current: usize,
    pub total: usize,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub vendor_status: Option<String>,
    #[serde(default)]
    pub files_copied: usize,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub done: bool,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncProgress {
    pub fn new(sync_id: impl Into<String>, label: impl Into<String>, date_range: DateRange) -> Self {
        let now = Utc::now();
        Self {
            sync_id: sync_id.into(),
            label: label.into(),
            date_range,
            status: SyncStatus::Pending,
            current: 0,
            total: 0,
            message: None,
            vendor_status: None,
            files_copied: 0,
            errors: Vec::new(),
            done: false,
            started_at: now,
            updated_at: now,
        }
    }
}

/// Keyed storage for [`SyncProgress`] entries
pub trait ProgressStore: Send + Sync {
    fn put(&self, progress: &SyncProgress) -> Result<()>;
    fn get(&self, sync_id: &str) -> Result<Option<SyncProgress>>;
    /// All entries, newest first
    fn list(&self) -> Result<Vec<SyncProgress>>;
    fn remove(&self, sync_id: &str) -> Result<()>;
}

/// Remove entries last updated before `now - age`; returns how many were removed.
pub fn prune_older_than(
    store: &dyn ProgressStore,
    age: Duration,
    now: DateTime<Utc>,
) -> Result<usize> {
    let age = chrono::Duration::from_std(age).unwrap_or(chrono::Duration::MAX);
    let cutoff = now.checked_sub_signed(age).unwrap_or(DateTime::<Utc>::MIN_UTC);

    let mut removed = 0;
    for entry in store.list()? {
        if entry.updated_at < cutoff {
            store.remove(&entry.sync_id)?;
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::info!(removed, "Pruned old sync progress entries");
    }
    Ok(removed)
}

fn newest_first(entries: &mut [SyncProgress]) {
    entries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
}
