use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::warn;

use super::{MemoryProgressStore, ProgressStore, SyncProgress, SyncStatus};
use crate::vendor::{DateRange, PollUpdate};

/// Per-sync handle that mirrors every change into a [`ProgressStore`]
pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
    state: Mutex<SyncProgress>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn ProgressStore>, progress: SyncProgress) -> Self {
        let tracker = Self {
            store,
            state: Mutex::new(progress),
        };
        tracker.update(|_| {});
        tracker
    }

    /// Tracker backed by a private in-memory store
    pub fn detached(sync_id: impl Into<String>, label: impl Into<String>, range: DateRange) -> Self {
        Self::new(
            Arc::new(MemoryProgressStore::new()),
            SyncProgress::new(sync_id, label, range),
        )
    }

    pub fn sync_id(&self) -> String {
        self.snapshot().sync_id
    }

    pub fn snapshot(&self) -> SyncProgress {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_status(&self, status: SyncStatus, message: impl Into<String>) {
        let message = message.into();
        self.update(|p| {
            p.status = status;
            p.message = Some(message);
        });
    }

    pub fn set_pair(&self, current: usize, total: usize) {
        self.update(|p| {
            p.current = current;
            p.total = total;
        });
    }

    pub fn record_poll(&self, update: &PollUpdate) {
        let description = update.describe();
        let status = update.status.as_ref().map(|s| s.to_string());
        self.update(|p| {
            if status.is_some() {
                p.vendor_status = status;
            }
            p.message = Some(description);
        });
    }

    pub fn add_files(&self, count: usize) {
        self.update(|p| p.files_copied += count);
    }

    pub fn record_error(&self, error: impl Into<String>) {
        let error = error.into();
        self.update(|p| p.errors.push(error));
    }

    /// Mark the sync done with its final status.
    pub fn finish(&self, status: SyncStatus, message: impl Into<String>) {
        let message = message.into();
        self.update(|p| {
            p.status = status;
            p.message = Some(message);
            p.done = true;
        });
    }

    fn update(&self, apply: impl FnOnce(&mut SyncProgress)) {
        let snapshot = {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            apply(&mut *state);
            state.updated_at = Utc::now();
            state.clone()
        };

        if let Err(e) = self.store.put(&snapshot) {
            warn!(sync_id = %snapshot.sync_id, error = %e, "Failed to store sync progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vendor::JobState;

    #[test]
    fn test_changes_reach_the_store() {
        let store = Arc::new(MemoryProgressStore::new());
        let tracker = ProgressTracker::new(
            store.clone(),
            SyncProgress::new("sync-1", "Toronto, Canada", DateRange::single("2025-02-01".parse().unwrap())),
        );

        assert_eq!(store.get("sync-1").unwrap().unwrap().status, SyncStatus::Pending);

        tracker.set_pair(1, 2);
        tracker.record_poll(&PollUpdate {
            job_id: "job-1".to_string(),
            attempt: 2,
            max_attempts: 100,
            status: Some(JobState::Running),
            error: None,
        });
        tracker.add_files(3);
        tracker.add_files(2);
        tracker.record_error("chunk 2 failed");
        tracker.finish(SyncStatus::Partial, "1/2 pairs succeeded");

        let stored = store.get("sync-1").unwrap().unwrap();
        assert_eq!(stored.current, 1);
        assert_eq!(stored.total, 2);
        assert_eq!(stored.vendor_status.as_deref(), Some("RUNNING"));
        assert_eq!(stored.files_copied, 5);
        assert_eq!(stored.errors, vec!["chunk 2 failed"]);
        assert_eq!(stored.status, SyncStatus::Partial);
        assert!(stored.done);
        assert_eq!(stored, tracker.snapshot());
    }

    #[test]
    fn test_failed_poll_keeps_last_vendor_status() {
        let tracker = ProgressTracker::detached("sync-1", "Toronto", DateRange::single("2025-02-01".parse().unwrap()));
        let mut update = PollUpdate {
            job_id: "job-1".to_string(),
            attempt: 1,
            max_attempts: 100,
            status: Some(JobState::Scheduled),
            error: None,
        };
        tracker.record_poll(&update);

        update.attempt = 2;
        update.status = None;
        update.error = Some("timeout".to_string());
        tracker.record_poll(&update);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.vendor_status.as_deref(), Some("SCHEDULED"));
        assert!(snapshot.message.unwrap().contains("timeout"));
    }
}
