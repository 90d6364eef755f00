use std::collections::HashMap;
use std::sync::RwLock;

use super::{ProgressError, ProgressStore, Result, SyncProgress, newest_first};

/// Process-local progress map
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    entries: RwLock<HashMap<String, SyncProgress>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn put(&self, progress: &SyncProgress) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| ProgressError::Poisoned)?
            .insert(progress.sync_id.clone(), progress.clone());
        Ok(())
    }

    fn get(&self, sync_id: &str) -> Result<Option<SyncProgress>> {
        Ok(self
            .entries
            .read()
            .map_err(|_| ProgressError::Poisoned)?
            .get(sync_id)
            .cloned())
    }

    fn list(&self) -> Result<Vec<SyncProgress>> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .map_err(|_| ProgressError::Poisoned)?
            .values()
            .cloned()
            .collect();
        newest_first(&mut entries);
        Ok(entries)
    }

    fn remove(&self, sync_id: &str) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| ProgressError::Poisoned)?
            .remove(sync_id);
        Ok(())
    }
}
