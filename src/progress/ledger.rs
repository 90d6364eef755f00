//! Fjall-backed progress persistence
//!
//! Partition layout:
//! - `progress`: progress:{sync_id} -> SyncProgress (JSON)

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use std::path::Path;
use tracing::{debug, info};

use super::{ProgressStore, Result, SyncProgress, newest_first};

/// Encode a progress key: progress:{sync_id}
fn encode_progress_key(sync_id: &str) -> Vec<u8> {
    format!("progress:{}", sync_id).into_bytes()
}

#[derive(Clone)]
pub struct LedgerProgressStore {
    keyspace: Keyspace,
    progress: PartitionHandle,
}

impl LedgerProgressStore {
    /// Open or create the keyspace at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening progress ledger at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let progress = keyspace.open_partition("progress", PartitionCreateOptions::default())?;

        Ok(Self { keyspace, progress })
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}

impl ProgressStore for LedgerProgressStore {
    fn put(&self, progress: &SyncProgress) -> Result<()> {
        let value = serde_json::to_vec(progress)?;
        self.progress.insert(encode_progress_key(&progress.sync_id), value)?;
        debug!(sync_id = %progress.sync_id, status = ?progress.status, "Stored progress");
        Ok(())
    }

    fn get(&self, sync_id: &str) -> Result<Option<SyncProgress>> {
        match self.progress.get(encode_progress_key(sync_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn list(&self) -> Result<Vec<SyncProgress>> {
        let mut entries = Vec::new();
        for item in self.progress.prefix("progress:") {
            let (_, value) = item?;
            entries.push(serde_json::from_slice(&value)?);
        }
        newest_first(&mut entries);
        Ok(entries)
    }

    fn remove(&self, sync_id: &str) -> Result<()> {
        self.progress.remove(encode_progress_key(sync_id))?;
        Ok(())
    }
}
