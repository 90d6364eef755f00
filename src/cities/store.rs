use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{City, CityDraft, CityError};
use crate::storage::StorageClient;

/// Number of timestamped backups kept next to the cities file
pub const DEFAULT_BACKUP_LIMIT: usize = 30;

const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S%.6f";
const LEGACY_BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const REMOTE_BACKUP_PREFIX: &str = "backups/cities";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to replace cities file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("City not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Invalid(#[from] CityError),

    #[error("Cities file task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// JSON-file backed city list.
///
/// Every mutation is one read-modify-write under a single lock. Writes go
/// through a temp file + fsync + rename, after the previous file has been
/// copied to a timestamped backup. File I/O runs on the blocking pool.
pub struct CityStore {
    file: CityFile,
    remote: Option<Arc<StorageClient>>,
    lock: Mutex<()>,
}

impl CityStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self {
            file: CityFile {
                path: path.as_ref().to_path_buf(),
                backup_limit: DEFAULT_BACKUP_LIMIT,
            },
            remote: None,
            lock: Mutex::new(()),
        }
    }

    pub fn with_backup_limit(mut self, limit: usize) -> Self {
        self.file.backup_limit = limit;
        self
    }

    /// Also upload every snapshot to a remote bucket
    pub fn with_remote_backup(mut self, client: Arc<StorageClient>) -> Self {
        self.remote = Some(client);
        self
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub async fn list(&self) -> Result<Vec<City>> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    pub async fn get(&self, city_id: &str) -> Result<Option<City>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|c| c.city_id == city_id))
    }

    pub async fn create(&self, draft: CityDraft) -> Result<City> {
        let city = draft.into_city(Uuid::new_v4().to_string())?;
        let created = city.clone();

        self.mutate(move |cities| {
            cities.push(city);
            Ok(())
        })
        .await?;

        info!(city_id = %created.city_id, city = %created.label(), "City added");
        Ok(created)
    }

    pub async fn update(&self, city_id: &str, draft: CityDraft) -> Result<City> {
        let updated = self
            .mutate(|cities| {
                let city = cities
                    .iter_mut()
                    .find(|c| c.city_id == city_id)
                    .ok_or_else(|| StoreError::NotFound(city_id.to_string()))?;
                draft.apply_to(city)?;
                Ok(city.clone())
            })
            .await?;

        info!(city_id, city = %updated.label(), "City updated");
        Ok(updated)
    }

    pub async fn delete(&self, city_id: &str) -> Result<City> {
        let removed = self
            .mutate(|cities| {
                let idx = cities
                    .iter()
                    .position(|c| c.city_id == city_id)
                    .ok_or_else(|| StoreError::NotFound(city_id.to_string()))?;
                Ok(cities.remove(idx))
            })
            .await?;

        info!(city_id, city = %removed.label(), "City deleted");
        Ok(removed)
    }

    pub async fn replace_all(&self, cities: Vec<City>) -> Result<()> {
        for city in &cities {
            city.validate()?;
        }
        self.mutate(move |current| {
            *current = cities;
            Ok(())
        })
        .await
    }

    /// Existing backups, newest first
    pub fn backups(&self) -> Result<Vec<PathBuf>> {
        self.file.backups()
    }

    async fn mutate<T>(&self, f: impl FnOnce(&mut Vec<City>) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock().await;

        let mut cities = self.read().await?;
        let result = f(&mut cities)?;

        let file = self.file.clone();
        let snapshot = tokio::task::spawn_blocking(move || file.write(&cities)).await??;

        if let Some(remote) = &self.remote {
            upload_remote_backup(remote, snapshot).await;
        }

        Ok(result)
    }

    async fn read(&self) -> Result<Vec<City>> {
        let file = self.file.clone();
        tokio::task::spawn_blocking(move || file.read()).await?
    }
}

/// The cities file and its backups on local disk; every method blocks.
#[derive(Debug, Clone)]
struct CityFile {
    path: PathBuf,
    backup_limit: usize,
}

impl CityFile {
    fn read(&self) -> Result<Vec<City>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read(&self.path)?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&data)?)
    }

    /// Back up, prune, then atomically replace. Returns the written bytes.
    fn write(&self, cities: &[City]) -> Result<Vec<u8>> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir)?;

        if self.path.exists() {
            let backup = self.backup_path(&Utc::now().naive_utc());
            fs::copy(&self.path, &backup)?;
            debug!(backup = %backup.display(), "Cities file backed up");
            self.prune_backups()?;
        }

        let data = serde_json::to_vec_pretty(cities)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        Ok(data)
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cities.json".to_string())
    }

    fn backup_path(&self, at: &NaiveDateTime) -> PathBuf {
        self.path.with_file_name(format!(
            "{}.{}",
            self.file_name(),
            at.format(BACKUP_TIMESTAMP_FORMAT)
        ))
    }

    fn backups(&self) -> Result<Vec<PathBuf>> {
        let Some(dir) = self.path.parent() else {
            return Ok(Vec::new());
        };
        let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{}.", self.file_name());

        let mut backups: Vec<(NaiveDateTime, PathBuf)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(stamp) = name.strip_prefix(&prefix) else {
                continue;
            };
            if let Some(ts) = parse_backup_stamp(stamp) {
                backups.push((ts, entry.path()));
            }
        }

        backups.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(backups.into_iter().map(|(_, p)| p).collect())
    }

    fn prune_backups(&self) -> Result<()> {
        for old in self.backups()?.into_iter().skip(self.backup_limit) {
            if let Err(e) = fs::remove_file(&old) {
                warn!(backup = %old.display(), error = %e, "Could not remove old backup");
            }
        }
        Ok(())
    }
}

/// Accepts current stamps and the older whole-second ones.
fn parse_backup_stamp(stamp: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(stamp, BACKUP_TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(stamp, LEGACY_BACKUP_TIMESTAMP_FORMAT))
        .ok()
}

async fn upload_remote_backup(remote: &StorageClient, snapshot: Vec<u8>) {
    let stamp = Utc::now().format(BACKUP_TIMESTAMP_FORMAT);
    let versioned = format!("{}/cities.json.{}", REMOTE_BACKUP_PREFIX, stamp);
    let latest = format!("{}/latest.json", REMOTE_BACKUP_PREFIX);

    for key in [versioned, latest] {
        if let Err(e) = remote.upload(&key, snapshot.clone()).await {
            warn!(bucket = %remote.bucket, key, error = %e, "Remote cities backup failed");
        }
    }
}
