//! Prefix-to-prefix object copy with `aws s3 sync` semantics

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::{ObjectStore, path::Path as StoragePath};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::credentials::CredentialLease;
use crate::storage::{S3Settings, StorageError};

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("security token expired: {0}")]
    ExpiredToken(String),

    #[error("object store error: {0}")]
    Store(String),
}

impl From<object_store::Error> for CopyError {
    fn from(err: object_store::Error) -> Self {
        let text = err.to_string();
        if is_token_failure(&text) {
            CopyError::ExpiredToken(text)
        } else {
            CopyError::Store(text)
        }
    }
}

impl From<StorageError> for CopyError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ObjectStoreError(e) => e.into(),
            other => CopyError::Store(other.to_string()),
        }
    }
}

fn is_token_failure(text: &str) -> bool {
    let lower = text.to_lowercase();
    text.contains("ExpiredToken")
        || text.contains("InvalidToken")
        || (lower.contains("token") && lower.contains("expired"))
}

/// One copy of a source prefix into a destination prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyJob {
    pub source_bucket: String,
    pub source_prefix: String,
    pub dest_bucket: String,
    pub dest_prefix: String,
    /// Only keys ending with this suffix are copied
    pub extension: String,
    /// Keep only keys with a path segment containing this text
    pub slice_filter: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyOutcome {
    pub copied: usize,
    pub skipped: usize,
}

#[async_trait]
pub trait ObjectCopier: Send + Sync {
    async fn copy_prefix(&self, lease: &CredentialLease, job: &CopyJob) -> Result<CopyOutcome, CopyError>;
}

/// Opens a store for a bucket with the leased credentials
pub trait StoreFactory: Send + Sync {
    fn open(&self, bucket: &str, lease: &CredentialLease) -> Result<Arc<dyn ObjectStore>, StorageError>;
}

pub struct S3StoreFactory {
    settings: S3Settings,
}

impl S3StoreFactory {
    pub fn new(settings: S3Settings) -> Self {
        Self { settings }
    }
}

impl StoreFactory for S3StoreFactory {
    fn open(&self, bucket: &str, lease: &CredentialLease) -> Result<Arc<dyn ObjectStore>, StorageError> {
        self.settings.build_store(bucket, Some(lease))
    }
}

pub struct ObjectStoreCopier<F: StoreFactory> {
    factory: F,
}

impl<F: StoreFactory> ObjectStoreCopier<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl<F: StoreFactory> ObjectCopier for ObjectStoreCopier<F> {
    async fn copy_prefix(&self, lease: &CredentialLease, job: &CopyJob) -> Result<CopyOutcome, CopyError> {
        let source = self.factory.open(&job.source_bucket, lease)?;
        let dest = self.factory.open(&job.dest_bucket, lease)?;

        let source_root = job.source_prefix.trim_matches('/');
        let dest_root = job.dest_prefix.trim_matches('/');
        let prefix = StoragePath::from(source_root);

        let objects: Vec<_> = source.list(Some(&prefix)).try_collect().await?;
        debug!(
            source = %format!("s3://{}/{}", job.source_bucket, source_root),
            listed = objects.len(),
            "Listed source prefix"
        );

        let mut outcome = CopyOutcome::default();

        for meta in objects {
            let key = meta.location.as_ref();
            if !key.ends_with(&job.extension) {
                continue;
            }

            let relative = key
                .strip_prefix(source_root)
                .unwrap_or(key)
                .trim_start_matches('/');

            if let Some(slice) = &job.slice_filter {
                if !relative.split('/').any(|segment| matches_slice(segment, slice)) {
                    continue;
                }
            }

            let target = if dest_root.is_empty() {
                StoragePath::from(relative)
            } else {
                StoragePath::from(format!("{}/{}", dest_root, relative))
            };

            match dest.head(&target).await {
                Ok(existing) if existing.size == meta.size => {
                    outcome.skipped += 1;
                    continue;
                }
                Ok(_) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            let bytes = source.get(&meta.location).await?.bytes().await?;
            dest.put(&target, bytes.into()).await?;
            outcome.copied += 1;
        }

        info!(
            source = %format!("s3://{}/{}", job.source_bucket, source_root),
            dest = %format!("s3://{}/{}", job.dest_bucket, dest_root),
            copied = outcome.copied,
            skipped = outcome.skipped,
            "Copy finished"
        );

        Ok(outcome)
    }
}

/// A whole path segment naming the slice: `york_center`, `poi_id=york_center`
/// or any `key=york_center`, but never `poi_id=new_york_center`.
fn matches_slice(segment: &str, slice: &str) -> bool {
    segment == slice
        || segment
            .rsplit_once('=')
            .is_some_and(|(_, value)| value == slice)
}
