//! Object storage access for operator buckets
//! Uses Apache Arrow object_store crate

use object_store::aws::AmazonS3Builder;
use object_store::{ObjectStore, path::Path as StoragePath};
use std::sync::Arc;
use thiserror::Error;

use crate::credentials::CredentialLease;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Store configuration failed: {0}")]
    Configuration(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Connection settings shared by every S3 store the tool opens
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub region: String,
    pub endpoint: Option<String>,
}

impl S3Settings {
    /// Build an S3 store for `bucket`.
    ///
    /// With a lease, the store signs with the leased session credentials;
    /// without one it falls back to the ambient `AWS_*` environment.
    pub fn build_store(
        &self,
        bucket: &str,
        lease: Option<&CredentialLease>,
    ) -> Result<Arc<dyn ObjectStore>> {
        let mut builder = match lease {
            Some(lease) => AmazonS3Builder::new()
                .with_access_key_id(&lease.access_key_id)
                .with_secret_access_key(&lease.secret_access_key)
                .with_token(&lease.session_token),
            None => AmazonS3Builder::from_env(),
        };

        builder = builder.with_bucket_name(bucket).with_region(&self.region);

        if let Some(endpoint) = &self.endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Configuration(format!("bucket {}: {}", bucket, e)))?;

        Ok(Arc::new(store))
    }
}

/// Metadata returned after upload
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub key: String,
    pub etag: Option<String>,
    pub size: usize,
}

/// Storage client bound to one operator bucket
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    pub bucket: String,
}

impl StorageClient {
    /// Create new storage client with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>, bucket: String) -> Self {
        Self { store, bucket }
    }

    /// Open an S3 bucket with ambient credentials
    pub fn s3(settings: &S3Settings, bucket: &str) -> Result<Self> {
        Ok(Self {
            store: settings.build_store(bucket, None)?,
            bucket: bucket.to_string(),
        })
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(object_store::memory::InMemory::new()),
            bucket: "mobility-sync-local".to_string(),
        }
    }

    /// Upload bytes to storage
    pub async fn upload(&self, key: &str, data: Vec<u8>) -> Result<UploadMetadata> {
        let path = StoragePath::from(key);
        let size = data.len();

        let put_result = self.store.put(&path, data.into()).await?;

        tracing::info!(bucket = %self.bucket, key, size, "Uploaded to storage");

        Ok(UploadMetadata {
            key: key.to_string(),
            etag: put_result.e_tag.clone(),
            size,
        })
    }

    /// Download from storage
    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = StoragePath::from(key);
        let bytes = self.store.get(&path).await?.bytes().await?;

        tracing::debug!(bucket = %self.bucket, key, size = bytes.len(), "Downloaded from storage");

        Ok(bytes.to_vec())
    }

    /// Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = StoragePath::from(key);

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Immediate child "directories" below `prefix`
    pub async fn list_child_prefixes(&self, prefix: &str) -> Result<Vec<String>> {
        let path = StoragePath::from(prefix);
        let listing = self.store.list_with_delimiter(Some(&path)).await?;

        Ok(listing
            .common_prefixes
            .into_iter()
            .map(|p| p.to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_download_exists() {
        let client = StorageClient::in_memory();

        client.upload("backups/cities/latest.json", b"[]".to_vec()).await.unwrap();

        assert!(client.exists("backups/cities/latest.json").await.unwrap());
        assert!(!client.exists("backups/cities/missing.json").await.unwrap());
        assert_eq!(
            client.download("backups/cities/latest.json").await.unwrap(),
            b"[]".to_vec()
        );
    }

    #[tokio::test]
    async fn test_list_child_prefixes() {
        let client = StorageClient::in_memory();
        for key in [
            "data/canada/ontario/toronto/date=2025-02-01/part-0.parquet",
            "data/canada/ontario/toronto/date=2025-02-02/part-0.parquet",
            "data/canada/ontario/toronto/date=2025-02-02/part-1.parquet",
        ] {
            client.upload(key, vec![1, 2, 3]).await.unwrap();
        }

        let mut prefixes = client
            .list_child_prefixes("data/canada/ontario/toronto")
            .await
            .unwrap();
        prefixes.sort();

        assert_eq!(
            prefixes,
            vec![
                "data/canada/ontario/toronto/date=2025-02-01",
                "data/canada/ontario/toronto/date=2025-02-02",
            ]
        );
    }
}
