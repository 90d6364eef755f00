//! Copy vendor job output into the operator's bucket
//!
//! [`StorageMirror`] wraps an [`ObjectCopier`] with credential handling:
//! each attempt takes a lease from the broker, and an expired token
//! invalidates the lease before the next attempt.

mod copier;

pub use copier::{
    CopyError, CopyJob, CopyOutcome, ObjectCopier, ObjectStoreCopier, S3StoreFactory, StoreFactory,
};

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::cities::City;
use crate::credentials::{CredentialBroker, CredentialError};

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("could not obtain credentials: {0}")]
    Credentials(#[from] CredentialError),

    #[error("credentials kept expiring after {attempts} attempts: {last_error}")]
    CredentialsExhausted { attempts: u32, last_error: String },

    #[error("copy failed: {0}")]
    Copy(CopyError),
}

#[derive(Debug, Clone)]
pub struct MirrorSettings {
    pub source_bucket: String,
    pub extension: String,
    /// First segment of every destination prefix
    pub dest_root: String,
    pub max_attempts: u32,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            source_bucket: "veraset-prd-platform-us-west-2".to_string(),
            extension: ".parquet".to_string(),
            dest_root: "data".to_string(),
            max_attempts: 3,
        }
    }
}

/// Result of mirroring one city's output
#[derive(Debug, Clone, Serialize)]
pub struct MirrorReport {
    pub city: String,
    pub dest_prefix: String,
    pub files_copied: usize,
    pub files_skipped: usize,
    pub attempts: u32,
}

pub struct StorageMirror {
    broker: Arc<CredentialBroker>,
    copier: Arc<dyn ObjectCopier>,
    settings: MirrorSettings,
}

impl StorageMirror {
    pub fn new(
        broker: Arc<CredentialBroker>,
        copier: Arc<dyn ObjectCopier>,
        settings: MirrorSettings,
    ) -> Self {
        Self {
            broker,
            copier,
            settings,
        }
    }

    pub fn broker(&self) -> &Arc<CredentialBroker> {
        &self.broker
    }

    pub fn settings(&self) -> &MirrorSettings {
        &self.settings
    }

    /// Copy `source_folder` (vendor bucket) to the city's destination prefix.
    ///
    /// `slice` narrows a multi-city job output to the keys of this city.
    pub async fn mirror_city(
        &self,
        city: &City,
        source_folder: &str,
        dest_bucket: &str,
        slice: Option<&str>,
    ) -> Result<MirrorReport, MirrorError> {
        let job = CopyJob {
            source_bucket: self.settings.source_bucket.clone(),
            source_prefix: source_folder.trim_matches('/').to_string(),
            dest_bucket: dest_bucket.to_string(),
            dest_prefix: city.destination_prefix(&self.settings.dest_root),
            extension: self.settings.extension.clone(),
            slice_filter: slice.map(str::to_string),
        };

        let mut last_error = String::new();

        for attempt in 1..=self.settings.max_attempts {
            let lease = self.broker.get().await?;

            match self.copier.copy_prefix(&lease, &job).await {
                Ok(outcome) => {
                    if outcome.copied == 0 && outcome.skipped == 0 {
                        warn!(
                            city = %city.label(),
                            source = %job.source_prefix,
                            "No {} files found to copy",
                            job.extension
                        );
                    } else {
                        info!(
                            city = %city.label(),
                            dest = %job.dest_prefix,
                            copied = outcome.copied,
                            skipped = outcome.skipped,
                            "City data mirrored"
                        );
                    }
                    return Ok(MirrorReport {
                        city: city.label(),
                        dest_prefix: job.dest_prefix,
                        files_copied: outcome.copied,
                        files_skipped: outcome.skipped,
                        attempts: attempt,
                    });
                }
                Err(CopyError::ExpiredToken(message)) => {
                    warn!(
                        city = %city.label(),
                        attempt,
                        max_attempts = self.settings.max_attempts,
                        "Credentials expired during copy, refreshing"
                    );
                    self.broker.invalidate().await;
                    last_error = message;
                }
                Err(e) => return Err(MirrorError::Copy(e)),
            }
        }

        Err(MirrorError::CredentialsExhausted {
            attempts: self.settings.max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCopier, static_broker};
    use serde_json::json;

    fn toronto() -> City {
        serde_json::from_value(json!({
            "city_id": "c-1",
            "city": "Toronto",
            "country": "Canada",
            "state_province": "Ontario",
            "latitude": 43.65,
            "longitude": -79.38,
            "radius_meters": 50000
        }))
        .unwrap()
    }

    fn mirror(copier: Arc<FakeCopier>) -> StorageMirror {
        StorageMirror::new(static_broker(), copier, MirrorSettings::default())
    }

    #[tokio::test]
    async fn test_expired_token_is_retried_with_new_credentials() {
        let copier = Arc::new(FakeCopier::scripted(vec![
            Err(CopyError::ExpiredToken("ExpiredToken".to_string())),
            Ok(CopyOutcome { copied: 4, skipped: 0 }),
        ]));
        let mirror = mirror(copier.clone());

        let report = mirror
            .mirror_city(&toronto(), "/exports/job-1/", "ours", None)
            .await
            .unwrap();

        assert_eq!(report.attempts, 2);
        assert_eq!(report.files_copied, 4);
        assert_eq!(report.dest_prefix, "data/canada/ontario/toronto");
        assert_eq!(mirror.broker().invalidated_count(), 1);
        assert_eq!(mirror.broker().assumed_count(), 2);
        assert_eq!(copier.jobs().len(), 2);
        assert_eq!(copier.tokens(), vec!["token-1", "token-2"]);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let copier = Arc::new(FakeCopier::scripted(vec![Err(CopyError::Store(
            "AccessDenied".to_string(),
        ))]));
        let mirror = mirror(copier.clone());

        let err = mirror
            .mirror_city(&toronto(), "exports/job-1", "ours", None)
            .await
            .unwrap_err();

        assert!(matches!(err, MirrorError::Copy(CopyError::Store(_))));
        assert_eq!(copier.jobs().len(), 1);
        assert_eq!(mirror.broker().invalidated_count(), 0);
    }

    #[tokio::test]
    async fn test_credentials_exhausted() {
        let copier = Arc::new(FakeCopier::scripted(vec![
            Err(CopyError::ExpiredToken("1".to_string())),
            Err(CopyError::ExpiredToken("2".to_string())),
            Err(CopyError::ExpiredToken("3".to_string())),
        ]));
        let mirror = mirror(copier.clone());

        let err = mirror
            .mirror_city(&toronto(), "exports/job-1", "ours", None)
            .await
            .unwrap_err();

        match err {
            MirrorError::CredentialsExhausted { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "3");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(mirror.broker().invalidated_count(), 3);
    }

    #[tokio::test]
    async fn test_copy_job_fields() {
        let copier = Arc::new(FakeCopier::default());
        let mirror = mirror(copier.clone());

        let report = mirror
            .mirror_city(&toronto(), "/exports/job-1/", "ours", Some("toronto_center"))
            .await
            .unwrap();

        assert_eq!(report.files_copied, 0);
        let jobs = copier.jobs();
        assert_eq!(
            jobs[0],
            CopyJob {
                source_bucket: "veraset-prd-platform-us-west-2".to_string(),
                source_prefix: "exports/job-1".to_string(),
                dest_bucket: "ours".to_string(),
                dest_prefix: "data/canada/ontario/toronto".to_string(),
                extension: ".parquet".to_string(),
                slice_filter: Some("toronto_center".to_string()),
            }
        );
    }
}
