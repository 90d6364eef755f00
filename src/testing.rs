//! Fakes shared by unit tests

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::credentials::{BrokerSettings, CredentialBroker, CredentialError, CredentialLease, RoleAssumer};
use crate::mirror::{CopyError, CopyJob, CopyOutcome, ObjectCopier};
use crate::vendor::{
    self, JobRequest, JobState, JobStatusReport, S3Location, SubmittedJob, VendorApi, VendorError,
};

/// Hands out hour-long leases numbered `token-1`, `token-2`, ...
#[derive(Default)]
pub struct StaticAssumer {
    issued: AtomicUsize,
}

#[async_trait]
impl RoleAssumer for StaticAssumer {
    async fn assume_role(&self, _duration: Duration) -> Result<CredentialLease, CredentialError> {
        let number = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CredentialLease {
            access_key_id: "AKIATEST".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: format!("token-{}", number),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }
}

pub fn static_broker() -> Arc<CredentialBroker> {
    Arc::new(CredentialBroker::new(
        Arc::new(StaticAssumer::default()),
        BrokerSettings::default(),
    ))
}

/// Copier that replays scripted results and records every job
#[derive(Default)]
pub struct FakeCopier {
    script: Mutex<VecDeque<Result<CopyOutcome, CopyError>>>,
    jobs: Mutex<Vec<CopyJob>>,
    tokens: Mutex<Vec<String>>,
    files_per_copy: usize,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCopier {
    pub fn scripted(script: Vec<Result<CopyOutcome, CopyError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    /// Unscripted copies report `files` copied after sleeping `delay`.
    pub fn copying(files: usize, delay: Option<Duration>) -> Self {
        Self {
            files_per_copy: files,
            delay,
            ..Default::default()
        }
    }

    pub fn jobs(&self) -> Vec<CopyJob> {
        self.jobs.lock().unwrap().clone()
    }

    /// Session token of the lease each copy ran with
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectCopier for FakeCopier {
    async fn copy_prefix(&self, lease: &CredentialLease, job: &CopyJob) -> Result<CopyOutcome, CopyError> {
        self.jobs.lock().unwrap().push(job.clone());
        self.tokens.lock().unwrap().push(lease.session_token.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(CopyOutcome {
            copied: self.files_per_copy,
            skipped: 0,
        }))
    }
}

/// Vendor whose jobs succeed immediately at `exports/{job_id}`
#[derive(Default)]
pub struct FakeVendor {
    submissions: Mutex<Vec<(String, JobRequest)>>,
    /// 1-based submission number -> error to return instead
    failures: Mutex<HashMap<usize, VendorError>>,
}

impl FakeVendor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_submission(self, number: usize, error: VendorError) -> Self {
        self.failures.lock().unwrap().insert(number, error);
        self
    }

    pub fn submissions(&self) -> Vec<(String, JobRequest)> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl VendorApi for FakeVendor {
    async fn submit(&self, endpoint: &str, request: &JobRequest) -> vendor::Result<SubmittedJob> {
        let number = {
            let mut submissions = self.submissions.lock().unwrap();
            submissions.push((endpoint.to_string(), request.clone()));
            submissions.len()
        };

        if let Some(error) = self.failures.lock().unwrap().remove(&number) {
            return Err(error);
        }

        Ok(SubmittedJob {
            request_id: Some(format!("req-{}", number)),
            job_id: format!("job-{}", number),
        })
    }

    async fn job_status(&self, job_id: &str) -> vendor::Result<JobStatusReport> {
        Ok(JobStatusReport {
            status: JobState::Success,
            s3_location: Some(S3Location::Folder {
                folder_path: format!("/exports/{}/", job_id),
            }),
            error_message: None,
        })
    }
}
