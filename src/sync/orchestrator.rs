use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::chunking::{batch_cities, chunk_dates};
use super::{BatchSettings, SyncError, SyncTarget};
use crate::cities::City;
use crate::mirror::StorageMirror;
use crate::observability::Metrics;
use crate::progress::{ProgressStore, ProgressTracker, SyncProgress, SyncStatus};
use crate::vendor::{DateRange, JobRequest, PollUpdate, SchemaType, VendorApi, wait_for_completion};

/// Everything one orchestrated run needs to know
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub cities: Vec<City>,
    pub range: DateRange,
    pub schema: SchemaType,
    pub endpoint: String,
    pub dest_bucket: String,
}

/// A failed (batch, chunk) pair
#[derive(Debug, Clone, Serialize)]
pub struct PairError {
    /// 1-based
    pub batch: usize,
    /// 1-based
    pub chunk: usize,
    pub range: DateRange,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    /// At least one pair succeeded
    pub success: bool,
    pub total_pairs: usize,
    pub succeeded_pairs: usize,
    pub failed_pairs: usize,
    pub skipped_pairs: usize,
    pub quota_exceeded: bool,
    pub errors: Vec<PairError>,
    /// Files copied per city label
    pub files_copied: BTreeMap<String, usize>,
}

impl BatchOutcome {
    pub fn status(&self) -> SyncStatus {
        if self.failed_pairs == 0 && self.skipped_pairs == 0 {
            SyncStatus::Completed
        } else if self.success {
            SyncStatus::Partial
        } else {
            SyncStatus::Failed
        }
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{}/{} pairs succeeded, {} failed, {} skipped, {} files copied",
            self.succeeded_pairs,
            self.total_pairs,
            self.failed_pairs,
            self.skipped_pairs,
            self.files_copied.values().sum::<usize>()
        );
        if self.quota_exceeded {
            summary.push_str("; vendor monthly job quota exceeded");
        }
        summary
    }
}

/// Result of a backfill pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillSummary {
    pub ranges_total: usize,
    pub ranges_succeeded: usize,
    pub ranges_failed: usize,
    pub quota_exceeded: bool,
    pub files_copied: usize,
}

/// Drives vendor jobs and copies for many cities over long date ranges
pub struct SyncOrchestrator {
    vendor: Arc<dyn VendorApi>,
    mirror: Arc<StorageMirror>,
    settings: BatchSettings,
    default_bucket: String,
    metrics: Arc<Metrics>,
}

impl SyncOrchestrator {
    pub fn new(
        vendor: Arc<dyn VendorApi>,
        mirror: Arc<StorageMirror>,
        settings: BatchSettings,
        default_bucket: String,
    ) -> Self {
        Self {
            vendor,
            mirror,
            settings,
            default_bucket,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Build a request for `cities` against `target`, using the default bucket when it has none.
    pub fn request(&self, cities: Vec<City>, range: DateRange, target: &SyncTarget) -> SyncRequest {
        SyncRequest {
            cities,
            range,
            schema: target.schema,
            endpoint: target.endpoint.clone(),
            dest_bucket: target
                .bucket
                .clone()
                .unwrap_or_else(|| self.default_bucket.clone()),
        }
    }

    /// Process every (city batch, date chunk) pair of `request` in order.
    ///
    /// Only invalid input is an `Err`; pair failures are collected in the outcome.
    pub async fn run(
        &self,
        request: &SyncRequest,
        tracker: &ProgressTracker,
    ) -> Result<BatchOutcome, SyncError> {
        if let Err(err) = Self::check_cities(&request.cities) {
            tracker.finish(SyncStatus::Failed, err.to_string());
            return Err(err);
        }

        let batches = batch_cities(&request.cities, self.settings.max_cities_per_request);
        let chunks = chunk_dates(request.range, self.settings.max_days_per_request);
        let total = batches.len() * chunks.len();

        self.metrics.sync_started();
        info!(
            cities = request.cities.len(),
            range = %request.range,
            batches = batches.len(),
            chunks = chunks.len(),
            endpoint = %request.endpoint,
            bucket = %request.dest_bucket,
            "Starting sync"
        );

        let mut outcome = BatchOutcome {
            total_pairs: total,
            ..Default::default()
        };
        let mut pair = 0;

        'batches: for (batch_index, batch) in batches.iter().enumerate() {
            if outcome.quota_exceeded {
                break;
            }

            match self.mirror.broker().refresh().await {
                Ok(_) => self.metrics.credential_refreshed(),
                Err(e) => warn!(batch = batch_index + 1, error = %e, "Credential refresh failed, copy will retry"),
            }

            for (chunk_index, chunk) in chunks.iter().enumerate() {
                if outcome.quota_exceeded {
                    break 'batches;
                }
                if pair > 0 && !self.settings.pair_pause.is_zero() {
                    tokio::time::sleep(self.settings.pair_pause).await;
                }
                pair += 1;
                tracker.set_pair(pair, total);

                info!(
                    batch = batch_index + 1,
                    chunk = chunk_index + 1,
                    pair,
                    total,
                    range = %chunk,
                    cities = batch.len(),
                    "Processing pair"
                );

                match self
                    .run_pair(request, batch, *chunk, tracker, &mut outcome.files_copied)
                    .await
                {
                    Ok(()) => {
                        outcome.succeeded_pairs += 1;
                        self.metrics.pair_succeeded();
                    }
                    Err(e) => {
                        outcome.failed_pairs += 1;
                        self.metrics.pair_failed();
                        error!(
                            batch = batch_index + 1,
                            chunk = chunk_index + 1,
                            range = %chunk,
                            error = %e,
                            "Pair failed"
                        );
                        tracker.record_error(format!(
                            "batch {} chunk {} ({}): {}",
                            batch_index + 1,
                            chunk_index + 1,
                            chunk,
                            e
                        ));
                        if e.is_quota_exceeded() {
                            error!("Vendor monthly job quota exceeded, halting further submissions");
                            outcome.quota_exceeded = true;
                        }
                        outcome.errors.push(PairError {
                            batch: batch_index + 1,
                            chunk: chunk_index + 1,
                            range: *chunk,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        outcome.skipped_pairs = total - outcome.succeeded_pairs - outcome.failed_pairs;
        outcome.success = outcome.succeeded_pairs > 0;

        let summary = outcome.summary();
        info!(status = ?outcome.status(), "{}", summary);
        tracker.finish(outcome.status(), summary);
        debug!(metrics = ?self.metrics.snapshot(), "Sync counters");

        Ok(outcome)
    }

    /// Sync one city; refuses ranges that need more than `max_single_city_chunks` jobs.
    pub async fn sync_city(
        &self,
        city: &City,
        range: DateRange,
        target: &SyncTarget,
        tracker: &ProgressTracker,
    ) -> Result<BatchOutcome, SyncError> {
        let chunks = chunk_dates(range, self.settings.max_days_per_request).len();
        if chunks > self.settings.max_single_city_chunks {
            let err = SyncError::TooManyChunks {
                chunks,
                max: self.settings.max_single_city_chunks,
            };
            tracker.finish(SyncStatus::Failed, err.to_string());
            return Err(err);
        }

        let request = self.request(vec![city.clone()], range, target);
        self.run(&request, tracker).await
    }

    /// Daily job: one run per enabled target over `range` for all cities.
    ///
    /// Stops at the first target that hits the vendor quota.
    pub async fn run_targets(
        &self,
        cities: &[City],
        range: DateRange,
        targets: &BTreeMap<String, SyncTarget>,
        progress: Arc<dyn ProgressStore>,
    ) -> Vec<(String, Result<BatchOutcome, SyncError>)> {
        let mut results = Vec::new();

        for (name, target) in targets.iter().filter(|(_, t)| t.enabled) {
            let tracker = ProgressTracker::new(
                progress.clone(),
                SyncProgress::new(
                    Uuid::now_v7().to_string(),
                    format!("{} ({} cities)", name, cities.len()),
                    range,
                ),
            );
            let request = self.request(cities.to_vec(), range, target);

            info!(target = %name, endpoint = %target.endpoint, schema = %target.schema, "Running sync target");
            let result = self.run(&request, &tracker).await;

            let quota = matches!(&result, Ok(outcome) if outcome.quota_exceeded);
            results.push((name.clone(), result));
            if quota {
                warn!(target = %name, "Skipping remaining targets after quota error");
                break;
            }
        }

        results
    }

    /// Re-sync missing ranges, one `sync_city` per range.
    pub async fn backfill(
        &self,
        plan: &[(City, Vec<DateRange>)],
        target: &SyncTarget,
        progress: Arc<dyn ProgressStore>,
    ) -> BackfillSummary {
        let mut summary = BackfillSummary {
            ranges_total: plan.iter().map(|(_, ranges)| ranges.len()).sum(),
            ..Default::default()
        };
        let mut started = 0;

        'cities: for (city, ranges) in plan {
            for range in ranges {
                if started > 0 && !self.settings.range_pause.is_zero() {
                    tokio::time::sleep(self.settings.range_pause).await;
                }
                started += 1;

                let tracker = ProgressTracker::new(
                    progress.clone(),
                    SyncProgress::new(Uuid::now_v7().to_string(), format!("backfill {}", city.label()), *range),
                );

                match self.sync_city(city, *range, target, &tracker).await {
                    Ok(outcome) => {
                        summary.files_copied += outcome.files_copied.values().sum::<usize>();
                        if outcome.success {
                            summary.ranges_succeeded += 1;
                        } else {
                            summary.ranges_failed += 1;
                        }
                        if outcome.quota_exceeded {
                            summary.quota_exceeded = true;
                            break 'cities;
                        }
                    }
                    Err(e) => {
                        error!(city = %city.label(), range = %range, error = %e, "Backfill range failed");
                        summary.ranges_failed += 1;
                    }
                }
            }
        }

        summary
    }

    fn check_cities(cities: &[City]) -> Result<(), SyncError> {
        if cities.is_empty() {
            return Err(SyncError::NoCities);
        }
        for city in cities {
            city.validate()?;
        }
        Ok(())
    }

    async fn run_pair(
        &self,
        request: &SyncRequest,
        batch: &[City],
        range: DateRange,
        tracker: &ProgressTracker,
        files: &mut BTreeMap<String, usize>,
    ) -> Result<(), SyncError> {
        let job_request = JobRequest::for_cities(batch, range, request.schema)?;

        tracker.set_status(
            SyncStatus::Submitting,
            format!("Submitting {} cities for {}", batch.len(), range),
        );
        let job = self.vendor.submit(&request.endpoint, &job_request).await?;
        info!(job_id = %job.job_id, request_id = ?job.request_id, "Vendor job submitted");

        tracker.set_status(SyncStatus::Polling, format!("Waiting for job {}", job.job_id));
        let on_update = |update: &PollUpdate| tracker.record_poll(update);
        let folder = wait_for_completion(
            self.vendor.as_ref(),
            &job.job_id,
            &self.settings.poll,
            &on_update,
        )
        .await?;

        tracker.set_status(
            SyncStatus::Mirroring,
            format!("Copying {} cities from {}", batch.len(), folder),
        );
        self.mirror_batch(batch, &folder, &request.dest_bucket, tracker, files)
            .await
    }

    /// Copy every city of a finished job, at most `copy_concurrency` at a time.
    async fn mirror_batch(
        &self,
        batch: &[City],
        folder: &str,
        dest_bucket: &str,
        tracker: &ProgressTracker,
        files: &mut BTreeMap<String, usize>,
    ) -> Result<(), SyncError> {
        let semaphore = Arc::new(Semaphore::new(self.settings.copy_concurrency.max(1)));
        let multi_city = batch.len() > 1;
        let mut tasks = JoinSet::new();

        for city in batch {
            let slice = if multi_city { Some(city.batch_poi_id()?) } else { None };
            let semaphore = semaphore.clone();
            let mirror = self.mirror.clone();
            let city = city.clone();
            let folder = folder.to_string();
            let bucket = dest_bucket.to_string();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = mirror
                    .mirror_city(&city, &folder, &bucket, slice.as_deref())
                    .await;
                (city.label(), result)
            });
        }

        let mut copied = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((label, Ok(report))) => {
                    self.metrics.files_copied(report.files_copied);
                    copied.push((label, report.files_copied));
                }
                Ok((label, Err(e))) => {
                    error!(city = %label, error = %e, "City copy failed");
                    failures.push(format!("{}: {}", label, e));
                }
                Err(e) => failures.push(format!("copy task failed: {}", e)),
            }
        }

        if failures.is_empty() {
            // Per-city counts only cover pairs that succeeded as a whole.
            for (label, count) in copied {
                tracker.add_files(count);
                *files.entry(label).or_insert(0) += count;
            }
            Ok(())
        } else {
            Err(SyncError::CopyFailed {
                failed: failures.len(),
                total: batch.len(),
                details: failures.join("; "),
            })
        }
    }
}
