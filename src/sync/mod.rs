//! Batch orchestration of vendor jobs and copies
//!
//! A sync request (cities x date range) is split into city batches and date
//! chunks that fit the vendor limits. Each (batch, chunk) pair is one vendor
//! job followed by a parallel copy of every city in the batch.

mod chunking;
mod orchestrator;

pub use chunking::{batch_cities, chunk_dates, lookback_day};
pub use orchestrator::{BackfillSummary, BatchOutcome, PairError, SyncOrchestrator, SyncRequest};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::cities::CityError;
use crate::vendor::{PollPolicy, SchemaType, VendorError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no cities to sync")]
    NoCities,

    #[error(transparent)]
    InvalidCity(#[from] CityError),

    #[error("date range needs {chunks} requests; a single-city sync allows at most {max}")]
    TooManyChunks { chunks: usize, max: usize },

    #[error(transparent)]
    Vendor(#[from] VendorError),

    #[error("{failed} of {total} city copies failed: {details}")]
    CopyFailed {
        failed: usize,
        total: usize,
        details: String,
    },
}

impl SyncError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, SyncError::Vendor(e) if e.is_quota_exceeded())
    }
}

/// Vendor limits and pacing
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub max_cities_per_request: usize,
    pub max_days_per_request: u32,
    pub copy_concurrency: usize,
    /// Pause between successive (batch, chunk) pairs
    pub pair_pause: Duration,
    /// Pause between backfill ranges
    pub range_pause: Duration,
    pub max_single_city_chunks: usize,
    pub poll: PollPolicy,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_cities_per_request: 200,
            max_days_per_request: 31,
            copy_concurrency: 5,
            pair_pause: Duration::from_secs(10),
            range_pause: Duration::from_secs(2),
            max_single_city_chunks: 20,
            poll: PollPolicy::default(),
        }
    }
}

/// One kind of data synced by the daily job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncTarget {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_schema")]
    pub schema: SchemaType,
    /// Destination bucket; the storage default when absent
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for SyncTarget {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            schema: default_schema(),
            bucket: None,
            enabled: true,
        }
    }
}

fn default_endpoint() -> String {
    "movement/job/pings".to_string()
}

fn default_schema() -> SchemaType {
    SchemaType::Full
}

fn default_enabled() -> bool {
    true
}
