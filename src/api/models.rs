//! Request and response bodies of the admin API.
//!
//! Cities are read and written as [`City`](crate::cities::City) /
//! [`CityDraft`](crate::cities::CityDraft) and syncs are reported as
//! [`SyncProgress`](crate::progress::SyncProgress); this module only holds
//! the shapes specific to the HTTP surface.
//!
//! Starting a sync for one city:
//!
//! ```json
//! {
//!   "from_date": "2025-01-01",
//!   "to_date": "2025-01-31",
//!   "schema": "TRIPS",
//!   "target": "trips"
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::observability::MetricsSnapshot;

/// Body of `POST /cities/{id}/sync`
#[derive(Debug, Deserialize, Clone)]
pub struct SyncRequestBody {
    pub from_date: String,
    pub to_date: String,
    /// Overrides the target's schema
    #[serde(default)]
    pub schema: Option<String>,
    /// Named sync target; the first enabled one when absent
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncAcceptedResponse {
    pub sync_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_log_lines")]
    pub lines: usize,
}

fn default_log_lines() -> usize {
    1000
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub metrics: MetricsSnapshot,
}
