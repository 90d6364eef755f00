use crate::credentials::BrokerSettings;
use crate::humanize::HumanDuration;
use crate::mirror::MirrorSettings;
use crate::schedule::DailySchedule;
use crate::storage::S3Settings;
use crate::sync::{BatchSettings, SyncTarget};
use crate::vendor::{PollPolicy, VendorClientConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub vendor: VendorConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Admin server and local file locations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default = "default_cities_path")]
    pub cities_path: PathBuf,
    /// Fjall keyspace for CLI sync progress
    #[serde(default = "default_progress_path")]
    pub progress_path: PathBuf,
    /// Timestamped `cities.json` backups kept next to the file
    #[serde(default = "default_backup_limit")]
    pub backup_limit: usize,
    /// How far back `GET /syncs` looks
    #[serde(default = "default_syncs_window_days")]
    pub syncs_window_days: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            log_file: default_log_file(),
            cities_path: default_cities_path(),
            progress_path: default_progress_path(),
            backup_limit: default_backup_limit(),
            syncs_window_days: default_syncs_window_days(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_log_file() -> PathBuf {
    PathBuf::from("logs/app.log")
}

fn default_cities_path() -> PathBuf {
    PathBuf::from("db/cities.json")
}

fn default_progress_path() -> PathBuf {
    PathBuf::from("data/progress")
}

fn default_backup_limit() -> usize {
    crate::cities::DEFAULT_BACKUP_LIMIT
}

fn default_syncs_window_days() -> u32 {
    30
}

/// Vendor job API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VendorConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Normally supplied through `VERASET_API_KEY`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: HumanDuration,
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            poll_interval: default_poll_interval(),
            poll_max_attempts: default_poll_max_attempts(),
        }
    }
}

fn default_base_url() -> String {
    "https://platform.prd.veraset.tech".to_string()
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(60)
}

fn default_poll_interval() -> HumanDuration {
    HumanDuration::from_secs(60)
}

fn default_poll_max_attempts() -> u32 {
    100
}

/// Cross-account role used to read the vendor bucket
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub role_arn: String,
    #[serde(default = "default_session_name")]
    pub session_name: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Tried in order until STS accepts one
    #[serde(default = "default_session_durations")]
    pub session_durations: Vec<HumanDuration>,
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold: HumanDuration,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            role_arn: String::new(),
            session_name: default_session_name(),
            region: None,
            session_durations: default_session_durations(),
            refresh_threshold: default_refresh_threshold(),
        }
    }
}

fn default_session_name() -> String {
    "mobility-sync".to_string()
}

fn default_session_durations() -> Vec<HumanDuration> {
    vec![
        HumanDuration::from_hours(12),
        HumanDuration::from_hours(4),
        HumanDuration::from_hours(1),
    ]
}

fn default_refresh_threshold() -> HumanDuration {
    HumanDuration::from_mins(10)
}

/// Buckets and object layout
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Vendor bucket holding job output
    #[serde(default = "default_source_bucket")]
    pub source_bucket: String,
    /// Destination for targets without their own bucket
    #[serde(default)]
    pub default_bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom S3 endpoint (MinIO, localstack)
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_dest_root")]
    pub dest_root: String,
    #[serde(default = "default_copy_attempts")]
    pub copy_attempts: u32,
    /// Bucket receiving `cities.json` snapshots
    #[serde(default)]
    pub backup_bucket: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            source_bucket: default_source_bucket(),
            default_bucket: String::new(),
            region: default_region(),
            endpoint: None,
            extension: default_extension(),
            dest_root: default_dest_root(),
            copy_attempts: default_copy_attempts(),
            backup_bucket: None,
        }
    }
}

fn default_source_bucket() -> String {
    "veraset-prd-platform-us-west-2".to_string()
}

fn default_region() -> String {
    "us-west-2".to_string()
}

fn default_extension() -> String {
    ".parquet".to_string()
}

fn default_dest_root() -> String {
    "data".to_string()
}

fn default_copy_attempts() -> u32 {
    3
}

/// Batching limits, pacing and the daily job
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// The daily job syncs the day this many days ago
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default)]
    pub schedule: DailySchedule,
    #[serde(default = "default_max_cities_per_request")]
    pub max_cities_per_request: usize,
    #[serde(default = "default_max_days_per_request")]
    pub max_days_per_request: u32,
    #[serde(default = "default_copy_concurrency")]
    pub copy_concurrency: usize,
    #[serde(default = "default_pair_pause")]
    pub pair_pause: HumanDuration,
    #[serde(default = "default_range_pause")]
    pub range_pause: HumanDuration,
    #[serde(default = "default_max_single_city_chunks")]
    pub max_single_city_chunks: usize,
    /// Finished progress entries older than this are pruned
    #[serde(default = "default_progress_max_age")]
    pub progress_max_age: HumanDuration,
    #[serde(default = "default_targets")]
    pub targets: BTreeMap<String, SyncTarget>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            schedule: DailySchedule::default(),
            max_cities_per_request: default_max_cities_per_request(),
            max_days_per_request: default_max_days_per_request(),
            copy_concurrency: default_copy_concurrency(),
            pair_pause: default_pair_pause(),
            range_pause: default_range_pause(),
            max_single_city_chunks: default_max_single_city_chunks(),
            progress_max_age: default_progress_max_age(),
            targets: default_targets(),
        }
    }
}

fn default_lookback_days() -> u32 {
    7
}

fn default_max_cities_per_request() -> usize {
    200
}

fn default_max_days_per_request() -> u32 {
    31
}

fn default_copy_concurrency() -> usize {
    5
}

fn default_pair_pause() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_range_pause() -> HumanDuration {
    HumanDuration::from_secs(2)
}

fn default_max_single_city_chunks() -> usize {
    20
}

fn default_progress_max_age() -> HumanDuration {
    HumanDuration::from_hours(24)
}

fn default_targets() -> BTreeMap<String, SyncTarget> {
    BTreeMap::from([("pings".to_string(), SyncTarget::default())])
}

impl Config {
    pub fn vendor_client_config(&self) -> VendorClientConfig {
        VendorClientConfig {
            base_url: self.vendor.base_url.clone(),
            api_key: self.vendor.api_key.clone().unwrap_or_default(),
            connect_timeout: self.vendor.connect_timeout.as_duration(),
            request_timeout: self.vendor.request_timeout.as_duration(),
            ..VendorClientConfig::default()
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.vendor.poll_interval.as_duration(),
            max_attempts: self.vendor.poll_max_attempts,
        }
    }

    pub fn broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            refresh_threshold: self.credentials.refresh_threshold.as_duration(),
            durations: self
                .credentials
                .session_durations
                .iter()
                .map(HumanDuration::as_duration)
                .collect(),
        }
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            region: self.storage.region.clone(),
            endpoint: self.storage.endpoint.clone(),
        }
    }

    pub fn mirror_settings(&self) -> MirrorSettings {
        MirrorSettings {
            source_bucket: self.storage.source_bucket.clone(),
            extension: self.storage.extension.clone(),
            dest_root: self.storage.dest_root.clone(),
            max_attempts: self.storage.copy_attempts,
        }
    }

    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            max_cities_per_request: self.sync.max_cities_per_request,
            max_days_per_request: self.sync.max_days_per_request,
            copy_concurrency: self.sync.copy_concurrency,
            pair_pause: self.sync.pair_pause.as_duration(),
            range_pause: self.sync.range_pause.as_duration(),
            max_single_city_chunks: self.sync.max_single_city_chunks,
            poll: self.poll_policy(),
        }
    }

    /// Look up a target by name, falling back to the first enabled one.
    pub fn target(&self, name: Option<&str>) -> Option<(&String, &SyncTarget)> {
        match name {
            Some(name) => self.sync.targets.get_key_value(name),
            None => self.sync.targets.iter().find(|(_, t)| t.enabled),
        }
    }
}
