use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "MOBILITY_SYNC_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/mobility-sync.toml";
const ENV_PREFIX: &str = "MOBILITY_SYNC";
const ENV_SEPARATOR: &str = "__";
const API_KEY_ENV_VAR: &str = "VERASET_API_KEY";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;

    load_secrets(&mut config);

    Ok(config)
}

/// Secrets are never stored in TOML files, only in environment
fn load_secrets(config: &mut Config) {
    if let Ok(api_key) = env::var(API_KEY_ENV_VAR) {
        if !api_key.trim().is_empty() {
            config.vendor.api_key = Some(api_key.trim().to_string());
        }
    }
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // MOBILITY_SYNC__STORAGE__DEFAULT_BUCKET -> storage.default_bucket
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vendor::SchemaType;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.vendor.poll_max_attempts, 100);
        assert_eq!(config.vendor.poll_interval.as_duration(), Duration::from_secs(60));
        assert_eq!(config.sync.lookback_days, 7);
        assert_eq!(config.sync.schedule.to_string(), "02:00");
        assert_eq!(config.storage.source_bucket, "veraset-prd-platform-us-west-2");
        assert_eq!(config.credentials.session_durations.len(), 3);
        assert!(config.sync.targets.contains_key("pings"));
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"
cities_path = "/srv/mobility/cities.json"

[vendor]
poll_interval = "30s"
poll_max_attempts = 20

[credentials]
role_arn = "arn:aws:iam::123456789012:role/VendorRead"
session_durations = ["4h", "1h"]
refresh_threshold = "5m"

[storage]
default_bucket = "mobility-pings"
endpoint = "http://localhost:9000"

[sync]
schedule = "03:30"
pair_pause = "1s"

[sync.targets.pings]
endpoint = "movement/job/pings"

[sync.targets.trips]
endpoint = "movement/job/trips"
schema = "TRIPS"
bucket = "mobility-trips"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.poll_policy().interval, Duration::from_secs(30));
        assert_eq!(config.poll_policy().max_attempts, 20);
        assert_eq!(
            config.broker_settings().durations,
            vec![Duration::from_secs(4 * 3600), Duration::from_secs(3600)]
        );
        assert_eq!(config.broker_settings().refresh_threshold, Duration::from_secs(300));
        assert_eq!(config.s3_settings().endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.sync.schedule.to_string(), "03:30");
        assert_eq!(config.batch_settings().pair_pause, Duration::from_secs(1));

        let trips = &config.sync.targets["trips"];
        assert_eq!(trips.schema, SchemaType::Trips);
        assert_eq!(trips.bucket.as_deref(), Some("mobility-trips"));
        assert!(trips.enabled);
        assert_eq!(config.sync.targets["pings"].schema, SchemaType::Full);
    }
}
