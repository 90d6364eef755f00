//! Configuration management for mobility-sync
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use mobility_sync::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Admin API listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `MOBILITY_SYNC__<section>__<key>`
//!
//! Examples:
//! - `MOBILITY_SYNC__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `MOBILITY_SYNC__STORAGE__DEFAULT_BUCKET=mobility-pings`
//! - `MOBILITY_SYNC__VENDOR__POLL_INTERVAL=30s`
//!
//! The vendor API key is read from `VERASET_API_KEY` only.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/mobility-sync.toml`.
//! This can be overridden using the `MOBILITY_SYNC_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{Config, CredentialsConfig, ServerConfig, StorageConfig, SyncConfig, VendorConfig};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`MOBILITY_SYNC__*`, `VERASET_API_KEY`)
    /// 2. TOML file (default: `config/mobility-sync.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[vendor]
api_key = "test-key"

[credentials]
role_arn = "arn:aws:iam::123456789012:role/VendorRead"

[storage]
default_bucket = "mobility-pings"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.sync.targets.len(), 1);
        assert_eq!(config.target(None).unwrap().0, "pings");
    }

    #[test]
    fn test_validation_catches_missing_bucket() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[vendor]
api_key = "test-key"

[credentials]
role_arn = "arn:aws:iam::123456789012:role/VendorRead"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::MissingBucket { .. })
        ));
    }

    #[test]
    fn test_bad_schedule_is_a_load_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[sync]\nschedule = \"25:99\"\n").unwrap();

        assert!(matches!(
            Config::load_from_path(config_path),
            Err(ConfigError::LoadError(_))
        ));
    }
}
