use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Vendor API key missing (set VERASET_API_KEY)")]
    MissingApiKey,

    #[error("credentials.role_arn is required")]
    MissingRoleArn,

    #[error("credentials.session_durations must list at least one duration")]
    NoSessionDurations,

    #[error("No enabled sync targets configured")]
    NoEnabledTargets,

    #[error("Sync target '{target}' has no bucket and storage.default_bucket is empty")]
    MissingBucket { target: String },

    #[error("Sync target '{target}' has an empty endpoint")]
    MissingEndpoint { target: String },

    #[error("{field} must be positive")]
    ZeroLimit { field: &'static str },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_vendor(config)?;
    validate_credentials(config)?;
    validate_targets(config)?;
    validate_limits(config)?;
    Ok(())
}

fn validate_vendor(config: &Config) -> Result<(), ValidationError> {
    match &config.vendor.api_key {
        Some(key) if !key.trim().is_empty() => {}
        _ => return Err(ValidationError::MissingApiKey),
    }
    if config.vendor.poll_max_attempts == 0 {
        return Err(ValidationError::ZeroLimit {
            field: "vendor.poll_max_attempts",
        });
    }
    Ok(())
}

fn validate_credentials(config: &Config) -> Result<(), ValidationError> {
    if config.credentials.role_arn.trim().is_empty() {
        return Err(ValidationError::MissingRoleArn);
    }
    if config.credentials.session_durations.is_empty() {
        return Err(ValidationError::NoSessionDurations);
    }
    Ok(())
}

/// Every enabled target needs an endpoint and somewhere to copy to
fn validate_targets(config: &Config) -> Result<(), ValidationError> {
    let mut enabled = 0;

    for (name, target) in config.sync.targets.iter().filter(|(_, t)| t.enabled) {
        enabled += 1;

        if target.endpoint.trim().is_empty() {
            return Err(ValidationError::MissingEndpoint {
                target: name.clone(),
            });
        }

        let has_bucket = target
            .bucket
            .as_deref()
            .map(|b| !b.trim().is_empty())
            .unwrap_or(false);
        if !has_bucket && config.storage.default_bucket.trim().is_empty() {
            return Err(ValidationError::MissingBucket {
                target: name.clone(),
            });
        }
    }

    if enabled == 0 {
        return Err(ValidationError::NoEnabledTargets);
    }
    Ok(())
}

fn validate_limits(config: &Config) -> Result<(), ValidationError> {
    let limits: [(&'static str, u64); 5] = [
        ("sync.max_cities_per_request", config.sync.max_cities_per_request as u64),
        ("sync.max_days_per_request", u64::from(config.sync.max_days_per_request)),
        ("sync.copy_concurrency", config.sync.copy_concurrency as u64),
        ("sync.max_single_city_chunks", config.sync.max_single_city_chunks as u64),
        ("storage.copy_attempts", u64::from(config.storage.copy_attempts)),
    ];

    for (field, value) in limits {
        if value == 0 {
            return Err(ValidationError::ZeroLimit { field });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncTarget;

    fn create_test_config() -> Config {
        let mut config = Config::default();
        config.vendor.api_key = Some("key".to_string());
        config.credentials.role_arn = "arn:aws:iam::123456789012:role/VendorRead".to_string();
        config.storage.default_bucket = "mobility-pings".to_string();
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&create_test_config()).is_ok());
    }

    #[test]
    fn test_missing_api_key() {
        let mut config = create_test_config();
        config.vendor.api_key = Some("  ".to_string());
        assert!(matches!(validate(&config), Err(ValidationError::MissingApiKey)));
    }

    #[test]
    fn test_missing_role_arn() {
        let mut config = create_test_config();
        config.credentials.role_arn.clear();
        assert!(matches!(validate(&config), Err(ValidationError::MissingRoleArn)));
    }

    #[test]
    fn test_target_without_bucket() {
        let mut config = create_test_config();
        config.storage.default_bucket.clear();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::MissingBucket { target }) if target == "pings"
        ));

        config.sync.targets.insert(
            "pings".to_string(),
            SyncTarget {
                bucket: Some("own-bucket".to_string()),
                ..SyncTarget::default()
            },
        );
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_disabled_targets_do_not_count() {
        let mut config = create_test_config();
        config.sync.targets.insert(
            "pings".to_string(),
            SyncTarget {
                enabled: false,
                ..SyncTarget::default()
            },
        );
        assert!(matches!(validate(&config), Err(ValidationError::NoEnabledTargets)));
    }

    #[test]
    fn test_zero_limits() {
        let mut config = create_test_config();
        config.sync.copy_concurrency = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroLimit { field: "sync.copy_concurrency" })
        ));
    }
}
