use chrono::NaiveDate;
use thiserror::Error;

use super::models::SyncRequestBody;
use crate::config::Config;
use crate::sync::SyncTarget;
use crate::vendor::{DateRange, DateRangeError, SchemaType};

#[derive(Debug, Error)]
pub enum SyncBodyError {
    #[error("{field} must be a YYYY-MM-DD date, got '{value}'")]
    InvalidDate { field: &'static str, value: String },
    #[error(transparent)]
    InvertedRange(#[from] DateRangeError),
    #[error("{0}")]
    InvalidSchema(String),
    #[error("unknown sync target '{0}'")]
    UnknownTarget(String),
    #[error("sync target '{0}' is disabled")]
    DisabledTarget(String),
    #[error("no enabled sync target configured")]
    NoTarget,
}

/// Resolve the date range and target (with schema override) of a sync request.
pub fn validate_sync_body(
    body: &SyncRequestBody,
    config: &Config,
) -> Result<(DateRange, SyncTarget), SyncBodyError> {
    let from = parse_date("from_date", &body.from_date)?;
    let to = parse_date("to_date", &body.to_date)?;
    let range = DateRange::new(from, to)?;

    let (name, target) = match body.target.as_deref() {
        Some(name) => config
            .target(Some(name))
            .ok_or_else(|| SyncBodyError::UnknownTarget(name.to_string()))?,
        None => config.target(None).ok_or(SyncBodyError::NoTarget)?,
    };
    if !target.enabled {
        return Err(SyncBodyError::DisabledTarget(name.clone()));
    }

    let mut target = target.clone();
    if let Some(schema) = body.schema.as_deref() {
        target.schema = schema
            .parse::<SchemaType>()
            .map_err(SyncBodyError::InvalidSchema)?;
    }

    Ok((range, target))
}

fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, SyncBodyError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| SyncBodyError::InvalidDate {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(from: &str, to: &str) -> SyncRequestBody {
        SyncRequestBody {
            from_date: from.to_string(),
            to_date: to.to_string(),
            schema: None,
            target: None,
        }
    }

    fn config_with_trips() -> Config {
        let mut config = Config::default();
        config.sync.targets.insert(
            "trips".to_string(),
            SyncTarget {
                endpoint: "movement/job/trips".to_string(),
                schema: SchemaType::Trips,
                bucket: None,
                enabled: false,
            },
        );
        config
    }

    #[test]
    fn test_defaults_to_first_enabled_target() {
        let (range, target) = validate_sync_body(&body("2025-01-01", "2025-01-31"), &config_with_trips()).unwrap();
        assert_eq!(range.days(), 31);
        assert_eq!(target.endpoint, "movement/job/pings");
        assert_eq!(target.schema, SchemaType::Full);
    }

    #[test]
    fn test_schema_override() {
        let mut request = body("2025-01-01", "2025-01-01");
        request.schema = Some("basic".to_string());
        let (_, target) = validate_sync_body(&request, &Config::default()).unwrap();
        assert_eq!(target.schema, SchemaType::Basic);

        request.schema = Some("everything".to_string());
        assert!(matches!(
            validate_sync_body(&request, &Config::default()),
            Err(SyncBodyError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_rejects_bad_dates() {
        let config = Config::default();
        assert!(matches!(
            validate_sync_body(&body("2025-13-01", "2025-01-01"), &config),
            Err(SyncBodyError::InvalidDate { field: "from_date", .. })
        ));
        assert!(matches!(
            validate_sync_body(&body("2025-02-01", "2025-01-01"), &config),
            Err(SyncBodyError::InvertedRange(_))
        ));
    }

    #[test]
    fn test_unknown_and_disabled_targets() {
        let config = config_with_trips();
        let mut request = body("2025-01-01", "2025-01-01");

        request.target = Some("visits".to_string());
        assert!(matches!(
            validate_sync_body(&request, &config),
            Err(SyncBodyError::UnknownTarget(name)) if name == "visits"
        ));

        request.target = Some("trips".to_string());
        assert!(matches!(
            validate_sync_body(&request, &config),
            Err(SyncBodyError::DisabledTarget(_))
        ));
    }
}
