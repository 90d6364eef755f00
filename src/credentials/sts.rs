use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata};
use chrono::{DateTime, Utc};
use std::time::Duration;

use super::{CredentialError, CredentialLease, RoleAssumer};

/// `sts:AssumeRole` through the AWS SDK
pub struct StsRoleAssumer {
    client: aws_sdk_sts::Client,
    role_arn: String,
    session_name: String,
}

impl StsRoleAssumer {
    pub fn new(client: aws_sdk_sts::Client, role_arn: String, session_name: String) -> Self {
        Self {
            client,
            role_arn,
            session_name,
        }
    }

    /// Build a client from the default AWS provider chain.
    pub async fn from_env(role_arn: String, session_name: String, region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region.filter(|r| !r.is_empty()) {
            loader = loader.region(Region::new(region));
        }
        let sdk_config = loader.load().await;
        Self::new(aws_sdk_sts::Client::new(&sdk_config), role_arn, session_name)
    }
}

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    async fn assume_role(&self, duration: Duration) -> Result<CredentialLease, CredentialError> {
        let seconds = duration.as_secs();
        let duration_seconds = i32::try_from(seconds).map_err(|_| {
            CredentialError::DurationRejected {
                seconds,
                message: "duration does not fit DurationSeconds".to_string(),
            }
        })?;

        tracing::debug!(role_arn = %self.role_arn, seconds, "Assuming role");

        let output = self
            .client
            .assume_role()
            .role_arn(&self.role_arn)
            .role_session_name(&self.session_name)
            .duration_seconds(duration_seconds)
            .send()
            .await
            .map_err(|err| {
                let context = DisplayErrorContext(&err).to_string();
                let service = err.into_service_error();
                let message = service
                    .message()
                    .map(str::to_string)
                    .unwrap_or(context);
                classify_failure(seconds, message)
            })?;

        let credentials = output
            .credentials()
            .ok_or(CredentialError::MissingCredentials)?;

        let expires_at = DateTime::<Utc>::from_timestamp(credentials.expiration().secs(), 0)
            .ok_or_else(|| CredentialError::AssumeRole("invalid expiration timestamp".into()))?;

        Ok(CredentialLease {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expires_at,
        })
    }
}

fn classify_failure(seconds: u64, message: String) -> CredentialError {
    if is_duration_rejection(&message) {
        CredentialError::DurationRejected { seconds, message }
    } else {
        CredentialError::AssumeRole(message)
    }
}

/// STS rejects a too-long session with a validation error naming the parameter.
fn is_duration_rejection(message: &str) -> bool {
    message.contains("DurationSeconds") || message.contains("MaxSessionDuration")
}
