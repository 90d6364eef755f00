//! Short-lived AWS session credentials for the copy step
//!
//! A [`CredentialBroker`] caches one [`CredentialLease`] obtained through a
//! [`RoleAssumer`] and hands it out until it gets close to expiry.

mod broker;
mod sts;

pub use broker::{BrokerSettings, CredentialBroker};
pub use sts::StsRoleAssumer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("session duration of {seconds}s rejected: {message}")]
    DurationRejected { seconds: u64, message: String },

    #[error("every session duration was rejected (tried {tried:?} seconds)")]
    AllDurationsRejected { tried: Vec<u64> },

    #[error("assume role failed: {0}")]
    AssumeRole(String),

    #[error("assume role response carried no credentials")]
    MissingCredentials,

    #[error("no session durations configured")]
    NoDurations,
}

/// Temporary access keys with their expiry
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialLease {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

impl CredentialLease {
    /// Lifetime left at `now`; negative once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.expires_at - now
    }
}

impl fmt::Debug for CredentialLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialLease")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Something that can exchange a role for a lease
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(&self, duration: Duration) -> Result<CredentialLease, CredentialError>;
}
