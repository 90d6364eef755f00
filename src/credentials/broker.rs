use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use super::{CredentialError, CredentialLease, RoleAssumer};

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// A cached lease with less lifetime than this is replaced
    pub refresh_threshold: Duration,
    /// Session lengths tried in order until one is accepted
    pub durations: Vec<Duration>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            refresh_threshold: Duration::from_secs(10 * 60),
            durations: vec![
                Duration::from_secs(12 * 3600),
                Duration::from_secs(4 * 3600),
                Duration::from_secs(3600),
            ],
        }
    }
}

/// Caches one lease and renews it before expiry
pub struct CredentialBroker {
    assumer: Arc<dyn RoleAssumer>,
    settings: BrokerSettings,
    cached: Mutex<Option<CredentialLease>>,
    assumed: AtomicU64,
    invalidated: AtomicU64,
}

impl CredentialBroker {
    pub fn new(assumer: Arc<dyn RoleAssumer>, settings: BrokerSettings) -> Self {
        Self {
            assumer,
            settings,
            cached: Mutex::new(None),
            assumed: AtomicU64::new(0),
            invalidated: AtomicU64::new(0),
        }
    }

    /// Current lease, assuming the role again when the cached one is near expiry.
    pub async fn get(&self) -> Result<CredentialLease, CredentialError> {
        let mut cached = self.cached.lock().await;

        if let Some(lease) = cached.as_ref() {
            let threshold = chrono::Duration::from_std(self.settings.refresh_threshold)
                .unwrap_or(chrono::Duration::MAX);
            if lease.remaining(Utc::now()) > threshold {
                return Ok(lease.clone());
            }
            tracing::info!(expires_at = %lease.expires_at, "Credentials close to expiry, refreshing");
        }

        let lease = self.assume_with_fallback().await?;
        *cached = Some(lease.clone());
        Ok(lease)
    }

    /// Drop the cached lease so the next `get` assumes the role again.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
        self.invalidated.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn refresh(&self) -> Result<CredentialLease, CredentialError> {
        self.invalidate().await;
        self.get().await
    }

    /// Number of successful role assumptions
    pub fn assumed_count(&self) -> u64 {
        self.assumed.load(Ordering::Relaxed)
    }

    pub fn invalidated_count(&self) -> u64 {
        self.invalidated.load(Ordering::Relaxed)
    }

    async fn assume_with_fallback(&self) -> Result<CredentialLease, CredentialError> {
        if self.settings.durations.is_empty() {
            return Err(CredentialError::NoDurations);
        }

        let mut tried = Vec::with_capacity(self.settings.durations.len());

        for duration in &self.settings.durations {
            match self.assumer.assume_role(*duration).await {
                Ok(lease) => {
                    self.assumed.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        duration_secs = duration.as_secs(),
                        expires_at = %lease.expires_at,
                        "Assumed role"
                    );
                    return Ok(lease);
                }
                Err(CredentialError::DurationRejected { seconds, message }) => {
                    tracing::warn!(seconds, %message, "Session duration rejected, trying a shorter one");
                    tried.push(seconds);
                }
                Err(e) => return Err(e),
            }
        }

        Err(CredentialError::AllDurationsRejected { tried })
    }
}
