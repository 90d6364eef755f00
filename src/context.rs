use std::sync::Arc;

use tracing::info;

use mobility_sync::cities::CityStore;
use mobility_sync::config::Config;
use mobility_sync::credentials::{CredentialBroker, StsRoleAssumer};
use mobility_sync::mirror::{ObjectStoreCopier, S3StoreFactory, StorageMirror};
use mobility_sync::storage::StorageClient;
use mobility_sync::sync::{SyncOrchestrator, SyncTarget};
use mobility_sync::vendor::VendorClient;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Components shared by the server and the one-shot commands
#[derive(Clone)]
pub struct Context {
    pub config: Config,
    pub cities: Arc<CityStore>,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl Context {
    pub async fn build(config: Config) -> Result<Self, AnyError> {
        let cities = Arc::new(open_cities(&config)?);

        let vendor = VendorClient::new(&config.vendor_client_config())?;

        info!(role_arn = %config.credentials.role_arn, "Using cross-account role for vendor bucket");
        let assumer = StsRoleAssumer::from_env(
            config.credentials.role_arn.clone(),
            config.credentials.session_name.clone(),
            config.credentials.region.clone(),
        )
        .await;
        let broker = Arc::new(CredentialBroker::new(Arc::new(assumer), config.broker_settings()));

        let copier = ObjectStoreCopier::new(S3StoreFactory::new(config.s3_settings()));
        let mirror = Arc::new(StorageMirror::new(broker, Arc::new(copier), config.mirror_settings()));

        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::new(vendor),
            mirror,
            config.batch_settings(),
            config.storage.default_bucket.clone(),
        ));

        Ok(Self {
            config,
            cities,
            orchestrator,
        })
    }

    /// Named target, or the first enabled one.
    pub fn target(&self, name: Option<&str>) -> Result<SyncTarget, AnyError> {
        self.config
            .target(name)
            .map(|(_, target)| target.clone())
            .ok_or_else(|| match name {
                Some(name) => format!("unknown sync target '{name}'").into(),
                None => "no enabled sync target configured".into(),
            })
    }

    pub fn dest_bucket(&self, target: &SyncTarget) -> String {
        target
            .bucket
            .clone()
            .unwrap_or_else(|| self.config.storage.default_bucket.clone())
    }
}

/// City store without any cloud wiring; enough for read-only commands.
pub fn open_cities(config: &Config) -> Result<CityStore, AnyError> {
    let mut store = CityStore::open(&config.server.cities_path).with_backup_limit(config.server.backup_limit);

    if let Some(bucket) = config.storage.backup_bucket.as_deref() {
        let client = StorageClient::s3(&config.s3_settings(), bucket)?;
        store = store.with_remote_backup(Arc::new(client));
    }

    Ok(store)
}
