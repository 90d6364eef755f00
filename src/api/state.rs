use std::path::PathBuf;
use std::sync::Arc;

use crate::cities::CityStore;
use crate::config::Config;
use crate::observability::Metrics;
use crate::progress::ProgressStore;
use crate::sync::SyncOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cities: Arc<CityStore>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub progress: Arc<dyn ProgressStore>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Config,
        cities: Arc<CityStore>,
        orchestrator: Arc<SyncOrchestrator>,
        progress: Arc<dyn ProgressStore>,
    ) -> Self {
        let metrics = orchestrator.metrics().clone();
        Self {
            config: Arc::new(config),
            cities,
            orchestrator,
            progress,
            metrics,
        }
    }

    pub fn log_file(&self) -> PathBuf {
        self.config.server.log_file.clone()
    }
}
