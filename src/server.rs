use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use mobility_sync::api::{self, AppState};
use mobility_sync::observability::{LOG_LINE_LIMIT, trim_log_file};
use mobility_sync::progress::{MemoryProgressStore, ProgressStore, prune_older_than};
use mobility_sync::schedule::DailySchedule;
use mobility_sync::sync::lookback_day;

use crate::context::Context;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Serve the admin API and run the daily sync in the background.
pub async fn run(context: Context, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(context.config.server.bind_addr);
    let progress: Arc<dyn ProgressStore> = Arc::new(MemoryProgressStore::new());

    let scheduler = tokio::spawn(daily_loop(context.clone(), progress.clone()));

    let state = AppState::new(context.config, context.cities, context.orchestrator, progress);
    let result = api::serve(address, state, shutdown_signal()).await;

    scheduler.abort();
    result
}

/// Sleep until the next scheduled time, then sync every enabled target.
async fn daily_loop(context: Context, progress: Arc<dyn ProgressStore>) {
    let schedule: DailySchedule = context.config.sync.schedule;
    info!(%schedule, "Daily sync scheduled (UTC)");

    loop {
        let now = Utc::now();
        let wait = schedule.until_next(now);
        info!(next_run = %schedule.next_run_after(now), "Waiting for next daily sync");
        tokio::time::sleep(wait).await;

        run_daily(&context, progress.clone()).await;
        housekeeping(&context, progress.as_ref());
    }
}

async fn run_daily(context: &Context, progress: Arc<dyn ProgressStore>) {
    let range = lookback_day(Utc::now().date_naive(), context.config.sync.lookback_days);

    let cities = match context.cities.list().await {
        Ok(cities) => cities,
        Err(e) => {
            error!(error = %e, "Daily sync skipped: cannot read cities");
            return;
        }
    };
    if cities.is_empty() {
        warn!("Daily sync skipped: no cities configured");
        return;
    }

    info!(range = %range, cities = cities.len(), "Daily sync starting");
    let results = context
        .orchestrator
        .run_targets(&cities, range, &context.config.sync.targets, progress)
        .await;

    for (target, result) in results {
        match result {
            Ok(outcome) => info!(target = %target, "Daily sync finished: {}", outcome.summary()),
            Err(e) => error!(target = %target, error = %e, "Daily sync failed"),
        }
    }
}

fn housekeeping(context: &Context, progress: &dyn ProgressStore) {
    let window = Duration::from_secs(u64::from(context.config.server.syncs_window_days) * 24 * 3600);
    if let Err(e) = prune_older_than(progress, window, Utc::now()) {
        warn!(error = %e, "Failed to prune sync progress");
    }

    if let Err(e) = trim_log_file(&context.config.server.log_file, LOG_LINE_LIMIT) {
        warn!(error = %e, "Failed to trim log file");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
