use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use mobility_sync::cities::City;
use mobility_sync::config::Config;
use mobility_sync::progress::{
    LedgerProgressStore, ProgressStore, ProgressTracker, SyncProgress, SyncStatus, prune_older_than,
};
use mobility_sync::report::{self, CityCoverage};
use mobility_sync::storage::StorageClient;
use mobility_sync::sync::{SyncTarget, batch_cities, chunk_dates, lookback_day};
use mobility_sync::vendor::DateRange;

use crate::cli::{BackfillArgs, BatchSyncArgs, ProgressArgs, ReportArgs, SyncArgs};
use crate::context::{Context, open_cities};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One run of every enabled target, or of the named one.
pub async fn sync(context: Context, args: SyncArgs) -> Result<(), AnyError> {
    let range = match (args.from_date, args.to_date) {
        (Some(from), Some(to)) => DateRange::new(from, to)?,
        _ => lookback_day(Utc::now().date_naive(), context.config.sync.lookback_days),
    };

    let targets = match args.target.as_deref() {
        Some(name) => {
            let mut target = context.target(Some(name))?;
            target.enabled = true;
            BTreeMap::from([(name.to_string(), target)])
        }
        None => context.config.sync.targets.clone(),
    };

    let cities = load_cities(&context).await?;
    let store = open_progress(&context.config)?;

    info!(range = %range, cities = cities.len(), targets = targets.len(), "Sync starting");
    let results = context
        .orchestrator
        .run_targets(&cities, range, &targets, store.clone())
        .await;

    let mut failed = 0;
    for (target, result) in &results {
        match result {
            Ok(outcome) => {
                println!("{target}: {}", outcome.summary());
                if outcome.status() == SyncStatus::Failed {
                    failed += 1;
                }
            }
            Err(e) => {
                println!("{target}: failed: {e}");
                failed += 1;
            }
        }
    }

    forget_completed(store.as_ref())?;
    store.persist()?;

    if failed > 0 {
        return Err(format!("{failed} of {} sync targets failed", results.len()).into());
    }
    Ok(())
}

/// All cities against one endpoint over an arbitrary range.
pub async fn batch_sync(context: Context, args: BatchSyncArgs) -> Result<(), AnyError> {
    let range = DateRange::new(args.from_date, args.to_date)?;

    let mut target = context.target(None).unwrap_or_default();
    if let Some(endpoint) = args.endpoint {
        target.endpoint = endpoint;
    }
    if let Some(schema) = args.schema {
        target.schema = schema;
    }
    if let Some(bucket) = args.bucket {
        target.bucket = Some(bucket);
    }

    let cities = load_cities(&context).await?;
    let settings = context.orchestrator.settings();

    if args.dry_run {
        let batches = batch_cities(&cities, settings.max_cities_per_request);
        let chunks = chunk_dates(range, settings.max_days_per_request);
        println!(
            "{} cities x {} -> {} batches x {} chunks = {} vendor jobs ({} {} -> s3://{})",
            cities.len(),
            range,
            batches.len(),
            chunks.len(),
            batches.len() * chunks.len(),
            target.endpoint,
            target.schema,
            context.dest_bucket(&target)
        );
        for (b, batch) in batches.iter().enumerate() {
            for (c, chunk) in chunks.iter().enumerate() {
                println!("  batch {}/{} ({} cities), chunk {}/{}: {}", b + 1, batches.len(), batch.len(), c + 1, chunks.len(), chunk);
            }
        }
        return Ok(());
    }

    let store = open_progress(&context.config)?;
    let tracker = ProgressTracker::new(
        store.clone(),
        SyncProgress::new(
            Uuid::now_v7().to_string(),
            format!("batch {} ({} cities)", target.endpoint, cities.len()),
            range,
        ),
    );

    let request = context.orchestrator.request(cities, range, &target);
    let outcome = context.orchestrator.run(&request, &tracker).await?;

    println!("{}", outcome.summary());
    for error in &outcome.errors {
        println!("  batch {} chunk {} ({}): {}", error.batch, error.chunk, error.range, error.message);
    }

    forget_completed(store.as_ref())?;
    store.persist()?;

    if !outcome.success {
        return Err("batch sync failed".into());
    }
    Ok(())
}

pub async fn list_cities(config: &Config) -> Result<(), AnyError> {
    let cities = open_cities(config)?.list().await?;

    for city in &cities {
        let aoi = match (city.radius_meters, &city.polygon_geojson) {
            (Some(radius), None) => format!("radius {radius}m"),
            (None, Some(_)) => "polygon".to_string(),
            (None, None) => "no AOI".to_string(),
            (Some(_), Some(_)) => "conflicting AOI".to_string(),
        };
        println!("{}  {}  ({})", city.city_id, city.label(), aoi);
    }
    println!("{} cities", cities.len());
    Ok(())
}

pub async fn report(config: &Config, args: ReportArgs) -> Result<(), AnyError> {
    let range = DateRange::new(args.from, args.to)?;
    let bucket = args
        .bucket
        .unwrap_or_else(|| config.storage.default_bucket.clone());

    let entries = coverage(config, &bucket, range).await?;
    for entry in &entries {
        println!("{}", entry.describe());
    }

    let incomplete = entries.iter().filter(|e| !e.is_complete()).count();
    println!("{} of {} cities have missing dates in {}", incomplete, entries.len(), range);

    if let Some(path) = args.out_csv {
        report::write_csv_file(&path, &entries)?;
        println!("CSV written to {}", path.display());
    }
    Ok(())
}

/// Sync only what the coverage report says is missing.
pub async fn backfill(context: Context, args: BackfillArgs) -> Result<(), AnyError> {
    let range = DateRange::new(args.from, args.to)?;
    let target = context.target(args.target.as_deref())?;
    let bucket = context.dest_bucket(&target);

    let entries = coverage(&context.config, &bucket, range).await?;
    let plan: Vec<(City, Vec<DateRange>)> = entries
        .into_iter()
        .filter(|entry| !entry.is_complete())
        .map(|entry| (entry.city, entry.ranges))
        .collect();

    if plan.is_empty() {
        println!("Nothing to backfill: every city is complete for {range}");
        return Ok(());
    }

    if args.dry_run {
        for (city, ranges) in &plan {
            let ranges: Vec<String> = ranges.iter().map(ToString::to_string).collect();
            println!("{}: {}", city.label(), ranges.join("; "));
        }
        return Ok(());
    }

    let store = open_progress(&context.config)?;
    let summary = context.orchestrator.backfill(&plan, &target, store.clone()).await;

    println!(
        "Backfill: {}/{} ranges succeeded, {} failed, {} files copied",
        summary.ranges_succeeded, summary.ranges_total, summary.ranges_failed, summary.files_copied
    );
    if summary.quota_exceeded {
        println!("Stopped early: vendor monthly job quota exceeded");
    }

    forget_completed(store.as_ref())?;
    store.persist()?;
    Ok(())
}

/// Prune stale entries, then list what is left.
pub fn progress(config: &Config, args: ProgressArgs) -> Result<(), AnyError> {
    let store = LedgerProgressStore::open(&config.server.progress_path)?;
    let max_age = args
        .max_age_hours
        .map(|hours| std::time::Duration::from_secs(hours * 3600))
        .unwrap_or_else(|| config.sync.progress_max_age.as_duration());

    let removed = prune_older_than(&store, max_age, Utc::now())?;
    store.persist()?;

    let entries = store.list()?;
    if entries.is_empty() {
        println!("No unfinished syncs ({removed} old entries removed)");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}  {}  {}  {:?}  pair {}/{}  files {}{}",
            entry.sync_id,
            entry.label,
            entry.date_range,
            entry.status,
            entry.current,
            entry.total,
            entry.files_copied,
            entry
                .message
                .as_deref()
                .map(|m| format!("  {m}"))
                .unwrap_or_default()
        );
        for error in &entry.errors {
            println!("    {error}");
        }
    }
    println!("{} entries ({} old entries removed)", entries.len(), removed);
    Ok(())
}

async fn load_cities(context: &Context) -> Result<Vec<City>, AnyError> {
    let cities = context.cities.list().await?;
    if cities.is_empty() {
        return Err(format!("no cities in {}", context.config.server.cities_path.display()).into());
    }
    Ok(cities)
}

async fn coverage(config: &Config, bucket: &str, range: DateRange) -> Result<Vec<CityCoverage>, AnyError> {
    let cities = open_cities(config)?.list().await?;
    let storage = StorageClient::s3(&config.s3_settings(), bucket)?;

    info!(bucket, range = %range, cities = cities.len(), "Checking coverage");
    Ok(report::coverage(&storage, &cities, range, &config.storage.dest_root).await?)
}

fn open_progress(config: &Config) -> Result<Arc<LedgerProgressStore>, AnyError> {
    Ok(Arc::new(LedgerProgressStore::open(&config.server.progress_path)?))
}

/// Completed syncs need no follow-up; anything else stays for `progress`.
fn forget_completed(store: &dyn ProgressStore) -> Result<(), AnyError> {
    for entry in store.list()? {
        if entry.status == SyncStatus::Completed {
            store.remove(&entry.sync_id)?;
        }
    }
    Ok(())
}
