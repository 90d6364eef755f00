use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use mobility_sync::vendor::SchemaType;

#[derive(Parser, Debug)]
#[command(name = "mobility-sync")]
#[command(about = "Sync Veraset mobility data into S3", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the admin API and the daily scheduler
    Serve(ServeArgs),
    /// Run every enabled sync target once (defaults to the lookback day)
    Sync(SyncArgs),
    /// Sync all cities for one endpoint over a date range
    BatchSync(BatchSyncArgs),
    /// Manage the city list
    Cities {
        #[command(subcommand)]
        command: CitiesCommand,
    },
    /// Report missing dates per city in the destination bucket
    Report(ReportArgs),
    /// Re-sync the missing date ranges found by the coverage report
    Backfill(BackfillArgs),
    /// Show unfinished CLI syncs and prune old entries
    Progress(ProgressArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the admin API to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct SyncArgs {
    #[arg(long, requires = "to_date")]
    pub from_date: Option<NaiveDate>,
    #[arg(long, requires = "from_date")]
    pub to_date: Option<NaiveDate>,
    /// Only run this target
    #[arg(long)]
    pub target: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct BatchSyncArgs {
    #[arg(long)]
    pub from_date: NaiveDate,
    #[arg(long)]
    pub to_date: NaiveDate,
    /// Vendor endpoint, e.g. movement/job/trips
    #[arg(long)]
    pub endpoint: Option<String>,
    #[arg(long)]
    pub schema: Option<SchemaType>,
    /// Destination bucket
    #[arg(long)]
    pub bucket: Option<String>,
    /// Print the batch plan without contacting the vendor
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum CitiesCommand {
    /// Print every configured city
    List,
}

#[derive(clap::Args, Debug)]
pub struct ReportArgs {
    #[arg(long)]
    pub from: NaiveDate,
    #[arg(long)]
    pub to: NaiveDate,
    /// Bucket to inspect (defaults to storage.default_bucket)
    #[arg(long)]
    pub bucket: Option<String>,
    #[arg(long)]
    pub out_csv: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct BackfillArgs {
    #[arg(long)]
    pub from: NaiveDate,
    #[arg(long)]
    pub to: NaiveDate,
    /// Sync target to backfill (defaults to the first enabled one)
    #[arg(long)]
    pub target: Option<String>,
    /// Print the ranges that would be synced
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(clap::Args, Debug)]
pub struct ProgressArgs {
    /// Entries not updated for this long are removed (defaults to sync.progress_max_age)
    #[arg(long)]
    pub max_age_hours: Option<u64>,
}
