mod cli;
mod commands;
mod context;
mod server;

use clap::Parser;
use cli::{CitiesCommand, Cli, Commands};
use context::Context;
use mobility_sync::config::Config;
use mobility_sync::observability::{LOG_LINE_LIMIT, init_tracing, trim_log_file};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = Config::load()?;

    let trimmed = trim_log_file(&config.server.log_file, LOG_LINE_LIMIT);
    init_tracing(Some(&config.server.log_file))?;
    if let Err(e) = trimmed {
        tracing::warn!(error = %e, "Failed to trim log file");
    }

    match cli.command {
        Commands::Serve(args) => server::run(Context::build(config).await?, args.address).await?,
        Commands::Sync(args) => commands::sync(Context::build(config).await?, args).await?,
        Commands::BatchSync(args) => commands::batch_sync(Context::build(config).await?, args).await?,
        Commands::Cities {
            command: CitiesCommand::List,
        } => commands::list_cities(&config).await?,
        Commands::Report(args) => commands::report(&config, args).await?,
        Commands::Backfill(args) => commands::backfill(Context::build(config).await?, args).await?,
        Commands::Progress(args) => commands::progress(&config, args)?,
    }

    Ok(())
}
