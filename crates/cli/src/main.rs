use crate::commands::Commands;
use crate::error::CliError;
use clap::Parser;
use connectors::duck::store::AnalyticsStore;
use connectors::duck::views::{create_traffic_view, TrafficViewParams};
use connectors::sql::source::PgChunkSource;
use etl_config::settings::Settings;
use etl_core::state::json_store::JsonStateStore;
use etl_runtime::executor::{EtlExecutor, ExecutorOptions};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "storeflow",
    version = "0.1.0",
    about = "Store traffic analytics ETL"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config_dir,
            workers,
            no_cache_clear,
            api_url,
        } => {
            let mut settings = Settings::load(Path::new(&config_dir))?;
            if let Some(url) = api_url {
                settings.api_url = url;
            }
            run_batch(settings, workers, !no_cache_clear).await?;
        }
        Commands::Init { config_dir } => {
            let settings = Settings::load(Path::new(&config_dir))?;
            let store = AnalyticsStore::open(settings.duckdb_path())?;
            create_traffic_view(
                &store,
                TrafficViewParams {
                    outlier_threshold: settings.outlier_threshold,
                    outlier_scale_ratio: settings.outlier_scale_ratio,
                    working_hour_start: settings.working_hour_start,
                },
            )
            .await?;
            info!("analytical store views initialized");
        }
    }

    Ok(())
}

async fn run_batch(
    settings: Settings,
    workers: Option<usize>,
    invalidate_cache: bool,
) -> Result<(), CliError> {
    let dsn = settings.require_source_dsn()?.to_string();
    let store = AnalyticsStore::open(settings.duckdb_path())?;
    let state = Arc::new(JsonStateStore::open(settings.state_file()));
    let source = Arc::new(PgChunkSource::new(dsn));

    let cancel = CancellationToken::new();
    shutdown::register_handlers(cancel.clone());

    let executor = EtlExecutor::new(Arc::new(settings), source, store, state, cancel);
    let summary = executor
        .run(ExecutorOptions {
            workers,
            invalidate_cache,
        })
        .await;

    // Per-table failures are reported, not fatal: the batch is expected
    // to partially complete.
    output::print_summary(&summary);
    Ok(())
}
