//! Candle ingest worker entrypoint (C5). Claims its shard's lease, walks
//! the configured ticker batch forward through the candle source, and
//! exits `0` on success or benign skip, `1` on unexpected failure.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::prelude::*;

use vnhub::application::candle_ingest::CandleIngestWorker;
use vnhub::application::candle_source::HttpCandleSource;
use vnhub::config::{CandleIngestConfig, WarehouseConfig};
use vnhub::infra::persistence::Database;
use vnhub::infra::repositories::{PgCandleRepository, PgCursorRepository, PgLeaseRepository};
use vnhub::infra::source_client::SourceClient;

/// CLI flags override environment configuration (spec.md §6:
/// "Configuration via CLI flags takes precedence over environment").
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long)]
    tickers: Option<String>,
    #[arg(long = "size")]
    batch_size: Option<i64>,
    #[arg(long = "time-budget-sec")]
    time_budget_sec: Option<u64>,
    #[arg(long = "heartbeat-sec")]
    heartbeat_sec: Option<u64>,
    #[arg(long = "cursor-file")]
    cursor_file: Option<String>,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let mut config = CandleIngestConfig::from_env()?;
    if let Some(size) = cli.batch_size {
        config.batch_size = size;
    }
    if let Some(secs) = cli.time_budget_sec {
        config.run_timeout_sec = secs;
    }

    let warehouse_cfg = WarehouseConfig::from_env()?;
    let db = Database::new(&warehouse_cfg).await?;

    let client = SourceClient::new("vnhub-candle-ingest/1.0");
    let source = Arc::new(HttpCandleSource::new(
        client,
        config.source_base_url.clone(),
        config.source_bearer_token.clone(),
        "candle-ingest",
    ));

    let worker = CandleIngestWorker {
        config,
        pool: db.pool.clone(),
        lease_repo: Arc::new(PgLeaseRepository::new(db.pool.clone())),
        cursor_repo: Arc::new(PgCursorRepository::new(db.pool.clone())),
        candle_repo: Arc::new(PgCandleRepository::new(db.pool.clone())),
        source,
    };

    if cli.dry_run {
        info!("dry-run: skipping run");
        return Ok(());
    }

    match worker.run().await {
        Ok(summary) => {
            info!(?summary, "candle ingest run complete");
            if summary.status == "error" {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "candle ingest run failed");
            std::process::exit(1);
        }
    }
}
