//! Fundamentals ingest entrypoint (C9).

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::prelude::*;

use vnhub::application::fundamentals_ingest::FundamentalsIngestWorker;
use vnhub::config::{FundamentalsConfig, WarehouseConfig};
use vnhub::infra::persistence::Database;
use vnhub::infra::repositories::{load_universe_from_symbols, PgFundamentalsRepository};
use vnhub::infra::source_client::SourceClient;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long)]
    tickers: Option<String>,
    #[arg(long)]
    token: Option<String>,
    #[arg(long = "no-fallback-to-q", default_value_t = false)]
    no_fallback_to_q: bool,
    #[arg(long = "out-dir")]
    out_dir: Option<String>,
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
    let mut config = FundamentalsConfig::from_env()?;
    if let Some(token) = cli.token {
        config.bearer_token = Some(token);
    }
    if cli.no_fallback_to_q {
        config.no_fallback_to_q = true;
    }
    if let Some(out_dir) = cli.out_dir {
        config.out_dir = out_dir;
    }

    let warehouse_cfg = WarehouseConfig::from_env()?;
    let db = Database::new(&warehouse_cfg).await?;

    let tickers = match cli.tickers {
        Some(raw) => raw.split(',').map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty()).collect(),
        None => load_universe_from_symbols(&db.pool, Some("active = true")).await?,
    };

    let client = SourceClient::new("vnhub-fundamentals-ingest/1.0");
    let worker = FundamentalsIngestWorker::new(
        config,
        client,
        Arc::new(PgFundamentalsRepository::new(db.pool.clone())),
    );

    if cli.dry_run {
        info!(tickers = tickers.len(), "dry-run: skipping run");
        return Ok(());
    }

    match worker.run(&tickers).await {
        Ok(summary) => {
            info!(
                processed = summary.tickers_processed,
                changed = summary.blocks_changed,
                errors = summary.errors.len(),
                "fundamentals ingest run complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "fundamentals ingest run failed");
            std::process::exit(1);
        }
    }
}
