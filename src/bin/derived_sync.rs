//! Derived surfaces sync entrypoint (C11).

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::prelude::*;

use vnhub::application::derived_sync::DerivedSyncWorker;
use vnhub::config::{DerivedSyncConfig, WarehouseConfig};
use vnhub::infra::persistence::Database;
use vnhub::infra::repositories::PgDerivedRepository;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value_t = false)]
    once: bool,
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
    let config = DerivedSyncConfig::from_env()?;
    let warehouse_cfg = WarehouseConfig::from_env()?;
    let db = Database::new(&warehouse_cfg).await?;

    if cli.dry_run {
        info!("dry-run: skipping run");
        return Ok(());
    }

    let repo = Arc::new(PgDerivedRepository::new(db.pool.clone()));
    let worker = DerivedSyncWorker::new(config, repo);

    if cli.once {
        match worker.run_once().await {
            Ok(result) => {
                info!(
                    context_rows = result.context_rows,
                    coverage_pct = result.market_stats.candles_coverage_pct,
                    "derived sync run complete"
                );
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "derived sync run failed");
                std::process::exit(1);
            }
        }
    } else {
        let (_tx, rx) = tokio::sync::watch::channel(false);
        worker.run_forever(rx).await;
        Ok(())
    }
}
