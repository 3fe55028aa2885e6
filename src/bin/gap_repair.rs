//! Gap detector + repair worker entrypoint (C6).

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::prelude::*;

use vnhub::application::candle_source::HttpCandleSource;
use vnhub::application::gap_detector::{GapDetector, GapRepairRun, RepairWorker};
use vnhub::config::{GapRepairConfig, WarehouseConfig};
use vnhub::infra::persistence::Database;
use vnhub::infra::repositories::{PgCandleRepository, PgLeaseRepository, PgRepairQueueRepository};
use vnhub::infra::source_client::SourceClient;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long = "time-budget-sec")]
    time_budget_sec: Option<u64>,
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
    let mut config = GapRepairConfig::from_env()?;
    if let Some(secs) = cli.time_budget_sec {
        config.run_timeout_sec = secs;
    }

    let warehouse_cfg = WarehouseConfig::from_env()?;
    let db = Database::new(&warehouse_cfg).await?;

    let client = SourceClient::new("vnhub-gap-repair/1.0");
    let source = Arc::new(HttpCandleSource::new(
        client,
        config.source_base_url.clone(),
        config.source_bearer_token.clone(),
        "gap-repair",
    ));

    let candle_repo = Arc::new(PgCandleRepository::new(db.pool.clone()));
    let repair_queue = Arc::new(PgRepairQueueRepository::new(db.pool.clone()));

    if cli.dry_run {
        info!("dry-run: skipping run");
        return Ok(());
    }

    let run = GapRepairRun {
        config,
        pool: db.pool.clone(),
        lease_repo: Arc::new(PgLeaseRepository::new(db.pool.clone())),
        detector: GapDetector { candle_repo: candle_repo.clone(), repair_queue: repair_queue.clone() },
        repair_worker: RepairWorker { repair_queue, candle_repo, source },
    };

    match run.run().await {
        Ok(summary) => {
            info!(?summary, "gap repair run complete");
            if summary.status == "error" {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "gap repair run failed");
            std::process::exit(1);
        }
    }
}
