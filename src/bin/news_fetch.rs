//! News fetch entrypoint (C7 steps 2-3).

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::prelude::*;

use vnhub::application::news_fetch::NewsFetcher;
use vnhub::config::{NewsConfig, WarehouseConfig};
use vnhub::infra::persistence::Database;
use vnhub::infra::repositories::PgArticleRepository;
use vnhub::infra::source_client::SourceClient;

#[derive(Parser, Debug)]
struct Cli {
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
    let config = NewsConfig::from_env()?;
    let warehouse_cfg = WarehouseConfig::from_env()?;
    let db = Database::new(&warehouse_cfg).await?;

    let client = SourceClient::new(config.user_agent.clone());
    let articles = Arc::new(PgArticleRepository::new(db.pool.clone()));
    let fetcher = NewsFetcher::new(config, client, articles);

    if cli.dry_run {
        info!("dry-run: skipping run");
        return Ok(());
    }

    match fetcher.run().await {
        Ok(summary) => {
            info!(?summary, "news fetch run complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "news fetch run failed");
            std::process::exit(1);
        }
    }
}
