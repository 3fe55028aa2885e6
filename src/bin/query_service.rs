//! History query service entrypoint (C10, §4.10).

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::prelude::*;

use vnhub::config::{QueryServiceConfig, WarehouseConfig};
use vnhub::infra::persistence::Database;
use vnhub::infra::repositories::{
    PgArticleRepository, PgCandleRepository, PgCorporateActionRepository, PgDerivedRepository,
    PgFundamentalsRepository, PgRepairQueueRepository,
};
use vnhub::interfaces::{router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = QueryServiceConfig::from_env()?;
    let mut warehouse_cfg = WarehouseConfig::from_env()?;
    warehouse_cfg.max_connections = warehouse_cfg.max_connections.min(config.max_pool_connections);

    let db = Database::new(&warehouse_cfg).await?;

    let state = AppState {
        pool: db.pool.clone(),
        api_key: Arc::from(config.api_key.as_str()),
        candles: Arc::new(PgCandleRepository::new(db.pool.clone())),
        articles: Arc::new(PgArticleRepository::new(db.pool.clone())),
        fundamentals: Arc::new(PgFundamentalsRepository::new(db.pool.clone())),
        corporate_actions: Arc::new(PgCorporateActionRepository::new(db.pool.clone())),
        derived: Arc::new(PgDerivedRepository::new(db.pool.clone())),
        repair_queue: Arc::new(PgRepairQueueRepository::new(db.pool.clone())),
    };

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "query service listening");
    axum::serve(listener, app).await?;

    Ok(())
}
