//! Shared handler state (C10): one `Arc<dyn Repository>` per domain
//! concern, plus the configured API key, cloned cheaply into every axum
//! handler via `State<AppState>`.

use std::sync::Arc;

use sqlx::postgres::PgPool;

use crate::domain::repositories::{
    ArticleRepository, CandleRepository, CorporateActionRepository, DerivedRepository,
    FundamentalsRepository, RepairQueueRepository,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub api_key: Arc<str>,
    pub candles: Arc<dyn CandleRepository>,
    pub articles: Arc<dyn ArticleRepository>,
    pub fundamentals: Arc<dyn FundamentalsRepository>,
    pub corporate_actions: Arc<dyn CorporateActionRepository>,
    pub derived: Arc<dyn DerivedRepository>,
    pub repair_queue: Arc<dyn RepairQueueRepository>,
}
