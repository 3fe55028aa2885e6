//! Postgres-backed implementations of the `domain::repositories` traits.

mod article_repository;
mod candle_repository;
mod corporate_action_repository;
mod cursor_repository;
mod derived_repository;
mod fundamentals_repository;
mod lease_repository;
mod news_crawl_repository;
mod repair_queue_repository;

pub use article_repository::PgArticleRepository;
pub use candle_repository::PgCandleRepository;
pub use corporate_action_repository::PgCorporateActionRepository;
pub use cursor_repository::PgCursorRepository;
pub use derived_repository::PgDerivedRepository;
pub use fundamentals_repository::PgFundamentalsRepository;
pub use lease_repository::PgLeaseRepository;
pub use news_crawl_repository::PgNewsCrawlRepository;
pub use repair_queue_repository::PgRepairQueueRepository;

use sqlx::{postgres::PgPool, Row};

use crate::infra::shard_cache::normalize_universe;

/// Loads the ticker universe from the warehouse `symbols` table (§4.3's
/// "(b) a SQL query against the warehouse symbols table with an optional
/// filter clause" form). `filter_clause` is appended verbatim after
/// `WHERE` when given (e.g. `"active = true"`) - callers are trusted
/// configuration, not end-user input. Run through the same
/// `normalize_universe` pass as the file-loading path (§4.3: "universe is
/// case-normalized, deduplicated, and sorted" for both forms).
pub async fn load_universe_from_symbols(
    pool: &PgPool,
    filter_clause: Option<&str>,
) -> anyhow::Result<Vec<String>> {
    let sql = match filter_clause {
        Some(clause) => format!("SELECT ticker FROM symbols WHERE {clause}"),
        None => "SELECT ticker FROM symbols".to_string(),
    };
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    let raw: Vec<String> = rows.into_iter().map(|r| r.get::<String, _>("ticker")).collect();
    Ok(normalize_universe(raw))
}
