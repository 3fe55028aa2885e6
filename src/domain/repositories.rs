//! Repository trait abstractions (C1's typed upsert/query primitives),
//! following the teacher's repository-pattern split between a trait in
//! `domain` and a concrete storage-backed implementation in `infra`
//! (formerly `domain/repositories.rs` + `infrastructure/repositories/`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::StorageError;
use crate::domain::model::{
    Article, ArticleSymbolLink, Candle, ClaimResult, CorporateAction, CrawlState, FiLatestRow,
    FiPointRow, Period, RepairQueueEntry, RepairStatus, Seed, ShardCursor, Statement, Symbol,
    SymbolContext, Timeframe,
};

pub type StorageResult<T> = Result<T, StorageError>;

/// §4.1: canonical candle store + derived snapshot + top-movers.
#[async_trait]
pub trait CandleRepository: Send + Sync {
    async fn upsert_candles(&self, rows: &[Candle]) -> StorageResult<()>;

    async fn query_candles(
        &self,
        ticker: &str,
        tf: Timeframe,
        before_ts_ms: Option<i64>,
        limit: i64,
    ) -> StorageResult<Vec<Candle>>;

    async fn query_latest(&self, tf: Timeframe, limit: i64) -> StorageResult<Vec<Candle>>;

    async fn query_top_movers(&self, tf: Timeframe, limit: i64) -> StorageResult<Vec<TopMover>>;

    /// Newest `ts_ms` present for `(ticker, tf)`, if any bar exists.
    async fn frontier(&self, ticker: &str, tf: Timeframe) -> StorageResult<Option<i64>>;

    async fn upsert_symbol(&self, symbol: &Symbol) -> StorageResult<()>;
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TopMover {
    pub ticker: String,
    pub tf: Timeframe,
    pub ts_latest: i64,
    pub close_latest: f64,
    pub close_prev: Option<f64>,
    pub pct_change: Option<f64>,
}

/// §4.2: per-(job,shard) lease coordination.
#[async_trait]
pub trait LeaseRepository: Send + Sync {
    async fn try_claim(
        &self,
        job: &str,
        shard: i32,
        owner_id: &str,
        lease_ms: i64,
        stale_minutes: i64,
        meta: Option<String>,
        now_ms: i64,
    ) -> StorageResult<ClaimResult>;

    async fn renew(
        &self,
        job: &str,
        shard: i32,
        owner_id: &str,
        lease_ms: i64,
        now_ms: i64,
    ) -> StorageResult<bool>;

    async fn report_progress(
        &self,
        job: &str,
        shard: i32,
        owner_id: &str,
        now_ms: i64,
    ) -> StorageResult<bool>;

    async fn get(&self, job: &str, shard: i32) -> StorageResult<Option<crate::domain::model::Lease>>;
}

/// §4.3: per-(job,shard) resumable cursor, warehouse-backed (authoritative)
/// form. A file-backed cache lives alongside it in `infra::shard_cache`.
#[async_trait]
pub trait CursorRepository: Send + Sync {
    async fn load(&self, job: &str, shard: i32) -> StorageResult<Option<ShardCursor>>;

    async fn save(&self, cursor: &ShardCursor) -> StorageResult<()>;
}

/// §4.7/§4.8: article storage and linking.
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Returns `true` when `url` was newly inserted, `false` when it was
    /// already known (`ON CONFLICT (url) DO NOTHING` is a no-op either
    /// way) so callers can distinguish fresh discoveries from repeats.
    async fn upsert_discovered(
        &self,
        url: &str,
        source: &str,
        title: &str,
        published_at: Option<DateTime<Utc>>,
        feed_url: Option<&str>,
    ) -> StorageResult<bool>;

    async fn mark_fetched(
        &self,
        url: &str,
        text: &str,
        content_sha256: &str,
        word_count: i32,
        lang: Option<&str>,
        fetch_method: &str,
    ) -> StorageResult<()>;

    async fn mark_failed(&self, url: &str, fetch_error: &str) -> StorageResult<()>;

    async fn next_pending(&self, limit: i64) -> StorageResult<Vec<Article>>;

    async fn query_latest(
        &self,
        limit: i64,
        before_published_at: Option<DateTime<Utc>>,
        before_url: Option<&str>,
    ) -> StorageResult<Vec<Article>>;

    async fn query_by_ticker(
        &self,
        ticker: &str,
        limit: i64,
        before_published_at: Option<DateTime<Utc>>,
        before_url: Option<&str>,
    ) -> StorageResult<Vec<Article>>;

    async fn tickers_for(&self, urls: &[String]) -> StorageResult<Vec<ArticleSymbolLink>>;

    async fn upsert_article_symbol(
        &self,
        article_url: &str,
        ticker: &str,
        confidence: f64,
        method: &str,
    ) -> StorageResult<()>;
}

/// §4.7: RSS/category-page discovery crawl state (`feeds`, `seeds`,
/// `crawl_state`) plus a small generic key-value store for process-wide
/// flags like `kv.backfill.done` (§4.7 step 1).
#[async_trait]
pub trait NewsCrawlRepository: Send + Sync {
    async fn list_enabled_seeds(&self) -> StorageResult<Vec<Seed>>;

    async fn get_crawl_state(&self, seed_url: &str) -> StorageResult<Option<CrawlState>>;

    async fn upsert_crawl_state(&self, state: &CrawlState) -> StorageResult<()>;

    /// Marks the seed `done = true` so it is skipped until externally
    /// reset (§3 Feed/Seed/Crawl-state invariant).
    async fn mark_seed_done(&self, seed_url: &str) -> StorageResult<()>;

    async fn touch_feed(
        &self,
        feed_url: &str,
        last_seen_published_at: Option<chrono::DateTime<Utc>>,
    ) -> StorageResult<()>;

    async fn kv_get(&self, key: &str) -> StorageResult<Option<String>>;

    async fn kv_set(&self, key: &str, value: &str) -> StorageResult<()>;
}

/// §4.9: fundamentals point storage.
#[async_trait]
pub trait FundamentalsRepository: Send + Sync {
    async fn upsert_fi_point(&self, row: &FiPointRow) -> StorageResult<()>;

    async fn replace_fi_latest(&self, rows: &[FiLatestRow]) -> StorageResult<()>;

    async fn query_latest(
        &self,
        ticker: &str,
        period: Period,
        statement: Option<Statement>,
        limit: i64,
    ) -> StorageResult<Vec<FiLatestRow>>;

    async fn screener(
        &self,
        metric: &str,
        period: Period,
        statement: Option<Statement>,
        min: Option<f64>,
        max: Option<f64>,
        limit: i64,
    ) -> StorageResult<Vec<FiLatestRow>>;

    async fn last_block_hash(&self, ticker: &str, period: Period) -> StorageResult<Option<String>>;

    async fn set_last_block_hash(
        &self,
        ticker: &str,
        period: Period,
        hash: &str,
    ) -> StorageResult<()>;
}

/// §4.6: gap-detector repair queue.
#[async_trait]
pub trait RepairQueueRepository: Send + Sync {
    async fn enqueue(
        &self,
        ticker: &str,
        tf: Timeframe,
        window_start_ms: i64,
        window_end_ms: i64,
        expected_bars: i32,
    ) -> StorageResult<()>;

    async fn dequeue_batch(&self, limit: i64) -> StorageResult<Vec<RepairQueueEntry>>;

    async fn set_status(
        &self,
        id: i64,
        status: RepairStatus,
        last_error: Option<&str>,
    ) -> StorageResult<()>;

    async fn record_repair(
        &self,
        ticker: &str,
        tf: Timeframe,
        window_start_ms: i64,
        window_end_ms: i64,
        missing_count: i32,
    ) -> StorageResult<()>;

    async fn queue_depth(&self, status: RepairStatus) -> StorageResult<i64>;
}

/// §6: corporate actions keyset reads.
#[async_trait]
pub trait CorporateActionRepository: Send + Sync {
    async fn insert(&self, action: &CorporateAction) -> StorageResult<i64>;

    async fn query_latest(
        &self,
        limit: i64,
        before_ex_date: Option<chrono::NaiveDate>,
        before_id: Option<i64>,
    ) -> StorageResult<Vec<CorporateAction>>;

    async fn query_by_ticker(
        &self,
        ticker: &str,
        limit: i64,
        before_ex_date: Option<chrono::NaiveDate>,
        before_id: Option<i64>,
    ) -> StorageResult<Vec<CorporateAction>>;
}

/// §4.1 `rebuild_context_latest` + §4.11 derived summary-table rebuild (C11).
/// Every method here is a full rebuild of its target group, run inside one
/// transaction, so a partial failure never leaves a half-updated table.
#[async_trait]
pub trait DerivedRepository: Send + Sync {
    /// Recomputes `symbol_context_latest` (candle/article counts and
    /// recency markers) for every known symbol.
    async fn rebuild_context_latest(&self, now: DateTime<Utc>) -> StorageResult<i64>;

    /// Recomputes `market_stats` KPI rows: candle coverage, per-tf
    /// rows/tickers, and per-(ticker,tf) frontier lag (§4.11).
    async fn rebuild_market_stats(&self, now: DateTime<Utc>) -> StorageResult<MarketStatsSummary>;

    /// Reads back the last rebuild's `market_stats` row (SPEC_FULL.md §11,
    /// `/v1/overall/health` and `/v1/analytics/overview`). `None` before the
    /// first sync pass has ever run.
    async fn get_market_stats(&self) -> StorageResult<Option<MarketStatsSummary>>;

    /// Reads one ticker's `symbol_context_latest` row (SPEC_FULL.md §11,
    /// `/v1/context/:ticker`).
    async fn get_context(&self, ticker: &str) -> StorageResult<Option<SymbolContext>>;
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MarketStatsSummary {
    pub candles_eligible_total: i64,
    pub candles_with_candles: i64,
    pub candles_missing: i64,
    pub candles_coverage_pct: f64,
    pub per_tf_rows: Vec<TfCoverage>,
    pub frontier_lag_ms: Option<i64>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TfCoverage {
    pub tf: Timeframe,
    pub rows: i64,
    pub tickers: i64,
}
