//! Canonical entities of the warehouse (spec.md §3).
//!
//! All timestamps in the hot path (`Candle`, `CandleSnapshot`, leases,
//! cursors) are unsigned-range unix-milliseconds stored as `i64` (Postgres
//! has no native `u64`); everything else is `chrono::DateTime<Utc>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `{15m, 1h, 1d}` candle granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M15,
    H1,
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::M15, Timeframe::H1, Timeframe::D1];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::D1 => "1d",
        }
    }

    /// Grid alignment in minutes: candle `ts_ms` must be a multiple of this,
    /// measured in milliseconds.
    pub fn grid_minutes(&self) -> i64 {
        match self {
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
            Timeframe::D1 => 1440,
        }
    }

    pub fn grid_ms(&self) -> i64 {
        self.grid_minutes() * 60_000
    }
}

impl std::str::FromStr for Timeframe {
    type Err = crate::domain::errors::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "15m" => Ok(Timeframe::M15),
            "1h" => Ok(Timeframe::H1),
            "1d" => Ok(Timeframe::D1),
            other => Err(crate::domain::errors::ValidationError::InvalidTimeframe {
                tf: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reporting period for fundamentals: quarterly or yearly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    Q,
    Y,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Q => "Q",
            Period::Y => "Y",
        }
    }
}

impl std::str::FromStr for Period {
    type Err = crate::domain::errors::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Q" => Ok(Period::Q),
            "Y" => Ok(Period::Y),
            other => Err(crate::domain::errors::ValidationError::InvalidTimeframe {
                tf: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One of the five financial-statement families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statement {
    Is,
    Bs,
    Cf,
    Ratio,
    Kpi,
}

impl Statement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Statement::Is => "is",
            Statement::Bs => "bs",
            Statement::Cf => "cf",
            Statement::Ratio => "ratio",
            Statement::Kpi => "kpi",
        }
    }
}

impl std::str::FromStr for Statement {
    type Err = crate::domain::errors::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "is" => Ok(Statement::Is),
            "bs" => Ok(Statement::Bs),
            "cf" => Ok(Statement::Cf),
            "ratio" => Ok(Statement::Ratio),
            "kpi" => Ok(Statement::Kpi),
            other => Err(crate::domain::errors::ValidationError::InvalidTimeframe {
                tf: other.to_string(),
            }),
        }
    }
}

/// Tradable instrument. Created on first sighting from any source; never
/// deleted while referenced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub ticker: String,
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub active: Option<bool>,
    pub updated_at_ms: Option<i64>,
}

/// One OHLCV bar. Primary key `(ticker, tf, ts_ms)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub ticker: String,
    pub tf: Timeframe,
    pub ts_ms: i64,
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: Option<f64>,
    pub source: Option<String>,
    pub ingested_at: Option<DateTime<Utc>>,
}

impl Candle {
    /// `l <= min(o,c) <= max(o,c) <= h`, and `ts_ms` lands on the tf grid.
    pub fn is_valid(&self) -> bool {
        let lo = self.o.min(self.c);
        let hi = self.o.max(self.c);
        if !(self.l <= lo && lo <= hi && hi <= self.h) {
            return false;
        }
        self.ts_ms >= 0 && self.ts_ms % self.tf.grid_ms() == 0
    }
}

/// A lease row: mutual exclusion on `(job, shard)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub job: String,
    pub shard: i32,
    pub owner_id: String,
    pub lease_until_ms: i64,
    pub last_progress_ms: i64,
    pub meta: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a `try_claim`/`renew`/`report_progress` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "ok")]
pub enum ClaimResult {
    #[serde(rename = "true")]
    Ok,
    #[serde(rename = "false")]
    Denied {
        owner_id: String,
        lease_until_ms: i64,
        last_progress_ms: i64,
        reason: DenialReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    Held,
    Missing,
}

/// Per-(job,shard) resumable pointer into the shard's ticker list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardCursor {
    pub job: String,
    pub shard: i32,
    pub next_index: i64,
    pub last_batch: Option<Vec<String>>,
    pub batch_size: i64,
    pub universe_count: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Pending,
    Fetched,
    Failed,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Pending => "pending",
            FetchStatus::Fetched => "fetched",
            FetchStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for FetchStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FetchStatus::Pending),
            "fetched" => Ok(FetchStatus::Fetched),
            "failed" => Ok(FetchStatus::Failed),
            other => anyhow::bail!("invalid fetch_status: {other}"),
        }
    }
}

/// A discovered/fetched news article. `url` is the primary key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub canonical_url: Option<String>,
    pub source: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub content_sha256: Option<String>,
    pub word_count: Option<i32>,
    pub lang: Option<String>,
    pub fetch_status: FetchStatus,
    pub fetch_method: Option<String>,
    pub fetch_error: Option<String>,
    pub ingested_at: DateTime<Utc>,
    pub discovered_at: DateTime<Utc>,
}

/// `(article_url, ticker)` link with a monotonically non-decreasing
/// confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleSymbolLink {
    pub article_url: String,
    pub ticker: String,
    pub confidence: f64,
    pub method: String,
}

/// Latest-by-metric fundamentals row. pk `(ticker, period, statement, metric)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiLatestRow {
    pub ticker: String,
    pub period: Period,
    pub statement: Statement,
    pub period_date: Option<chrono::NaiveDate>,
    pub metric: String,
    pub value: Option<f64>,
    pub fetched_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

/// Historical fundamentals point. pk `(ticker, period, statement, period_date, metric)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiPointRow {
    pub ticker: String,
    pub period: Period,
    pub statement: Statement,
    pub period_date: chrono::NaiveDate,
    pub period_date_name: Option<String>,
    pub metric: String,
    pub value: Option<f64>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorporateAction {
    pub id: i64,
    pub ticker: String,
    pub exchange: Option<String>,
    pub ex_date: Option<chrono::NaiveDate>,
    pub record_date: Option<chrono::NaiveDate>,
    pub pay_date: Option<chrono::NaiveDate>,
    pub event_type: Option<String>,
    pub headline: Option<String>,
    pub source: String,
    pub source_url: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl RepairStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairStatus::Queued => "queued",
            RepairStatus::Running => "running",
            RepairStatus::Done => "done",
            RepairStatus::Error => "error",
        }
    }
}

/// A gap-detector-emitted repair job. Deduplicated by
/// `(ticker, tf, window_start_ms, window_end_ms)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairQueueEntry {
    pub id: i64,
    pub ticker: String,
    pub tf: Timeframe,
    pub window_start_ms: i64,
    pub window_end_ms: i64,
    pub expected_bars: i32,
    pub status: RepairStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// RSS feed crawl checkpoint. pk `feed_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub feed_url: String,
    pub last_seen_published_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Category-listing seed for pagination-based discovery. pk `seed_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seed {
    pub seed_url: String,
    pub channel_id: Option<String>,
    pub enabled: bool,
}

/// Per-seed pagination progress. pk `seed_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlState {
    pub seed_url: String,
    pub next_page: i32,
    pub done: bool,
    pub no_new_pages_count: i32,
    pub oldest_seen_published_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// `symbol_context_latest` row (SPEC_FULL.md §11, `/v1/context/:ticker`):
/// candle/article counts and recency markers for one ticker, rebuilt by
/// `DerivedRepository::rebuild_context_latest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolContext {
    pub ticker: String,
    pub candle_count: i64,
    pub article_count: i64,
    pub last_candle_ts: Option<i64>,
    pub last_article_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candle_invariant_rejects_low_above_open_close() {
        let c = Candle {
            ticker: "FPT".into(),
            tf: Timeframe::D1,
            ts_ms: 1_440 * 60_000,
            o: 10.0,
            h: 12.0,
            l: 11.0, // invalid: l > min(o,c)
            c: 11.5,
            v: None,
            source: None,
            ingested_at: None,
        };
        assert!(!c.is_valid());
    }

    #[test]
    fn candle_invariant_rejects_misaligned_ts() {
        let c = Candle {
            ticker: "FPT".into(),
            tf: Timeframe::D1,
            ts_ms: 1_440 * 60_000 + 1,
            o: 10.0,
            h: 12.0,
            l: 9.0,
            c: 11.0,
            v: None,
            source: None,
            ingested_at: None,
        };
        assert!(!c.is_valid());
    }

    #[test]
    fn candle_invariant_accepts_well_formed_bar() {
        let c = Candle {
            ticker: "FPT".into(),
            tf: Timeframe::M15,
            ts_ms: 15 * 60_000 * 100,
            o: 10.0,
            h: 10.5,
            l: 9.8,
            c: 10.2,
            v: Some(1000.0),
            source: Some("ssi".into()),
            ingested_at: None,
        };
        assert!(c.is_valid());
    }

    #[test]
    fn timeframe_roundtrips_through_str() {
        for tf in Timeframe::ALL {
            let parsed: Timeframe = tf.as_str().parse().unwrap();
            assert_eq!(parsed, tf);
        }
    }
}
