//! PostgreSQL-backed `DerivedRepository` (C11). Both rebuilds are
//! delete-then-insert inside one transaction (§4.11: "MUST be idempotent -
//! full rebuild or delete-then-insert per group").

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::errors::StorageError;
use crate::domain::model::{SymbolContext, Timeframe};
use crate::domain::repositories::{DerivedRepository, MarketStatsSummary, StorageResult, TfCoverage};

/// Recency window for `symbol_context_latest` counts (§4.1: "over a
/// recent window").
const CONTEXT_WINDOW_DAYS: i64 = 30;

pub struct PgDerivedRepository {
    pool: PgPool,
}

impl PgDerivedRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_storage_err(e: sqlx::Error) -> StorageError {
    StorageError::Transient(e.to_string())
}

#[async_trait]
impl DerivedRepository for PgDerivedRepository {
    async fn rebuild_context_latest(&self, now: DateTime<Utc>) -> StorageResult<i64> {
        let window_start_ms = now.timestamp_millis() - CONTEXT_WINDOW_DAYS * 24 * 3_600_000;

        let mut tx = self.pool.begin().await.map_err(to_storage_err)?;

        sqlx::query("DELETE FROM symbol_context_latest")
            .execute(&mut *tx)
            .await
            .map_err(to_storage_err)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO symbol_context_latest
                (ticker, candle_count, article_count, last_candle_ts, last_article_at, updated_at)
            SELECT
                s.ticker,
                COALESCE(cc.candle_count, 0),
                COALESCE(ac.article_count, 0),
                cc.last_candle_ts,
                ac.last_article_at,
                $2
            FROM symbols s
            LEFT JOIN (
                SELECT ticker, count(*) AS candle_count, max(ts) AS last_candle_ts
                FROM candles
                WHERE ts >= $1
                GROUP BY ticker
            ) cc ON cc.ticker = s.ticker
            LEFT JOIN (
                SELECT a.ticker, count(*) AS article_count, max(art.published_at) AS last_article_at
                FROM article_symbols a
                JOIN articles art ON art.url = a.article_url
                WHERE art.published_at >= $2 - (make_interval(days => $3))
                GROUP BY a.ticker
            ) ac ON ac.ticker = s.ticker
            "#,
        )
        .bind(window_start_ms)
        .bind(now)
        .bind(CONTEXT_WINDOW_DAYS as f64)
        .execute(&mut *tx)
        .await
        .map_err(to_storage_err)?;

        tx.commit().await.map_err(to_storage_err)?;
        Ok(inserted.rows_affected() as i64)
    }

    async fn rebuild_market_stats(&self, now: DateTime<Utc>) -> StorageResult<MarketStatsSummary> {
        let eligible_total: i64 = sqlx::query("SELECT count(*) AS n FROM symbols")
            .fetch_one(&self.pool)
            .await
            .map_err(to_storage_err)?
            .get("n");

        let with_candles: i64 = sqlx::query(
            "SELECT count(DISTINCT ticker) AS n FROM candles_latest WHERE ticker IN (SELECT ticker FROM symbols)",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(to_storage_err)?
        .get("n");

        let missing = (eligible_total - with_candles).max(0);
        let coverage_pct = if eligible_total > 0 {
            with_candles as f64 / eligible_total as f64 * 100.0
        } else {
            0.0
        };

        let mut per_tf_rows = Vec::with_capacity(Timeframe::ALL.len());
        let mut newest_ts: Option<i64> = None;
        for tf in Timeframe::ALL {
            let row = sqlx::query(
                "SELECT count(*) AS rows, count(DISTINCT ticker) AS tickers, max(ts) AS newest FROM candles_latest WHERE tf = $1",
            )
            .bind(tf.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(to_storage_err)?;
            per_tf_rows.push(TfCoverage {
                tf,
                rows: row.get("rows"),
                tickers: row.get("tickers"),
            });
            if let Some(ts) = row.get::<Option<i64>, _>("newest") {
                newest_ts = Some(newest_ts.map_or(ts, |n: i64| n.max(ts)));
            }
        }

        let frontier_lag_ms = newest_ts.map(|ts| (now.timestamp_millis() - ts).max(0));

        let summary = MarketStatsSummary {
            candles_eligible_total: eligible_total,
            candles_with_candles: with_candles,
            candles_missing: missing,
            candles_coverage_pct: coverage_pct,
            per_tf_rows,
            frontier_lag_ms,
        };

        let value_json = serde_json::to_value(&summary).expect("MarketStatsSummary always serializes");
        sqlx::query(
            r#"
            INSERT INTO market_stats (key, value_json, updated_at)
            VALUES ('latest', $1, $2)
            ON CONFLICT (key) DO UPDATE SET value_json = EXCLUDED.value_json, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&value_json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;

        Ok(summary)
    }

    async fn get_market_stats(&self) -> StorageResult<Option<MarketStatsSummary>> {
        let row = sqlx::query("SELECT value_json FROM market_stats WHERE key = 'latest'")
            .fetch_optional(&self.pool)
            .await
            .map_err(to_storage_err)?;

        row.map(|r| {
            serde_json::from_value(r.get("value_json"))
                .map_err(|e| StorageError::Transient(format!("corrupt market_stats row: {e}")))
        })
        .transpose()
    }

    async fn get_context(&self, ticker: &str) -> StorageResult<Option<SymbolContext>> {
        let row = sqlx::query(
            "SELECT ticker, candle_count, article_count, last_candle_ts, last_article_at, updated_at \
             FROM symbol_context_latest WHERE ticker = $1",
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await
        .map_err(to_storage_err)?;

        Ok(row.map(|r| SymbolContext {
            ticker: r.get("ticker"),
            candle_count: r.get("candle_count"),
            article_count: r.get("article_count"),
            last_candle_ts: r.get("last_candle_ts"),
            last_article_at: r.get("last_article_at"),
            updated_at: r.get("updated_at"),
        }))
    }
}
