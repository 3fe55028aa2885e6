//! PostgreSQL-backed `CandleRepository` (C1). Candle upserts and the
//! `candles_latest` snapshot are maintained synchronously in the same
//! transaction (§4.1: "implemented either by synchronous maintenance
//! within the same transaction or by an equivalent trigger" - this chooses
//! the transaction form so it needs no DB-side trigger deployment step).

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::errors::StorageError;
use crate::domain::model::{Candle, Symbol, Timeframe};
use crate::domain::repositories::{CandleRepository, StorageResult, TopMover};

pub struct PgCandleRepository {
    pool: PgPool,
}

impl PgCandleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_storage_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_check_violation() || db.is_foreign_key_violation() => {
            StorageError::Integrity(e.to_string())
        }
        _ => StorageError::Transient(e.to_string()),
    }
}

#[async_trait]
impl CandleRepository for PgCandleRepository {
    async fn upsert_candles(&self, rows: &[Candle]) -> StorageResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        for row in rows {
            if !row.is_valid() {
                return Err(StorageError::Integrity(format!(
                    "invalid candle {}/{}/{}: ohlc or grid-alignment violation",
                    row.ticker, row.tf, row.ts_ms
                )));
            }
        }

        let mut tx = self.pool.begin().await.map_err(to_storage_err)?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO candles (ticker, tf, ts, o, h, l, c, v, source, ingested_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
                ON CONFLICT (ticker, tf, ts) DO UPDATE SET
                    o = EXCLUDED.o,
                    h = EXCLUDED.h,
                    l = EXCLUDED.l,
                    c = EXCLUDED.c,
                    v = EXCLUDED.v,
                    source = EXCLUDED.source,
                    ingested_at = EXCLUDED.ingested_at
                "#,
            )
            .bind(&row.ticker)
            .bind(row.tf.as_str())
            .bind(row.ts_ms)
            .bind(row.o)
            .bind(row.h)
            .bind(row.l)
            .bind(row.c)
            .bind(row.v)
            .bind(&row.source)
            .execute(&mut *tx)
            .await
            .map_err(to_storage_err)?;

            // Snapshot maintenance: replace iff the new bar is not older
            // than whatever is currently snapshotted (§8 invariant:
            // candles_latest.ts_ms >= any candle's ts_ms for that pair).
            sqlx::query(
                r#"
                INSERT INTO candles_latest (ticker, tf, ts, o, h, l, c, v, source, ingested_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
                ON CONFLICT (ticker, tf) DO UPDATE SET
                    ts = EXCLUDED.ts,
                    o = EXCLUDED.o,
                    h = EXCLUDED.h,
                    l = EXCLUDED.l,
                    c = EXCLUDED.c,
                    v = EXCLUDED.v,
                    source = EXCLUDED.source,
                    ingested_at = EXCLUDED.ingested_at
                WHERE EXCLUDED.ts >= candles_latest.ts
                "#,
            )
            .bind(&row.ticker)
            .bind(row.tf.as_str())
            .bind(row.ts_ms)
            .bind(row.o)
            .bind(row.h)
            .bind(row.l)
            .bind(row.c)
            .bind(row.v)
            .bind(&row.source)
            .execute(&mut *tx)
            .await
            .map_err(to_storage_err)?;
        }

        tx.commit().await.map_err(to_storage_err)?;
        Ok(())
    }

    async fn query_candles(
        &self,
        ticker: &str,
        tf: Timeframe,
        before_ts_ms: Option<i64>,
        limit: i64,
    ) -> StorageResult<Vec<Candle>> {
        let rows = match before_ts_ms {
            Some(before) => sqlx::query(
                r#"
                SELECT ticker, tf, ts, o, h, l, c, v, source, ingested_at
                FROM candles
                WHERE ticker = $1 AND tf = $2 AND ts < $3
                ORDER BY ts DESC
                LIMIT $4
                "#,
            )
            .bind(ticker)
            .bind(tf.as_str())
            .bind(before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(to_storage_err)?,
            None => sqlx::query(
                r#"
                SELECT ticker, tf, ts, o, h, l, c, v, source, ingested_at
                FROM candles
                WHERE ticker = $1 AND tf = $2
                ORDER BY ts DESC
                LIMIT $3
                "#,
            )
            .bind(ticker)
            .bind(tf.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(to_storage_err)?,
        };

        rows.into_iter().map(row_to_candle).collect()
    }

    async fn query_latest(&self, tf: Timeframe, limit: i64) -> StorageResult<Vec<Candle>> {
        let rows = sqlx::query(
            r#"
            SELECT ticker, tf, ts, o, h, l, c, v, source, ingested_at
            FROM candles_latest
            WHERE tf = $1
            ORDER BY ticker ASC
            LIMIT $2
            "#,
        )
        .bind(tf.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(to_storage_err)?;

        rows.into_iter().map(row_to_candle).collect()
    }

    async fn query_top_movers(&self, tf: Timeframe, limit: i64) -> StorageResult<Vec<TopMover>> {
        // For each snapshot row, join the previous bar for that ticker/tf
        // (ts < snapshot.ts, newest first, first row) and compute pct change.
        let rows = sqlx::query(
            r#"
            SELECT
                s.ticker,
                s.ts AS ts_latest,
                s.c AS close_latest,
                prev.c AS close_prev
            FROM candles_latest s
            LEFT JOIN LATERAL (
                SELECT c FROM candles
                WHERE ticker = s.ticker AND tf = s.tf AND ts < s.ts
                ORDER BY ts DESC
                LIMIT 1
            ) prev ON TRUE
            WHERE s.tf = $1
            ORDER BY
                CASE WHEN prev.c IS NULL OR prev.c = 0 THEN 1 ELSE 0 END,
                (s.c - prev.c) / NULLIF(prev.c, 0) DESC
            LIMIT $2
            "#,
        )
        .bind(tf.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(to_storage_err)?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let close_latest: f64 = r.get("close_latest");
                let close_prev: Option<f64> = r.get("close_prev");
                let pct_change = close_prev
                    .filter(|p| *p != 0.0)
                    .map(|p| (close_latest - p) / p);
                TopMover {
                    ticker: r.get("ticker"),
                    tf,
                    ts_latest: r.get("ts_latest"),
                    close_latest,
                    close_prev,
                    pct_change,
                }
            })
            .collect())
    }

    async fn frontier(&self, ticker: &str, tf: Timeframe) -> StorageResult<Option<i64>> {
        let row = sqlx::query("SELECT ts FROM candles_latest WHERE ticker = $1 AND tf = $2")
            .bind(ticker)
            .bind(tf.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(to_storage_err)?;
        Ok(row.map(|r| r.get::<i64, _>("ts")))
    }

    async fn upsert_symbol(&self, symbol: &Symbol) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO symbols (ticker, name, exchange, active, updated_at_ms)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (ticker) DO UPDATE SET
                name = COALESCE(EXCLUDED.name, symbols.name),
                exchange = COALESCE(EXCLUDED.exchange, symbols.exchange),
                active = COALESCE(EXCLUDED.active, symbols.active),
                updated_at_ms = EXCLUDED.updated_at_ms
            "#,
        )
        .bind(&symbol.ticker)
        .bind(&symbol.name)
        .bind(&symbol.exchange)
        .bind(symbol.active)
        .bind(symbol.updated_at_ms)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }
}

fn row_to_candle(r: sqlx::postgres::PgRow) -> StorageResult<Candle> {
    let tf_str: String = r.get("tf");
    let tf = tf_str
        .parse::<Timeframe>()
        .map_err(|e| StorageError::Integrity(format!("corrupt tf column {tf_str}: {e}")))?;
    Ok(Candle {
        ticker: r.get("ticker"),
        tf,
        ts_ms: r.get("ts"),
        o: r.get("o"),
        h: r.get("h"),
        l: r.get("l"),
        c: r.get("c"),
        v: r.get("v"),
        source: r.get("source"),
        ingested_at: r.get("ingested_at"),
    })
}
