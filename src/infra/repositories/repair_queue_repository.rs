//! PostgreSQL-backed `RepairQueueRepository` (C6). `enqueue` deduplicates on
//! `(ticker, tf, window_start_ts, window_end_ts)`; a `queued`/`running` row
//! for the same window is refreshed in place, while a `done` row is left
//! untouched (§3: "once `done`, the row is retained for audit and not
//! re-queued").

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::errors::StorageError;
use crate::domain::model::{RepairQueueEntry, RepairStatus, Timeframe};
use crate::domain::repositories::{RepairQueueRepository, StorageResult};

pub struct PgRepairQueueRepository {
    pool: PgPool,
}

impl PgRepairQueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_storage_err(e: sqlx::Error) -> StorageError {
    StorageError::Transient(e.to_string())
}

#[async_trait]
impl RepairQueueRepository for PgRepairQueueRepository {
    async fn enqueue(
        &self,
        ticker: &str,
        tf: Timeframe,
        window_start_ms: i64,
        window_end_ms: i64,
        expected_bars: i32,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO candle_repair_queue
                (ticker, tf, window_start_ts, window_end_ts, expected_bars, status, attempts, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'queued', 0, now(), now())
            ON CONFLICT (ticker, tf, window_start_ts, window_end_ts) DO UPDATE SET
                expected_bars = EXCLUDED.expected_bars,
                updated_at = now()
            WHERE candle_repair_queue.status IN ('queued', 'running')
            "#,
        )
        .bind(ticker)
        .bind(tf.as_str())
        .bind(window_start_ms)
        .bind(window_end_ms)
        .bind(expected_bars)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }

    async fn dequeue_batch(&self, limit: i64) -> StorageResult<Vec<RepairQueueEntry>> {
        // Select-then-claim under a single transaction with row locks so
        // concurrent repair workers don't double-dequeue the same window.
        let mut tx = self.pool.begin().await.map_err(to_storage_err)?;

        let rows = sqlx::query(
            r#"
            SELECT id, ticker, tf, window_start_ts, window_end_ts, expected_bars,
                   status, attempts, last_error, created_at, updated_at
            FROM candle_repair_queue
            WHERE status = 'queued'
            ORDER BY created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *tx)
        .await
        .map_err(to_storage_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for r in &rows {
            let id: i64 = r.get("id");
            sqlx::query(
                "UPDATE candle_repair_queue SET status = 'running', attempts = attempts + 1, updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(to_storage_err)?;
        }

        tx.commit().await.map_err(to_storage_err)?;

        for r in rows {
            out.push(row_to_entry(r)?);
        }
        Ok(out)
    }

    async fn set_status(
        &self,
        id: i64,
        status: RepairStatus,
        last_error: Option<&str>,
    ) -> StorageResult<()> {
        sqlx::query(
            "UPDATE candle_repair_queue SET status = $2, last_error = $3, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(last_error)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }

    async fn record_repair(
        &self,
        ticker: &str,
        tf: Timeframe,
        window_start_ms: i64,
        window_end_ms: i64,
        missing_count: i32,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO candle_repairs (ticker, tf, window_start_ts, window_end_ts, missing_count, created_at)
            VALUES ($1, $2, $3, $4, $5, now())
            "#,
        )
        .bind(ticker)
        .bind(tf.as_str())
        .bind(window_start_ms)
        .bind(window_end_ms)
        .bind(missing_count)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }

    async fn queue_depth(&self, status: RepairStatus) -> StorageResult<i64> {
        let row = sqlx::query("SELECT count(*) AS n FROM candle_repair_queue WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(to_storage_err)?;
        Ok(row.get("n"))
    }
}

fn row_to_entry(r: sqlx::postgres::PgRow) -> StorageResult<RepairQueueEntry> {
    let tf_str: String = r.get("tf");
    let status_str: String = r.get("status");
    Ok(RepairQueueEntry {
        id: r.get("id"),
        ticker: r.get("ticker"),
        tf: tf_str
            .parse::<Timeframe>()
            .map_err(|e| StorageError::Integrity(e.to_string()))?,
        window_start_ms: r.get("window_start_ts"),
        window_end_ms: r.get("window_end_ts"),
        expected_bars: r.get("expected_bars"),
        status: match status_str.as_str() {
            "queued" => RepairStatus::Queued,
            "running" => RepairStatus::Running,
            "done" => RepairStatus::Done,
            "error" => RepairStatus::Error,
            other => {
                return Err(StorageError::Integrity(format!(
                    "corrupt repair status: {other}"
                )))
            }
        },
        attempts: r.get("attempts"),
        last_error: r.get("last_error"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}
