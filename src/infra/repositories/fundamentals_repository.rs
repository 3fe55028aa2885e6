//! PostgreSQL-backed `FundamentalsRepository` (C9). `replace_fi_latest`
//! implements the "full-refresh pattern" the spec calls out (§4.1): delete
//! every row for the `(ticker, period, statement)` groups being written,
//! then insert the fresh set, all inside one transaction.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::collections::HashSet;

use crate::domain::errors::StorageError;
use crate::domain::model::{FiLatestRow, FiPointRow, Period, Statement};
use crate::domain::repositories::{FundamentalsRepository, StorageResult};

pub struct PgFundamentalsRepository {
    pool: PgPool,
}

impl PgFundamentalsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_storage_err(e: sqlx::Error) -> StorageError {
    StorageError::Transient(e.to_string())
}

fn row_to_fi_latest(r: sqlx::postgres::PgRow) -> StorageResult<FiLatestRow> {
    let period: String = r.get("period");
    let statement: String = r.get("statement");
    Ok(FiLatestRow {
        ticker: r.get("ticker"),
        period: period
            .parse::<Period>()
            .map_err(|e| StorageError::Integrity(e.to_string()))?,
        statement: statement
            .parse::<Statement>()
            .map_err(|e| StorageError::Integrity(e.to_string()))?,
        period_date: r.get("period_date"),
        metric: r.get("metric"),
        value: r.get("value"),
        fetched_at: r.get("fetched_at"),
        ingested_at: r.get("ingested_at"),
    })
}

#[async_trait]
impl FundamentalsRepository for PgFundamentalsRepository {
    async fn upsert_fi_point(&self, row: &FiPointRow) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO fi_points (ticker, period, statement, period_date, period_date_name, metric, value, fetched_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (ticker, period, statement, period_date, metric) DO UPDATE SET
                period_date_name = EXCLUDED.period_date_name,
                value = EXCLUDED.value,
                fetched_at = EXCLUDED.fetched_at
            "#,
        )
        .bind(&row.ticker)
        .bind(row.period.as_str())
        .bind(row.statement.as_str())
        .bind(row.period_date)
        .bind(&row.period_date_name)
        .bind(&row.metric)
        .bind(row.value)
        .bind(row.fetched_at)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }

    async fn replace_fi_latest(&self, rows: &[FiLatestRow]) -> StorageResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let groups: HashSet<(String, String, String)> = rows
            .iter()
            .map(|r| {
                (
                    r.ticker.clone(),
                    r.period.as_str().to_string(),
                    r.statement.as_str().to_string(),
                )
            })
            .collect();

        let mut tx = self.pool.begin().await.map_err(to_storage_err)?;

        for (ticker, period, statement) in &groups {
            sqlx::query(
                "DELETE FROM fi_latest WHERE ticker = $1 AND period = $2 AND statement = $3",
            )
            .bind(ticker)
            .bind(period)
            .bind(statement)
            .execute(&mut *tx)
            .await
            .map_err(to_storage_err)?;
        }

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO fi_latest (ticker, period, statement, period_date, metric, value, fetched_at, ingested_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, now())
                ON CONFLICT (ticker, period, statement, metric) DO UPDATE SET
                    period_date = EXCLUDED.period_date,
                    value = EXCLUDED.value,
                    fetched_at = EXCLUDED.fetched_at,
                    ingested_at = now()
                "#,
            )
            .bind(&row.ticker)
            .bind(row.period.as_str())
            .bind(row.statement.as_str())
            .bind(row.period_date)
            .bind(&row.metric)
            .bind(row.value)
            .bind(row.fetched_at)
            .execute(&mut *tx)
            .await
            .map_err(to_storage_err)?;
        }

        tx.commit().await.map_err(to_storage_err)?;
        Ok(())
    }

    async fn query_latest(
        &self,
        ticker: &str,
        period: Period,
        statement: Option<Statement>,
        limit: i64,
    ) -> StorageResult<Vec<FiLatestRow>> {
        let rows = match statement {
            Some(st) => sqlx::query(
                r#"
                SELECT ticker, period, statement, period_date, metric, value, fetched_at, ingested_at
                FROM fi_latest
                WHERE ticker = $1 AND period = $2 AND statement = $3
                ORDER BY metric ASC
                LIMIT $4
                "#,
            )
            .bind(ticker)
            .bind(period.as_str())
            .bind(st.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(to_storage_err)?,
            None => sqlx::query(
                r#"
                SELECT ticker, period, statement, period_date, metric, value, fetched_at, ingested_at
                FROM fi_latest
                WHERE ticker = $1 AND period = $2
                ORDER BY statement ASC, metric ASC
                LIMIT $3
                "#,
            )
            .bind(ticker)
            .bind(period.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(to_storage_err)?,
        };

        rows.into_iter().map(row_to_fi_latest).collect()
    }

    async fn screener(
        &self,
        metric: &str,
        period: Period,
        statement: Option<Statement>,
        min: Option<f64>,
        max: Option<f64>,
        limit: i64,
    ) -> StorageResult<Vec<FiLatestRow>> {
        let rows = sqlx::query(
            r#"
            SELECT ticker, period, statement, period_date, metric, value, fetched_at, ingested_at
            FROM fi_latest
            WHERE metric = $1
              AND period = $2
              AND ($3::text IS NULL OR statement = $3)
              AND ($4::double precision IS NULL OR value >= $4)
              AND ($5::double precision IS NULL OR value <= $5)
            ORDER BY value DESC NULLS LAST
            LIMIT $6
            "#,
        )
        .bind(metric)
        .bind(period.as_str())
        .bind(statement.map(|s| s.as_str()))
        .bind(min)
        .bind(max)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(to_storage_err)?;

        rows.into_iter().map(row_to_fi_latest).collect()
    }

    async fn last_block_hash(&self, ticker: &str, period: Period) -> StorageResult<Option<String>> {
        let key = format!("fi_block_hash:{ticker}:{}", period.as_str());
        let row = sqlx::query("SELECT value FROM kv WHERE key = $1")
            .bind(&key)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_storage_err)?;
        Ok(row.map(|r| r.get("value")))
    }

    async fn set_last_block_hash(
        &self,
        ticker: &str,
        period: Period,
        hash: &str,
    ) -> StorageResult<()> {
        let key = format!("fi_block_hash:{ticker}:{}", period.as_str());
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()
            "#,
        )
        .bind(&key)
        .bind(hash)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }
}
