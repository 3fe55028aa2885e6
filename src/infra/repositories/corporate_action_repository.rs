//! PostgreSQL-backed `CorporateActionRepository`. Keyset sort key is
//! `(ex_date DESC, id DESC)` (§3), so `NULL` `ex_date` rows sort last via
//! `NULLS LAST` on the primary key column.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::errors::StorageError;
use crate::domain::model::CorporateAction;
use crate::domain::repositories::{CorporateActionRepository, StorageResult};

pub struct PgCorporateActionRepository {
    pool: PgPool,
}

impl PgCorporateActionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_storage_err(e: sqlx::Error) -> StorageError {
    StorageError::Transient(e.to_string())
}

fn row_to_action(r: sqlx::postgres::PgRow) -> CorporateAction {
    CorporateAction {
        id: r.get("id"),
        ticker: r.get("ticker"),
        exchange: r.get("exchange"),
        ex_date: r.get("ex_date"),
        record_date: r.get("record_date"),
        pay_date: r.get("pay_date"),
        event_type: r.get("event_type"),
        headline: r.get("headline"),
        source: r.get("source"),
        source_url: r.get("source_url"),
        ingested_at: r.get("ingested_at"),
    }
}

#[async_trait]
impl CorporateActionRepository for PgCorporateActionRepository {
    async fn insert(&self, action: &CorporateAction) -> StorageResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO corporate_actions
                (ticker, exchange, ex_date, record_date, pay_date, event_type, headline, source, source_url, ingested_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
            RETURNING id
            "#,
        )
        .bind(&action.ticker)
        .bind(&action.exchange)
        .bind(action.ex_date)
        .bind(action.record_date)
        .bind(action.pay_date)
        .bind(&action.event_type)
        .bind(&action.headline)
        .bind(&action.source)
        .bind(&action.source_url)
        .fetch_one(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(row.get("id"))
    }

    async fn query_latest(
        &self,
        limit: i64,
        before_ex_date: Option<chrono::NaiveDate>,
        before_id: Option<i64>,
    ) -> StorageResult<Vec<CorporateAction>> {
        let rows = match (before_ex_date, before_id) {
            (Some(ex_date), Some(id)) => sqlx::query(
                r#"
                SELECT id, ticker, exchange, ex_date, record_date, pay_date, event_type, headline, source, source_url, ingested_at
                FROM corporate_actions
                WHERE (ex_date, id) < ($1, $2)
                ORDER BY ex_date DESC NULLS LAST, id DESC
                LIMIT $3
                "#,
            )
            .bind(ex_date)
            .bind(id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(to_storage_err)?,
            _ => sqlx::query(
                r#"
                SELECT id, ticker, exchange, ex_date, record_date, pay_date, event_type, headline, source, source_url, ingested_at
                FROM corporate_actions
                ORDER BY ex_date DESC NULLS LAST, id DESC
                LIMIT $1
                "#,
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(to_storage_err)?,
        };
        Ok(rows.into_iter().map(row_to_action).collect())
    }

    async fn query_by_ticker(
        &self,
        ticker: &str,
        limit: i64,
        before_ex_date: Option<chrono::NaiveDate>,
        before_id: Option<i64>,
    ) -> StorageResult<Vec<CorporateAction>> {
        let rows = match (before_ex_date, before_id) {
            (Some(ex_date), Some(id)) => sqlx::query(
                r#"
                SELECT id, ticker, exchange, ex_date, record_date, pay_date, event_type, headline, source, source_url, ingested_at
                FROM corporate_actions
                WHERE ticker = $1 AND (ex_date, id) < ($2, $3)
                ORDER BY ex_date DESC NULLS LAST, id DESC
                LIMIT $4
                "#,
            )
            .bind(ticker)
            .bind(ex_date)
            .bind(id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(to_storage_err)?,
            _ => sqlx::query(
                r#"
                SELECT id, ticker, exchange, ex_date, record_date, pay_date, event_type, headline, source, source_url, ingested_at
                FROM corporate_actions
                WHERE ticker = $1
                ORDER BY ex_date DESC NULLS LAST, id DESC
                LIMIT $2
                "#,
            )
            .bind(ticker)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(to_storage_err)?,
        };
        Ok(rows.into_iter().map(row_to_action).collect())
    }
}
