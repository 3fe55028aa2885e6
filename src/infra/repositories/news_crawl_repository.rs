//! PostgreSQL-backed `NewsCrawlRepository` (C7 discovery bookkeeping):
//! `feeds`, `seeds`, `crawl_state` and the generic `kv` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::errors::StorageError;
use crate::domain::model::{CrawlState, Seed};
use crate::domain::repositories::{NewsCrawlRepository, StorageResult};

pub struct PgNewsCrawlRepository {
    pool: PgPool,
}

impl PgNewsCrawlRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_storage_err(e: sqlx::Error) -> StorageError {
    StorageError::Transient(e.to_string())
}

#[async_trait]
impl NewsCrawlRepository for PgNewsCrawlRepository {
    async fn list_enabled_seeds(&self) -> StorageResult<Vec<Seed>> {
        let rows = sqlx::query("SELECT seed_url, channel_id, enabled FROM seeds WHERE enabled = TRUE")
            .fetch_all(&self.pool)
            .await
            .map_err(to_storage_err)?;
        Ok(rows
            .into_iter()
            .map(|r| Seed {
                seed_url: r.get("seed_url"),
                channel_id: r.get("channel_id"),
                enabled: r.get("enabled"),
            })
            .collect())
    }

    async fn get_crawl_state(&self, seed_url: &str) -> StorageResult<Option<CrawlState>> {
        let row = sqlx::query(
            "SELECT seed_url, next_page, done, no_new_pages_count, oldest_seen_published_at, last_error FROM crawl_state WHERE seed_url = $1",
        )
        .bind(seed_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(row.map(|r| CrawlState {
            seed_url: r.get("seed_url"),
            next_page: r.get("next_page"),
            done: r.get("done"),
            no_new_pages_count: r.get("no_new_pages_count"),
            oldest_seen_published_at: r.get("oldest_seen_published_at"),
            last_error: r.get("last_error"),
        }))
    }

    async fn upsert_crawl_state(&self, state: &CrawlState) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO crawl_state (seed_url, next_page, done, no_new_pages_count, oldest_seen_published_at, last_error)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (seed_url) DO UPDATE SET
                next_page = EXCLUDED.next_page,
                done = EXCLUDED.done,
                no_new_pages_count = EXCLUDED.no_new_pages_count,
                oldest_seen_published_at = EXCLUDED.oldest_seen_published_at,
                last_error = EXCLUDED.last_error
            "#,
        )
        .bind(&state.seed_url)
        .bind(state.next_page)
        .bind(state.done)
        .bind(state.no_new_pages_count)
        .bind(state.oldest_seen_published_at)
        .bind(&state.last_error)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }

    async fn mark_seed_done(&self, seed_url: &str) -> StorageResult<()> {
        sqlx::query("UPDATE crawl_state SET done = TRUE WHERE seed_url = $1")
            .bind(seed_url)
            .execute(&self.pool)
            .await
            .map_err(to_storage_err)?;
        Ok(())
    }

    async fn touch_feed(
        &self,
        feed_url: &str,
        last_seen_published_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO feeds (feed_url, last_seen_published_at, last_checked_at)
            VALUES ($1, $2, now())
            ON CONFLICT (feed_url) DO UPDATE SET
                last_seen_published_at = COALESCE(EXCLUDED.last_seen_published_at, feeds.last_seen_published_at),
                last_checked_at = now()
            "#,
        )
        .bind(feed_url)
        .bind(last_seen_published_at)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }

    async fn kv_get(&self, key: &str) -> StorageResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_storage_err)?;
        Ok(row.map(|r| r.get("value")))
    }

    async fn kv_set(&self, key: &str, value: &str) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO kv (key, value, updated_at) VALUES ($1, $2, now()) ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }
}
