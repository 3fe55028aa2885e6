//! PostgreSQL-backed `ArticleRepository` (C7/C8). `upsert_article_symbol`
//! takes `GREATEST` of the stored and incoming confidence so re-linking a
//! known `(url, ticker)` pair can only raise confidence, never lower it
//! (§8: "confidence is monotonically non-decreasing across re-links").

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::errors::StorageError;
use crate::domain::model::{Article, ArticleSymbolLink, FetchStatus};
use crate::domain::repositories::{ArticleRepository, StorageResult};

pub struct PgArticleRepository {
    pool: PgPool,
}

impl PgArticleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_storage_err(e: sqlx::Error) -> StorageError {
    StorageError::Transient(e.to_string())
}

fn row_to_article(r: sqlx::postgres::PgRow) -> StorageResult<Article> {
    let status_str: String = r.get("fetch_status");
    let fetch_status = status_str
        .parse::<FetchStatus>()
        .map_err(|e| StorageError::Integrity(format!("corrupt fetch_status: {e}")))?;
    Ok(Article {
        url: r.get("url"),
        canonical_url: r.get("canonical_url"),
        source: r.get("source"),
        title: r.get("title"),
        published_at: r.get("published_at"),
        text: r.get("text"),
        content_sha256: r.get("content_sha256"),
        word_count: r.get("word_count"),
        lang: r.get("lang"),
        fetch_status,
        fetch_method: r.get("fetch_method"),
        fetch_error: r.get("fetch_error"),
        ingested_at: r.get("ingested_at"),
        discovered_at: r.get("discovered_at"),
    })
}

#[async_trait]
impl ArticleRepository for PgArticleRepository {
    async fn upsert_discovered(
        &self,
        url: &str,
        source: &str,
        title: &str,
        published_at: Option<DateTime<Utc>>,
        feed_url: Option<&str>,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles (url, source, title, published_at, feed_url, fetch_status, discovered_at, ingested_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', now(), now())
            ON CONFLICT (url) DO NOTHING
            "#,
        )
        .bind(url)
        .bind(source)
        .bind(title)
        .bind(published_at)
        .bind(feed_url)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_fetched(
        &self,
        url: &str,
        text: &str,
        content_sha256: &str,
        word_count: i32,
        lang: Option<&str>,
        fetch_method: &str,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            UPDATE articles SET
                text = $2,
                content_sha256 = $3,
                word_count = $4,
                lang = $5,
                fetch_method = $6,
                fetched_at = now(),
                fetch_status = 'fetched',
                fetch_error = NULL
            WHERE url = $1
            "#,
        )
        .bind(url)
        .bind(text)
        .bind(content_sha256)
        .bind(word_count)
        .bind(lang)
        .bind(fetch_method)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }

    async fn mark_failed(&self, url: &str, fetch_error: &str) -> StorageResult<()> {
        sqlx::query(
            "UPDATE articles SET fetch_status = 'failed', fetch_error = $2 WHERE url = $1",
        )
        .bind(url)
        .bind(fetch_error)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }

    async fn next_pending(&self, limit: i64) -> StorageResult<Vec<Article>> {
        let rows = sqlx::query(
            r#"
            SELECT url, canonical_url, source, title, published_at, text, content_sha256,
                   word_count, lang, fetch_status, fetch_method, fetch_error, ingested_at, discovered_at
            FROM articles
            WHERE fetch_status = 'pending'
            ORDER BY discovered_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(to_storage_err)?;

        rows.into_iter().map(row_to_article).collect()
    }

    async fn query_latest(
        &self,
        limit: i64,
        before_published_at: Option<DateTime<Utc>>,
        before_url: Option<&str>,
    ) -> StorageResult<Vec<Article>> {
        let rows = match (before_published_at, before_url) {
            (Some(ts), Some(url)) => sqlx::query(
                r#"
                SELECT url, canonical_url, source, title, published_at, text, content_sha256,
                       word_count, lang, fetch_status, fetch_method, fetch_error, ingested_at, discovered_at
                FROM articles
                WHERE fetch_status = 'fetched' AND (published_at, url) < ($1, $2)
                ORDER BY published_at DESC, url DESC
                LIMIT $3
                "#,
            )
            .bind(ts)
            .bind(url)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(to_storage_err)?,
            _ => sqlx::query(
                r#"
                SELECT url, canonical_url, source, title, published_at, text, content_sha256,
                       word_count, lang, fetch_status, fetch_method, fetch_error, ingested_at, discovered_at
                FROM articles
                WHERE fetch_status = 'fetched'
                ORDER BY published_at DESC, url DESC
                LIMIT $1
                "#,
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(to_storage_err)?,
        };

        rows.into_iter().map(row_to_article).collect()
    }

    async fn query_by_ticker(
        &self,
        ticker: &str,
        limit: i64,
        before_published_at: Option<DateTime<Utc>>,
        before_url: Option<&str>,
    ) -> StorageResult<Vec<Article>> {
        let rows = match (before_published_at, before_url) {
            (Some(ts), Some(url)) => sqlx::query(
                r#"
                SELECT a.url, a.canonical_url, a.source, a.title, a.published_at, a.text, a.content_sha256,
                       a.word_count, a.lang, a.fetch_status, a.fetch_method, a.fetch_error, a.ingested_at, a.discovered_at
                FROM articles a
                JOIN article_symbols s ON s.article_url = a.url
                WHERE s.ticker = $1 AND a.fetch_status = 'fetched' AND (a.published_at, a.url) < ($2, $3)
                ORDER BY a.published_at DESC, a.url DESC
                LIMIT $4
                "#,
            )
            .bind(ticker)
            .bind(ts)
            .bind(url)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(to_storage_err)?,
            _ => sqlx::query(
                r#"
                SELECT a.url, a.canonical_url, a.source, a.title, a.published_at, a.text, a.content_sha256,
                       a.word_count, a.lang, a.fetch_status, a.fetch_method, a.fetch_error, a.ingested_at, a.discovered_at
                FROM articles a
                JOIN article_symbols s ON s.article_url = a.url
                WHERE s.ticker = $1 AND a.fetch_status = 'fetched'
                ORDER BY a.published_at DESC, a.url DESC
                LIMIT $2
                "#,
            )
            .bind(ticker)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(to_storage_err)?,
        };

        rows.into_iter().map(row_to_article).collect()
    }

    async fn tickers_for(&self, urls: &[String]) -> StorageResult<Vec<ArticleSymbolLink>> {
        if urls.is_empty() {
            return Ok(vec![]);
        }
        let rows = sqlx::query(
            "SELECT article_url, ticker, confidence, method FROM article_symbols WHERE article_url = ANY($1)",
        )
        .bind(urls)
        .fetch_all(&self.pool)
        .await
        .map_err(to_storage_err)?;

        Ok(rows
            .into_iter()
            .map(|r| ArticleSymbolLink {
                article_url: r.get("article_url"),
                ticker: r.get("ticker"),
                confidence: r.get("confidence"),
                method: r.get("method"),
            })
            .collect())
    }

    async fn upsert_article_symbol(
        &self,
        article_url: &str,
        ticker: &str,
        confidence: f64,
        method: &str,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO article_symbols (article_url, ticker, confidence, method)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (article_url, ticker) DO UPDATE SET
                confidence = GREATEST(article_symbols.confidence, EXCLUDED.confidence),
                method = CASE
                    WHEN EXCLUDED.confidence > article_symbols.confidence THEN EXCLUDED.method
                    ELSE article_symbols.method
                END
            "#,
        )
        .bind(article_url)
        .bind(ticker)
        .bind(confidence)
        .bind(method)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }
}
