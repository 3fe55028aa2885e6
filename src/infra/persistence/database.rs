//! Time-series warehouse connection pool + schema bootstrap (C1).
//!
//! Grounded on the teacher's `infrastructure/persistence/database.rs`
//! (`Database::new()` connects, then runs `init()` with `CREATE TABLE IF
//! NOT EXISTS` statements so migrations compose); the pool backend is
//! PostgreSQL + TimescaleDB instead of SQLite (SPEC_FULL.md §10), matching
//! sibling pack repo `sf19-97-sptrader-chart-lib`'s `sqlx` feature set.

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};

use crate::config::WarehouseConfig;

/// Shared warehouse handle. `Clone` is cheap: `PgPool` is an `Arc` internally.
#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(cfg: &WarehouseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect(&cfg.dsn)
            .await
            .context("failed to connect to warehouse")?;

        info!(max_connections = cfg.max_connections, "connected to warehouse");

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    #[cfg(test)]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates every table named in spec.md §6 `IF NOT EXISTS`, so repeated
    /// runs across the fleet compose without a migration-lock dance.
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS symbols (
                ticker TEXT PRIMARY KEY,
                name TEXT,
                exchange TEXT,
                active BOOLEAN,
                updated_at_ms BIGINT
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create symbols")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles (
                ticker TEXT NOT NULL,
                tf TEXT NOT NULL,
                ts BIGINT NOT NULL,
                o DOUBLE PRECISION NOT NULL,
                h DOUBLE PRECISION NOT NULL,
                l DOUBLE PRECISION NOT NULL,
                c DOUBLE PRECISION NOT NULL,
                v DOUBLE PRECISION,
                source TEXT,
                ingested_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (ticker, tf, ts)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create candles")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_candles_ticker_tf_ts ON candles (ticker, tf, ts DESC);")
            .execute(&mut *conn)
            .await
            .context("create candles ticker/tf/ts index")?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_candles_tf_ts ON candles (tf, ts DESC);")
            .execute(&mut *conn)
            .await
            .context("create candles tf/ts index")?;

        // TimescaleDB hypertable + compression policy. Best-effort: a plain
        // Postgres deployment (e.g. integration tests) has no `timescaledb`
        // extension, so failures here are logged and swallowed rather than
        // propagated - candles still work as an ordinary partitioned table.
        if let Err(e) = sqlx::query(
            "SELECT create_hypertable('candles', 'ts', chunk_time_interval => 2592000000, if_not_exists => TRUE);",
        )
        .execute(&mut *conn)
        .await
        {
            warn!(error = %e, "could not create hypertable for candles (timescaledb extension absent?)");
        }
        if let Err(e) = sqlx::query(
            "ALTER TABLE candles SET (timescaledb.compress, timescaledb.compress_segmentby = 'ticker,tf', timescaledb.compress_orderby = 'ts');",
        )
        .execute(&mut *conn)
        .await
        {
            warn!(error = %e, "could not enable compression on candles");
        }
        if let Err(e) = sqlx::query(
            "SELECT add_compression_policy('candles', compress_after => INTERVAL '14 days', if_not_exists => TRUE);",
        )
        .execute(&mut *conn)
        .await
        {
            warn!(error = %e, "could not add compression policy on candles");
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles_latest (
                ticker TEXT NOT NULL,
                tf TEXT NOT NULL,
                ts BIGINT NOT NULL,
                o DOUBLE PRECISION NOT NULL,
                h DOUBLE PRECISION NOT NULL,
                l DOUBLE PRECISION NOT NULL,
                c DOUBLE PRECISION NOT NULL,
                v DOUBLE PRECISION,
                source TEXT,
                ingested_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (ticker, tf)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create candles_latest")?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_candles_latest_tf ON candles_latest (tf);")
            .execute(&mut *conn)
            .await
            .context("create candles_latest tf index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS leases (
                job TEXT NOT NULL,
                shard INTEGER NOT NULL,
                owner_id TEXT NOT NULL,
                lease_until_ms BIGINT NOT NULL,
                last_progress_ms BIGINT NOT NULL,
                meta TEXT,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (job, shard)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create leases")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shard_cursors (
                job TEXT NOT NULL,
                shard INTEGER NOT NULL,
                next_index BIGINT NOT NULL,
                last_batch JSONB,
                batch_size BIGINT NOT NULL,
                universe_count BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (job, shard)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create shard_cursors")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candle_repair_queue (
                id BIGSERIAL PRIMARY KEY,
                ticker TEXT NOT NULL,
                tf TEXT NOT NULL,
                window_start_ts BIGINT NOT NULL,
                window_end_ts BIGINT NOT NULL,
                expected_bars INTEGER NOT NULL,
                note TEXT,
                status TEXT NOT NULL CHECK (status IN ('queued','running','done','error')),
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (ticker, tf, window_start_ts, window_end_ts)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create candle_repair_queue")?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_repair_queue_status_created ON candle_repair_queue (status, created_at);",
        )
        .execute(&mut *conn)
        .await
        .context("create candle_repair_queue index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candle_repairs (
                id BIGSERIAL PRIMARY KEY,
                ticker TEXT NOT NULL,
                tf TEXT NOT NULL,
                window_start_ts BIGINT NOT NULL,
                window_end_ts BIGINT NOT NULL,
                missing_count INTEGER NOT NULL,
                note TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create candle_repairs")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                url TEXT PRIMARY KEY,
                canonical_url TEXT,
                source TEXT NOT NULL,
                title TEXT NOT NULL,
                published_at TIMESTAMPTZ,
                feed_url TEXT,
                discovered_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                fetched_at TIMESTAMPTZ,
                fetch_status TEXT NOT NULL DEFAULT 'pending',
                fetch_method TEXT,
                fetch_error TEXT,
                text TEXT,
                content_sha256 TEXT,
                word_count INTEGER,
                lang TEXT,
                ingested_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create articles")?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_status_published ON articles (fetch_status, published_at DESC);",
        )
        .execute(&mut *conn)
        .await
        .context("create articles status index")?;
        if let Err(e) = sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_fts ON articles USING GIN (to_tsvector('simple', coalesce(title,'') || ' ' || coalesce(text,'')));",
        )
        .execute(&mut *conn)
        .await
        {
            warn!(error = %e, "could not create full-text index on articles");
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS article_symbols (
                article_url TEXT NOT NULL REFERENCES articles(url),
                ticker TEXT NOT NULL,
                confidence DOUBLE PRECISION NOT NULL,
                method TEXT NOT NULL,
                PRIMARY KEY (article_url, ticker)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create article_symbols")?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_article_symbols_ticker ON article_symbols (ticker);")
            .execute(&mut *conn)
            .await
            .context("create article_symbols ticker index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fi_latest (
                ticker TEXT NOT NULL,
                period TEXT NOT NULL,
                statement TEXT NOT NULL,
                period_date DATE,
                metric TEXT NOT NULL,
                value DOUBLE PRECISION,
                fetched_at TIMESTAMPTZ NOT NULL,
                ingested_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (ticker, period, statement, metric)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create fi_latest")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fi_points (
                ticker TEXT NOT NULL,
                period TEXT NOT NULL,
                statement TEXT NOT NULL,
                period_date DATE NOT NULL,
                period_date_name TEXT,
                metric TEXT NOT NULL,
                value DOUBLE PRECISION,
                fetched_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (ticker, period, statement, period_date, metric)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create fi_points")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                feed_url TEXT PRIMARY KEY,
                last_seen_published_at TIMESTAMPTZ,
                last_checked_at TIMESTAMPTZ
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create feeds")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seeds (
                seed_url TEXT PRIMARY KEY,
                channel_id TEXT,
                enabled BOOLEAN NOT NULL DEFAULT TRUE
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create seeds")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS crawl_state (
                seed_url TEXT PRIMARY KEY REFERENCES seeds(seed_url),
                next_page INTEGER NOT NULL DEFAULT 1,
                done BOOLEAN NOT NULL DEFAULT FALSE,
                no_new_pages_count INTEGER NOT NULL DEFAULT 0,
                oldest_seen_published_at TIMESTAMPTZ,
                last_error TEXT
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create crawl_state")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create kv")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS corporate_actions (
                id BIGSERIAL PRIMARY KEY,
                ticker TEXT NOT NULL,
                exchange TEXT,
                ex_date DATE,
                record_date DATE,
                pay_date DATE,
                event_type TEXT,
                headline TEXT,
                source TEXT NOT NULL,
                source_url TEXT,
                ingested_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create corporate_actions")?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_corporate_actions_keyset ON corporate_actions (ex_date DESC, id DESC);",
        )
        .execute(&mut *conn)
        .await
        .context("create corporate_actions keyset index")?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_corporate_actions_ticker ON corporate_actions (ticker, ex_date DESC, id DESC);",
        )
        .execute(&mut *conn)
        .await
        .context("create corporate_actions ticker index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS symbol_context_latest (
                ticker TEXT PRIMARY KEY,
                candle_count BIGINT NOT NULL DEFAULT 0,
                article_count BIGINT NOT NULL DEFAULT 0,
                last_candle_ts BIGINT,
                last_article_at TIMESTAMPTZ,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create symbol_context_latest")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS market_stats (
                key TEXT PRIMARY KEY,
                value_json JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("create market_stats")?;

        info!("warehouse schema initialized");
        Ok(())
    }
}
