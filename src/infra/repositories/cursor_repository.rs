//! PostgreSQL-backed `CursorRepository` (C3). The warehouse is the
//! authoritative store (§9 Design Notes: "Treat the warehouse as
//! authoritative; files are per-node caches"); `infra::shard::file_cache`
//! provides the advisory file-backed form for single-node operation.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::errors::StorageError;
use crate::domain::model::ShardCursor;
use crate::domain::repositories::{CursorRepository, StorageResult};

pub struct PgCursorRepository {
    pool: PgPool,
}

impl PgCursorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_storage_err(e: sqlx::Error) -> StorageError {
    StorageError::Transient(e.to_string())
}

#[async_trait]
impl CursorRepository for PgCursorRepository {
    async fn load(&self, job: &str, shard: i32) -> StorageResult<Option<ShardCursor>> {
        let row = sqlx::query(
            "SELECT job, shard, next_index, last_batch, batch_size, universe_count, updated_at FROM shard_cursors WHERE job = $1 AND shard = $2",
        )
        .bind(job)
        .bind(shard)
        .fetch_optional(&self.pool)
        .await
        .map_err(to_storage_err)?;

        Ok(row.map(|r| {
            let last_batch: Option<serde_json::Value> = r.get("last_batch");
            ShardCursor {
                job: r.get("job"),
                shard: r.get("shard"),
                next_index: r.get("next_index"),
                last_batch: last_batch.and_then(|v| serde_json::from_value(v).ok()),
                batch_size: r.get("batch_size"),
                universe_count: r.get("universe_count"),
                updated_at: r.get("updated_at"),
            }
        }))
    }

    async fn save(&self, cursor: &ShardCursor) -> StorageResult<()> {
        let last_batch_json = cursor
            .last_batch
            .as_ref()
            .map(|b| serde_json::to_value(b).unwrap_or(serde_json::Value::Null));

        sqlx::query(
            r#"
            INSERT INTO shard_cursors (job, shard, next_index, last_batch, batch_size, universe_count, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            ON CONFLICT (job, shard) DO UPDATE SET
                next_index = EXCLUDED.next_index,
                last_batch = EXCLUDED.last_batch,
                batch_size = EXCLUDED.batch_size,
                universe_count = EXCLUDED.universe_count,
                updated_at = now()
            "#,
        )
        .bind(&cursor.job)
        .bind(cursor.shard)
        .bind(cursor.next_index)
        .bind(last_batch_json)
        .bind(cursor.batch_size)
        .bind(cursor.universe_count)
        .execute(&self.pool)
        .await
        .map_err(to_storage_err)?;
        Ok(())
    }
}
