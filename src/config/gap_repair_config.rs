use super::{env_opt, env_or, env_required};
use anyhow::Result;

/// Configuration for the gap-detector + repair worker (C6).
#[derive(Debug, Clone)]
pub struct GapRepairConfig {
    pub job_name: String,
    pub node_id: String,
    pub shard_count: i32,
    pub shard_index: i32,
    pub lookback_days: i64,
    pub queue_batch_size: i64,
    pub run_timeout_sec: u64,
    pub stale_minutes: i64,
    pub lease_ms: i64,
    pub universe_path: Option<String>,
    pub source_base_url: String,
    pub source_bearer_token: Option<String>,
}

impl GapRepairConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            job_name: env_or("JOB_NAME", "gap-repair".to_string())?,
            node_id: env_required("NODE_ID")?,
            shard_count: env_or("SHARD_COUNT", 1)?,
            shard_index: env_or("SHARD_INDEX", 0)?,
            lookback_days: env_or("GAP_LOOKBACK_DAYS", 30)?,
            queue_batch_size: env_or("GAP_QUEUE_BATCH_SIZE", 100)?,
            run_timeout_sec: env_or("RUN_TIMEOUT_SEC", 600)?,
            stale_minutes: env_or("STALE_MINUTES", 30)?,
            lease_ms: env_or("LEASE_MS", 300_000)?,
            universe_path: env_opt("UNIVERSE_FILE"),
            source_base_url: env_required("SOURCE_BASE_URL")?,
            source_bearer_token: env_opt("SOURCE_BEARER_TOKEN"),
        })
    }
}
