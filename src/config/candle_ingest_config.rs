use super::{env_opt, env_or, env_required};
use crate::domain::model::Timeframe;
use anyhow::Result;

/// Configuration for the candle ingest worker (C5), spec.md §4.5's option
/// table. CLI flags (`clap`, see `src/bin/candle_ingest.rs`) override these
/// defaults where set.
#[derive(Debug, Clone)]
pub struct CandleIngestConfig {
    pub job_name: String,
    pub node_id: String,
    pub shard_count: i32,
    pub shard_index: i32,
    pub batch_size: i64,
    pub tfs: Vec<Timeframe>,
    pub start_1d_ms: i64,
    pub start_1h_ms: i64,
    pub start_15m_ms: i64,
    pub chunk: i64,
    pub include_indices: bool,
    pub run_timeout_sec: u64,
    pub stale_minutes: i64,
    pub lease_ms: i64,
    pub cursor_dir: String,
    pub sleep_ms: u64,
    pub universe_path: Option<String>,
    pub source_base_url: String,
    pub source_bearer_token: Option<String>,
}

impl CandleIngestConfig {
    pub fn from_env() -> Result<Self> {
        let tfs_raw: String = env_or("CANDLE_TFS", "1d,1h,15m".to_string())?;
        let tfs = tfs_raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<Timeframe>().map_err(anyhow::Error::from))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            job_name: env_or("JOB_NAME", "candle-ingest".to_string())?,
            node_id: env_required("NODE_ID")?,
            shard_count: env_or("SHARD_COUNT", 1)?,
            shard_index: env_or("SHARD_INDEX", 0)?,
            batch_size: env_or("BATCH_SIZE", 25)?,
            tfs,
            start_1d_ms: env_or("START_1D_MS", 0)?,
            start_1h_ms: env_or("START_1H_MS", 0)?,
            start_15m_ms: env_or("START_15M_MS", 0)?,
            chunk: env_or("CHUNK", 500)?,
            include_indices: env_or("INCLUDE_INDICES", false)?,
            run_timeout_sec: env_or("RUN_TIMEOUT_SEC", 600)?,
            stale_minutes: env_or("STALE_MINUTES", 30)?,
            lease_ms: env_or("LEASE_MS", 300_000)?,
            cursor_dir: env_or("CURSOR_DIR", "cursors".to_string())?,
            sleep_ms: env_or("SLEEP_MS", 200)?,
            universe_path: env_opt("UNIVERSE_FILE"),
            source_base_url: env_required("SOURCE_BASE_URL")?,
            source_bearer_token: env_opt("SOURCE_BEARER_TOKEN"),
        })
    }

    pub fn start_ms_for(&self, tf: Timeframe) -> i64 {
        match tf {
            Timeframe::D1 => self.start_1d_ms,
            Timeframe::H1 => self.start_1h_ms,
            Timeframe::M15 => self.start_15m_ms,
        }
    }

    pub fn cursor_file(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.cursor_dir)
            .join(format!("{}_{}.json", self.job_name, self.shard_index))
    }
}
