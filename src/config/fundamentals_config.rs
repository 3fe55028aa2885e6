use super::{env_opt, env_or, env_required};
use anyhow::Result;

/// Configuration for the fundamentals ingest worker (C9).
#[derive(Debug, Clone)]
pub struct FundamentalsConfig {
    pub source_base_url: String,
    pub bearer_token: Option<String>,
    pub no_fallback_to_q: bool,
    pub out_dir: String,
    pub concurrency: usize,
}

impl FundamentalsConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            source_base_url: env_required("FUNDAMENTALS_SOURCE_BASE_URL")?,
            bearer_token: env_opt("FUNDAMENTALS_BEARER_TOKEN"),
            no_fallback_to_q: env_or("NO_FALLBACK_TO_Q", false)?,
            out_dir: env_or("OUT_DIR", "raw".to_string())?,
            concurrency: env_or("FUNDAMENTALS_CONCURRENCY", 6usize)?,
        })
    }

    /// §4.9: `period = Y` with no bearer token falls back to `Q` unless
    /// fallback is disabled.
    pub fn should_fallback_to_quarterly(&self) -> bool {
        self.bearer_token.is_none() && !self.no_fallback_to_q
    }
}
