//! Configuration loading, organized by worker family: environment variables
//! first, CLI flags override (spec.md §6 "Configuration via CLI flags takes
//! precedence over environment"). Follows the teacher's `*EnvConfig` +
//! `from_env()` pattern (formerly `config/broker_config.rs`).

mod candle_ingest_config;
mod derived_sync_config;
mod fundamentals_config;
mod gap_repair_config;
mod news_config;
mod query_service_config;
mod warehouse_config;

pub use candle_ingest_config::CandleIngestConfig;
pub use derived_sync_config::DerivedSyncConfig;
pub use fundamentals_config::FundamentalsConfig;
pub use gap_repair_config::GapRepairConfig;
pub use news_config::NewsConfig;
pub use query_service_config::QueryServiceConfig;
pub use warehouse_config::WarehouseConfig;

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Reads `key` from the environment and parses it, falling back to
/// `default` when unset. Used by every `*EnvConfig::from_env`.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

pub(crate) fn env_required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("missing required environment variable: {key}"))
}

pub(crate) fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok()
}
