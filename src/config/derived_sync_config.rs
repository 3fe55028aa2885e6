use super::env_or;
use anyhow::Result;

/// Configuration for the derived-surfaces sync worker (C11).
#[derive(Debug, Clone)]
pub struct DerivedSyncConfig {
    pub interval_sec: u64,
    pub run_timeout_sec: u64,
}

impl DerivedSyncConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            interval_sec: env_or("DERIVED_SYNC_INTERVAL_SEC", 300)?,
            run_timeout_sec: env_or("RUN_TIMEOUT_SEC", 600)?,
        })
    }
}
