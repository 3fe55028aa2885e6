use super::{env_or, env_required};
use anyhow::Result;

/// Connection settings for the time-series warehouse, shared by every
/// binary in the fleet.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub dsn: String,
    pub max_connections: u32,
    pub statement_timeout_sec: u64,
}

impl WarehouseConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            dsn: env_required("WAREHOUSE_DSN")?,
            max_connections: env_or("WAREHOUSE_MAX_CONNECTIONS", 10)?,
            statement_timeout_sec: env_or("WAREHOUSE_STATEMENT_TIMEOUT_SEC", 30)?,
        })
    }
}
