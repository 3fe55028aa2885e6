use super::{env_or, env_required};
use anyhow::Result;

/// Configuration for the query service (C10).
#[derive(Debug, Clone)]
pub struct QueryServiceConfig {
    pub bind_addr: String,
    pub api_key: String,
    pub max_pool_connections: u32,
}

impl QueryServiceConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_addr: env_or("QUERY_SERVICE_BIND_ADDR", "0.0.0.0:8080".to_string())?,
            api_key: env_required("HISTORY_API_KEY")?,
            max_pool_connections: env_or("QUERY_SERVICE_MAX_POOL_CONNECTIONS", 10)?,
        })
    }
}
