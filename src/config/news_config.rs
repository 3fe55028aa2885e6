use super::{env_opt, env_or, env_required};
use anyhow::Result;

/// Configuration shared by the news-discover and news-fetch workers (C7).
#[derive(Debug, Clone)]
pub struct NewsConfig {
    pub relay_base_url: String,
    pub rate_per_sec: f64,
    pub user_agent: String,
    pub min_word_count: i32,
    pub consecutive_empty_pages_to_finish: i32,
    pub headless_relay_url: Option<String>,
    pub run_timeout_sec: u64,
    pub fetch_batch_size: i64,
}

/// Single browser-like user-agent pinned for both the plain HTTP path and
/// the headless-browser fallback (resolved Open Question, SPEC_FULL.md §10).
pub const NEWS_FETCH_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";

impl NewsConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            relay_base_url: env_required("NEWS_RELAY_BASE_URL")?,
            rate_per_sec: env_or("NEWS_RATE_PER_SEC", 2.0)?,
            user_agent: env_or(
                "NEWS_USER_AGENT",
                NEWS_FETCH_USER_AGENT.to_string(),
            )?,
            min_word_count: env_or("NEWS_MIN_WORD_COUNT", 80)?,
            consecutive_empty_pages_to_finish: env_or("NEWS_EMPTY_PAGES_TO_FINISH", 3)?,
            headless_relay_url: env_opt("NEWS_HEADLESS_RELAY_URL"),
            run_timeout_sec: env_or("RUN_TIMEOUT_SEC", 600)?,
            fetch_batch_size: env_or("NEWS_FETCH_BATCH_SIZE", 50)?,
        })
    }
}
