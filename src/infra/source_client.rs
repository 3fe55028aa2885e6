//! Thin async HTTP client for third-party source APIs (C4, §4.4).
//!
//! Grounded on the teacher's `infrastructure/core/http_client_factory.rs`
//! (pooled `reqwest::Client` with connect/read timeouts); the retry loop
//! itself is hand-rolled rather than middleware-based, per §9 Design Notes
//! ("Retry loops replacing exceptions... loops over attempts are explicit;
//! no exception-driven control flow crosses the client boundary") - the
//! teacher's `reqwest-middleware`/`reqwest-retry` stack hides the attempt
//! loop inside middleware and can't express "retry 5xx, never 4xx" without
//! a custom policy, so this crate drops that pair of dependencies (see
//! DESIGN.md) and retries explicitly here instead.

use std::time::Duration;

use rand::Rng;
use reqwest::{Client, Method};
use serde_json::Value;

use crate::domain::errors::SourceError;

const DEFAULT_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_MAX_ATTEMPTS: u32 = 4;
const BASE_DELAY_MS: u64 = 500;
const BACKOFF_MULTIPLIER: u64 = 2;

/// Parsed response from a source call: the raw body is always kept so
/// callers can surface it upstream even when it doesn't parse as JSON.
#[derive(Debug, Clone)]
pub struct SourceResponse {
    pub status: u16,
    pub json: Option<Value>,
    pub body: String,
}

impl SourceResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Per-call overrides. `headers` are applied on top of the client's
/// defaults; a per-call `timeout_ms` and `max_attempts` both override the
/// client's configured defaults.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub timeout_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub bearer_token: Option<String>,
    pub body: Option<Value>,
}

pub struct SourceClient {
    http: Client,
    user_agent: String,
    default_timeout_ms: u64,
    default_max_attempts: u32,
}

impl SourceClient {
    pub fn new(user_agent: impl Into<String>) -> Self {
        let http = Client::builder()
            .pool_max_idle_per_host(8)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            user_agent: user_agent.into(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            default_max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub async fn get(&self, url: &str, opts: &CallOptions) -> Result<SourceResponse, SourceError> {
        self.call(Method::GET, url, opts).await
    }

    pub async fn post(&self, url: &str, opts: &CallOptions) -> Result<SourceResponse, SourceError> {
        self.call(Method::POST, url, opts).await
    }

    /// Explicit attempt loop: up to `max_attempts`, exponential back-off
    /// with jitter starting at `BASE_DELAY_MS`. Retries network errors,
    /// timeouts, and HTTP 5xx; never retries 4xx (§4.4, §7 `SourceTerminal`).
    async fn call(
        &self,
        method: Method,
        url: &str,
        opts: &CallOptions,
    ) -> Result<SourceResponse, SourceError> {
        let timeout_ms = opts.timeout_ms.unwrap_or(self.default_timeout_ms);
        let max_attempts = opts.max_attempts.unwrap_or(self.default_max_attempts).max(1);

        let mut last_err: Option<SourceError> = None;

        for attempt in 1..=max_attempts {
            let mut req = self
                .http
                .request(method.clone(), url)
                .timeout(Duration::from_millis(timeout_ms))
                .header("user-agent", &self.user_agent);

            if !opts.query.is_empty() {
                req = req.query(&opts.query);
            }
            if let Some(token) = &opts.bearer_token {
                req = req.bearer_auth(token);
            }
            for (k, v) in &opts.headers {
                req = req.header(k, v);
            }
            if let Some(body) = &opts.body {
                req = req.json(body);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    let json = serde_json::from_str::<Value>(&body).ok();
                    let response = SourceResponse { status, json, body };

                    if response.is_success() {
                        return Ok(response);
                    }
                    if (400..500).contains(&status) {
                        return Err(SourceError::Terminal {
                            status,
                            message: response.body,
                        });
                    }
                    // 5xx: transient, fall through to retry/back-off below.
                    last_err = Some(SourceError::Transient {
                        status: Some(status),
                        message: response.body,
                    });
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(SourceError::Timeout { timeout_ms });
                }
                Err(e) => {
                    last_err = Some(SourceError::Transient {
                        status: None,
                        message: e.to_string(),
                    });
                }
            }

            if attempt < max_attempts {
                let delay = backoff_delay_ms(attempt);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(last_err.expect("loop runs at least once"))
    }
}

/// `base * multiplier^(attempt-1)` plus up to 25% jitter (§4.4 permits
/// jitter; exact distribution is an implementation choice).
fn backoff_delay_ms(attempt: u32) -> u64 {
    let exp = BACKOFF_MULTIPLIER.saturating_pow(attempt.saturating_sub(1));
    let base = BASE_DELAY_MS.saturating_mul(exp);
    let jitter = rand::rng().random_range(0..=(base / 4).max(1));
    base + jitter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially() {
        let d1 = BASE_DELAY_MS;
        let d3_min = BASE_DELAY_MS * 4;
        assert!(backoff_delay_ms(1) >= d1);
        assert!(backoff_delay_ms(3) >= d3_min);
    }

    #[test]
    fn source_response_success_range() {
        let ok = SourceResponse {
            status: 200,
            json: None,
            body: String::new(),
        };
        let not_found = SourceResponse {
            status: 404,
            json: None,
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!not_found.is_success());
    }
}
