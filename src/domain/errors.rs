//! Error kinds shared across the ingestion fleet and the query service.
//!
//! Each enum maps to one of the error kinds named in the system design:
//! validation/auth/not-found surface to HTTP callers; coordination/source/
//! storage errors drive retry and cursor-advance policy in the workers.

use thiserror::Error;

/// Bad request parameters (ticker format, window size, missing query param).
/// Never retried; surfaces as HTTP 400 from the query service.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid ticker: {ticker}")]
    InvalidTicker { ticker: String },

    #[error("invalid timeframe: {tf}")]
    InvalidTimeframe { tf: String },

    #[error("invalid limit: {limit} (must be in [1,{max}])")]
    InvalidLimit { limit: i64, max: i64 },

    #[error("invalid window_days: {window_days}")]
    InvalidWindowDays { window_days: i64 },

    #[error("missing required parameter: {param}")]
    MissingParam { param: &'static str },
}

/// Missing/invalid `x-api-key`. Never retried; surfaces as HTTP 401.
#[derive(Debug, Error)]
#[error("unauthorized")]
pub struct AuthError;

/// Requested entity does not exist. Surfaces as HTTP 404.
#[derive(Debug, Error)]
pub enum NotFoundError {
    #[error("ticker not found: {ticker}")]
    Ticker { ticker: String },

    #[error("fundamentals block not found for {ticker}/{period}")]
    FundamentalsBlock { ticker: String, period: String },
}

/// The lease/cursor coordinator (warehouse) is unreachable. A worker that
/// observes this MUST exit without writing any ingest state.
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("lease store unreachable: {reason}")]
    Unavailable { reason: String },

    #[error("lease ownership lost for {job}/{shard}")]
    OwnershipLost { job: String, shard: i32 },
}

/// Errors from an outbound call to a third-party source via the source
/// client (C4). `Transient` is retried with exponential back-off;
/// `Terminal` (4xx) is recorded and never retried.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transient source error ({status:?}): {message}")]
    Transient {
        status: Option<u16>,
        message: String,
    },

    #[error("terminal source error ({status}): {message}")]
    Terminal { status: u16, message: String },

    #[error("source request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Errors from the warehouse DAO layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Transient: connection reset, serialization failure, deadlock.
    /// Retried once by the caller; cursor is never advanced past it.
    #[error("storage unavailable: {0}")]
    Transient(String),

    /// Schema/constraint violation - a bug-class error, not retried.
    #[error("integrity violation: {0}")]
    Integrity(String),
}

/// The worker's run-timeout elapsed. Not itself an error condition: partial
/// progress is durable and the next run resumes from the advanced cursor.
#[derive(Debug, Error)]
#[error("run timed out after {elapsed_sec}s (budget {budget_sec}s)")]
pub struct RunTimeout {
    pub elapsed_sec: u64,
    pub budget_sec: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_messages_name_the_field() {
        let e = ValidationError::InvalidLimit {
            limit: 5000,
            max: 2000,
        };
        let msg = e.to_string();
        assert!(msg.contains("5000"));
        assert!(msg.contains("2000"));
    }

    #[test]
    fn coordination_error_names_job_and_shard() {
        let e = CoordinationError::OwnershipLost {
            job: "candle-ingest".into(),
            shard: 3,
        };
        assert!(e.to_string().contains("candle-ingest/3"));
    }
}
