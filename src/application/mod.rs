//! Application-layer workers: the business logic composed on top of the
//! `domain` trait abstractions, one module per worker binary.

pub mod candle_ingest;
pub mod candle_source;
pub mod derived_sync;
pub mod fundamentals_ingest;
pub mod gap_detector;
pub mod lease_coordinator;
pub mod news_discover;
pub mod news_fetch;
pub mod shard_router;
