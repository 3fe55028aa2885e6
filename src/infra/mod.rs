//! Adapters implementing the `domain::repositories` traits plus the
//! stateless I/O helpers (HTTP source client, file-backed shard cache)
//! that the application layer composes into workers.

pub mod persistence;
pub mod repositories;
pub mod shard_cache;
pub mod source_client;

pub use persistence::Database;
pub use source_client::{CallOptions, SourceClient, SourceResponse};
