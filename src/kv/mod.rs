//! Expiring key-value store
//!
//! The interval gate and the blog mutex only need four primitives from a
//! key-value store with server-side expiry. `KeyValueStore` names them so
//! the backend can be swapped:
//! - `SqliteStore`: entries live in the shared database file, so every
//!   worker process opening it sees the same keys
//! - `MemoryStore`: process-local, for single-process deployments and tests

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::AppError;

/// Key-value store with per-entry expiry
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Remaining lifetime of a live entry
    ///
    /// Returns `None` if the key is absent or expired. Does not touch the
    /// entry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, AppError>;

    /// Store `value` under `key` for `ttl`, replacing any existing entry
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration)
    -> Result<(), AppError>;

    /// Store `value` under `key` for `ttl` unless a live entry exists
    ///
    /// Atomic: of several concurrent callers at most one gets `true`.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, AppError>;

    /// Delete `key` only while it still holds `value`
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, AppError>;

    /// Drop expired entries, returning how many were removed
    async fn prune_expired(&self) -> Result<u64, AppError>;
}
