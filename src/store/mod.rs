//! Shared key-value backing store.
//!
//! Cache entries and rate-limit counters live in a [`KvStore`]. The
//! in-process [`MemoryStore`] is the default; [`RedisStore`] (feature
//! `redis`) shares state across gateway instances.
//!
//! Every operation returns a `Result`. Callers decide how to degrade when
//! the store is unreachable; the store itself never swallows errors.

mod memory;
#[cfg(feature = "redis")]
mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Key-value store with per-key expiry and atomic counters.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store name for logging/debugging.
    fn name(&self) -> &str;

    /// Read a live value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value that expires after `ttl`, replacing any previous value.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Atomically increment an integer counter and (re)set its expiry to `ttl`.
    ///
    /// A missing or expired key starts from zero. Returns the new value.
    async fn incr_ex(&self, key: &str, ttl: Duration) -> Result<u64>;

    /// List live keys starting with `prefix`.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<()>;
}
