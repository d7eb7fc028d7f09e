//! Redis-backed store for sharing cache and counters across instances.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::info;

use super::KvStore;
use crate::{HeimdallError, Result};

fn store_error(e: redis::RedisError) -> HeimdallError {
    HeimdallError::Store(e.to_string())
}

/// Redis expiry granularity is whole seconds; never round down to zero.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// [`KvStore`] backed by a Redis server over a multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://localhost:6379`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            HeimdallError::Configuration(format!("invalid redis url {url}: {e}"))
        })?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(store_error)?;
        info!(url, "connected to redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.map_err(store_error)?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, ttl_secs(ttl))
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn incr_ex(&self, key: &str, ttl: Duration) -> Result<u64> {
        let mut conn = self.conn.clone();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, ttl_secs(ttl) as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(count)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys(format!("{prefix}*"))
            .await
            .map_err(store_error)?;
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(keys).await.map_err(store_error)?;
        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}
