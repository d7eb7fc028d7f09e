//! Content-addressed response cache.
//!
//! [`ResponseCache`] maps a request [`Fingerprint`] to a previously computed
//! completion. Entries are JSON documents in the shared [`KvStore`] under
//! `{namespace}:{fingerprint}` and expire through the store's native TTL.
//!
//! The cache never calls upstream and never hides store failures: lookup
//! and store errors are returned so the gateway can degrade them to a miss.

pub mod fingerprint;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;
use crate::store::KvStore;
use crate::{Result, telemetry};

pub use fingerprint::{Fingerprint, RequestParams};

/// Configuration for the response cache.
///
/// ```rust
/// # use heimdall::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .ttl(Duration::from_secs(600))
///     .namespace("llm");
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether lookups and stores are performed at all. Default: true.
    pub enabled: bool,
    /// Time-to-live for cached entries. Default: 1 hour.
    pub ttl: Duration,
    /// Key prefix in the backing store. Default: "cache".
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(3600),
            namespace: "cache".to_string(),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config with caching turned off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the key prefix used in the backing store.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// The cached part of a generate response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPayload {
    pub completion: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost_usd: f64,
}

/// A stored cache entry. Read-only once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub payload: CachedPayload,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + chrono::Duration::seconds(self.ttl_seconds as i64)
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub enabled: bool,
    /// Live entries, or `None` when the store could not be reached.
    pub total_items: Option<u64>,
    pub ttl_seconds: u64,
}

/// Response cache over a shared [`KvStore`].
pub struct ResponseCache {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn prefix(&self) -> String {
        format!("{}:", self.config.namespace)
    }

    fn key(&self, fingerprint: &Fingerprint) -> String {
        format!("{}:{}", self.config.namespace, fingerprint)
    }

    /// Look up a cached entry.
    ///
    /// Returns `Ok(None)` on a miss or when the cache is disabled. Emits
    /// cache hit/miss metrics.
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        if !self.config.enabled {
            return Ok(None);
        }
        match self.store.get(&self.key(fingerprint)).await? {
            Some(raw) => {
                let entry: CacheEntry = serde_json::from_str(&raw)?;
                metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                debug!(%fingerprint, "cache hit");
                Ok(Some(entry))
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                Ok(None)
            }
        }
    }

    /// Store a payload, overwriting any existing entry for the fingerprint.
    ///
    /// `ttl` defaults to the configured TTL. No-op when the cache is disabled.
    pub async fn store(
        &self,
        fingerprint: &Fingerprint,
        payload: CachedPayload,
        ttl: Option<Duration>,
    ) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let ttl = ttl.unwrap_or(self.config.ttl);
        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            payload,
            created_at: DateTime::from_timestamp_millis(self.clock.now_millis() as i64)
                .unwrap_or_default(),
            ttl_seconds: ttl.as_secs(),
        };
        let raw = serde_json::to_string(&entry)?;
        self.store.set_ex(&self.key(fingerprint), &raw, ttl).await?;
        debug!(%fingerprint, ttl_secs = ttl.as_secs(), "cached response");
        Ok(())
    }

    /// Remove every entry in the cache namespace, returning how many were removed.
    pub async fn clear(&self) -> Result<u64> {
        if !self.config.enabled {
            return Ok(0);
        }
        let keys = self.store.keys(&self.prefix()).await?;
        let removed = self.store.delete(&keys).await?;
        debug!(removed, namespace = %self.config.namespace, "cleared response cache");
        Ok(removed)
    }

    pub async fn stats(&self) -> CacheStats {
        let total_items = if self.config.enabled {
            match self.store.keys(&self.prefix()).await {
                Ok(keys) => Some(keys.len() as u64),
                Err(e) => {
                    telemetry::store_degraded("cache", &e.to_string());
                    None
                }
            }
        } else {
            Some(0)
        };
        CacheStats {
            enabled: self.config.enabled,
            total_items,
            ttl_seconds: self.config.ttl.as_secs(),
        }
    }
}
