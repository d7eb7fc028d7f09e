//! Builder for configuring gateway instances

use std::sync::Arc;

use super::Gateway;
use crate::cache::{CacheConfig, ResponseCache};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::ledger::{CostLedger, LedgerConfig, PricingTable};
use crate::providers::{GenerateProvider, RetryConfig, RetryOrchestrator};
use crate::ratelimit::{RateLimitConfig, SlidingWindowLimiter};
use crate::store::{KvStore, MemoryStore};
use crate::{HeimdallError, Result};

/// Builder for configuring gateway instances.
///
/// Only the provider is required. The store defaults to an in-process
/// [`MemoryStore`] on the same clock as the gateway.
pub struct GatewayBuilder {
    provider: Option<Arc<dyn GenerateProvider>>,
    store: Option<Arc<dyn KvStore>>,
    clock: Arc<dyn Clock>,
    cache: CacheConfig,
    rate_limits: RateLimitConfig,
    retry: RetryConfig,
    pricing: PricingTable,
    ledger: LedgerConfig,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            store: None,
            clock: Arc::new(SystemClock),
            cache: CacheConfig::default(),
            rate_limits: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            pricing: PricingTable::default(),
            ledger: LedgerConfig::default(),
        }
    }

    /// Apply every section of a loaded [`Config`] except the store, which
    /// needs an async connect (see [`Config::open_store`]).
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new()
            .cache(config.cache_config())
            .rate_limits(config.rate_limit_config())
            .retry(config.retry_config()?)
            .pricing(config.pricing_table())
            .ledger(config.ledger_config()))
    }

    /// Set the upstream provider.
    pub fn provider(mut self, provider: Arc<dyn GenerateProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the shared backing store for cache entries and rate counters.
    pub fn store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    pub fn rate_limits(mut self, config: RateLimitConfig) -> Self {
        self.rate_limits = config;
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn ledger(mut self, config: LedgerConfig) -> Self {
        self.ledger = config;
        self
    }

    pub fn build(self) -> Result<Gateway> {
        let provider = self.provider.ok_or(HeimdallError::NoProvider)?;
        if self.rate_limits.short.window_secs == 0 || self.rate_limits.long.window_secs == 0 {
            return Err(HeimdallError::Configuration(
                "rate limit windows must be at least one second".into(),
            ));
        }
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::with_clock(self.clock.clone())));

        Ok(Gateway::new(
            provider,
            ResponseCache::new(store.clone(), self.clock.clone(), self.cache),
            SlidingWindowLimiter::new(store, self.clock.clone(), self.rate_limits),
            RetryOrchestrator::new(self.retry),
            CostLedger::new(self.pricing, self.ledger, self.clock.clone()),
            self.clock,
        ))
    }
}
