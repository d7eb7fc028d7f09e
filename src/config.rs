//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag / explicit path)
//! 2. `~/.heimdall/config.toml` (user)
//! 3. `/etc/heimdall/config.toml` (system)
//!
//! Every section is optional; missing values take the defaults below. When
//! no file exists at all the defaults are used as-is.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::CacheConfig;
use crate::clock::Clock;
use crate::ledger::{DEFAULT_COST_PER_TOKEN, LedgerConfig, PricingTable};
use crate::providers::RetryConfig;
use crate::ratelimit::RateLimitConfig;
use crate::store::{KvStore, MemoryStore};
use crate::{HeimdallError, Result};

/// Environment variable consulted when `store.redis_url` is not set.
pub const REDIS_URL_ENV: &str = "HEIMDALL_REDIS_URL";

/// Gateway configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub ledger: LedgerSection,
}

/// Which backing store holds cache entries and rate counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

/// Backing store configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Redis URL (default: `$HEIMDALL_REDIS_URL`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    /// Key cap for the in-memory store (default: 100,000).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<u64>,
}

impl StoreConfig {
    pub fn redis_url(&self) -> Option<String> {
        self.redis_url
            .clone()
            .or_else(|| std::env::var(REDIS_URL_ENV).ok())
    }
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Entry time-to-live in seconds (default: 3600).
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
            namespace: default_namespace(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_namespace() -> String {
    "cache".to_string()
}

/// Per-user request budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSection {
    #[serde(default = "default_per_minute")]
    pub requests_per_minute: u64,
    #[serde(default = "default_per_hour")]
    pub requests_per_hour: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            requests_per_minute: default_per_minute(),
            requests_per_hour: default_per_hour(),
        }
    }
}

fn default_per_minute() -> u64 {
    10
}

fn default_per_hour() -> u64 {
    100
}

/// Upstream retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in seconds (default: 1.0).
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: f64,
    /// Cap on any single delay, in seconds (default: 60.0).
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
            jitter: true,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> f64 {
    1.0
}

fn default_max_delay() -> f64 {
    60.0
}

/// Cost accounting settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSection {
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold_usd: f64,
    #[serde(default = "default_recent_capacity")]
    pub recent_capacity: usize,
    /// Rate for models without an entry in `pricing`.
    #[serde(default = "default_cost_per_token")]
    pub default_cost_per_token: f64,
    /// Per-token USD rates, merged over the built-in table.
    #[serde(default)]
    pub pricing: BTreeMap<String, f64>,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            alert_threshold_usd: default_alert_threshold(),
            recent_capacity: default_recent_capacity(),
            default_cost_per_token: default_cost_per_token(),
            pricing: BTreeMap::new(),
        }
    }
}

fn default_alert_threshold() -> f64 {
    1.0
}

fn default_recent_capacity() -> usize {
    1000
}

fn default_cost_per_token() -> f64 {
    DEFAULT_COST_PER_TOKEN
}

fn seconds(name: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| HeimdallError::Configuration(format!("invalid {name} {secs}: {e}")))
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; must exist)
    /// 2. `~/.heimdall/config.toml`
    /// 3. `/etc/heimdall/config.toml`
    ///
    /// Falls back to defaults when no file is found.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load and validate a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HeimdallError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config = Self::parse(&content).map_err(|e| match e {
            HeimdallError::Configuration(msg) => {
                HeimdallError::Configuration(format!("{path:?}: {msg}"))
            }
            other => other,
        })?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| HeimdallError::Configuration(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HeimdallError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".heimdall").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/heimdall/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.requests_per_minute == 0 || self.rate_limit.requests_per_hour == 0 {
            return Err(HeimdallError::Configuration(
                "rate limits must allow at least one request".into(),
            ));
        }
        if self.cache.namespace.is_empty() {
            return Err(HeimdallError::Configuration(
                "cache namespace must not be empty".into(),
            ));
        }
        self.retry_config()?;
        let rates = self
            .ledger
            .pricing
            .values()
            .chain(std::iter::once(&self.ledger.default_cost_per_token));
        for rate in rates {
            if !rate.is_finite() || *rate < 0.0 {
                return Err(HeimdallError::Configuration(format!(
                    "invalid cost per token {rate}"
                )));
            }
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            enabled: self.cache.enabled,
            ttl: Duration::from_secs(self.cache.ttl_secs),
            namespace: self.cache.namespace.clone(),
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig::new()
            .per_minute(self.rate_limit.requests_per_minute)
            .per_hour(self.rate_limit.requests_per_hour)
    }

    pub fn retry_config(&self) -> Result<RetryConfig> {
        Ok(RetryConfig::new()
            .max_attempts(self.retry.max_attempts)
            .initial_delay(seconds("base_delay_secs", self.retry.base_delay_secs)?)
            .max_delay(seconds("max_delay_secs", self.retry.max_delay_secs)?)
            .jitter(self.retry.jitter))
    }

    pub fn pricing_table(&self) -> PricingTable {
        self.ledger
            .pricing
            .iter()
            .fold(PricingTable::new(), |table, (model, rate)| {
                table.with_rate(model.clone(), *rate)
            })
            .default_rate(self.ledger.default_cost_per_token)
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig::new()
            .alert_threshold_usd(self.ledger.alert_threshold_usd)
            .recent_capacity(self.ledger.recent_capacity)
    }

    /// Open the configured backing store.
    pub async fn open_store(&self, clock: Arc<dyn Clock>) -> Result<Arc<dyn KvStore>> {
        match self.store.backend {
            StoreBackend::Memory => {
                let store = MemoryStore::with_clock(clock);
                let store = match self.store.max_entries {
                    Some(n) => store.max_entries(n),
                    None => store,
                };
                Ok(Arc::new(store))
            }
            #[cfg(feature = "redis")]
            StoreBackend::Redis => {
                let url = self.store.redis_url().ok_or_else(|| {
                    HeimdallError::Configuration(format!(
                        "redis backend needs store.redis_url or {REDIS_URL_ENV}"
                    ))
                })?;
                Ok(Arc::new(crate::store::RedisStore::connect(&url).await?))
            }
            #[cfg(not(feature = "redis"))]
            StoreBackend::Redis => Err(HeimdallError::Configuration(
                "redis backend requires the `redis` feature".into(),
            )),
        }
    }
}
