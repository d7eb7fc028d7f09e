//! Per-user sliding-window admission control.
//!
//! Each (user, window size) pair keeps one integer counter per fixed bucket
//! in the shared [`KvStore`], keyed
//! `rate_limit:{user_id}:{window_secs}:{window_start}`. Admission
//! interpolates between the current bucket and the one before it:
//!
//! ```text
//! weight    = elapsed_in_bucket / window
//! estimated = previous * (1 - weight) + current
//! ```
//!
//! and denies when `estimated > max_requests`. The increment happens before
//! the check, so denied requests count against the budget too. Counters
//! expire after one window of inactivity.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;
use crate::store::KvStore;
use crate::{HeimdallError, Result};

const KEY_PREFIX: &str = "rate_limit";

/// A request budget over one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    pub window_secs: u64,
    pub max_requests: u64,
}

impl WindowLimit {
    pub fn new(window_secs: u64, max_requests: u64) -> Self {
        Self {
            window_secs,
            max_requests,
        }
    }

    /// Human-readable window label, e.g. "minute" or "3600s".
    pub fn label(&self) -> String {
        match self.window_secs {
            60 => "minute".to_string(),
            3600 => "hour".to_string(),
            secs => format!("{secs}s"),
        }
    }
}

/// Configuration for per-user rate limiting.
///
/// ```rust
/// # use heimdall::RateLimitConfig;
/// let config = RateLimitConfig::new().per_minute(20).per_hour(500);
/// assert_eq!(config.short.max_requests, 20);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Short window, checked first. Default: 10 requests per 60s.
    pub short: WindowLimit,
    /// Long window. Default: 100 requests per 3600s.
    pub long: WindowLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            short: WindowLimit::new(60, 10),
            long: WindowLimit::new(3600, 100),
        }
    }
}

impl RateLimitConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-minute budget.
    pub fn per_minute(mut self, max_requests: u64) -> Self {
        self.short = WindowLimit::new(60, max_requests);
        self
    }

    /// Set the per-hour budget.
    pub fn per_hour(mut self, max_requests: u64) -> Self {
        self.long = WindowLimit::new(3600, max_requests);
        self
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Admission {
    Allowed,
    Denied {
        window_secs: u64,
        retry_after_secs: u64,
    },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Raw counts of a user's current buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub short_count: u64,
    pub short_limit: u64,
    pub long_count: u64,
    pub long_limit: u64,
}

/// Sliding-window rate limiter over a shared [`KvStore`].
pub struct SlidingWindowLimiter {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: RateLimitConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn key(user_id: &str, window_secs: u64, window_start: u64) -> String {
        format!("{KEY_PREFIX}:{user_id}:{window_secs}:{window_start}")
    }

    fn user_prefix(user_id: &str) -> String {
        format!("{KEY_PREFIX}:{user_id}:")
    }

    async fn read_count(&self, key: &str) -> Result<u64> {
        match self.store.get(key).await? {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| HeimdallError::Store(format!("counter {key} is not an integer"))),
            None => Ok(0),
        }
    }

    /// Count one request against a window and decide whether it is admitted.
    pub async fn admit(
        &self,
        user_id: &str,
        window_secs: u64,
        max_requests: u64,
    ) -> Result<Admission> {
        if window_secs == 0 {
            return Err(HeimdallError::Configuration(
                "rate limit window must be at least one second".into(),
            ));
        }
        let now = self.clock.now_secs();
        let window_start = now - now % window_secs;
        let elapsed = now - window_start;

        let current_key = Self::key(user_id, window_secs, window_start);
        let current = self
            .store
            .incr_ex(&current_key, Duration::from_secs(window_secs))
            .await?;

        let previous = match window_start.checked_sub(window_secs) {
            Some(previous_start) => {
                self.read_count(&Self::key(user_id, window_secs, previous_start))
                    .await?
            }
            None => 0,
        };

        let weight = elapsed as f64 / window_secs as f64;
        let estimated = previous as f64 * (1.0 - weight) + current as f64;

        if estimated > max_requests as f64 {
            let retry_after_secs = window_secs - elapsed;
            debug!(
                user_id,
                window_secs,
                estimated,
                max_requests,
                retry_after_secs,
                "admission denied"
            );
            return Ok(Admission::Denied {
                window_secs,
                retry_after_secs,
            });
        }
        Ok(Admission::Allowed)
    }

    /// Check the short window, then the long one.
    ///
    /// The long window is only counted once the short window admits.
    pub async fn admit_request(&self, user_id: &str) -> Result<Admission> {
        for limit in [self.config.short, self.config.long] {
            let admission = self
                .admit(user_id, limit.window_secs, limit.max_requests)
                .await?;
            if !admission.is_allowed() {
                return Ok(admission);
            }
        }
        Ok(Admission::Allowed)
    }

    /// Label for a configured window size.
    pub fn window_label(&self, window_secs: u64) -> String {
        [self.config.short, self.config.long]
            .into_iter()
            .find(|limit| limit.window_secs == window_secs)
            .map(|limit| limit.label())
            .unwrap_or_else(|| format!("{window_secs}s"))
    }

    pub async fn status(&self, user_id: &str) -> Result<RateLimitStatus> {
        let now = self.clock.now_secs();
        let short = self.config.short;
        let long = self.config.long;
        let short_key = Self::key(user_id, short.window_secs, now - now % short.window_secs.max(1));
        let long_key = Self::key(user_id, long.window_secs, now - now % long.window_secs.max(1));
        Ok(RateLimitStatus {
            short_count: self.read_count(&short_key).await?,
            short_limit: short.max_requests,
            long_count: self.read_count(&long_key).await?,
            long_limit: long.max_requests,
        })
    }

    /// Remove every counter belonging to a user.
    pub async fn reset(&self, user_id: &str) -> Result<u64> {
        let keys = self.store.keys(&Self::user_prefix(user_id)).await?;
        let removed = self.store.delete(&keys).await?;
        debug!(user_id, removed, "rate limit counters reset");
        Ok(removed)
    }
}
