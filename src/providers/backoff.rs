//! Backoff delay calculation and error classification.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::HeimdallError;

/// Whether a failed call may be attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryDecision {
    Retryable,
    Fatal,
}

/// Classify an error for retry purposes.
///
/// Only provider errors with a transient kind are retryable.
pub fn classify(error: &HeimdallError) -> RetryDecision {
    if error.is_transient() {
        RetryDecision::Retryable
    } else {
        RetryDecision::Fatal
    }
}

/// Exponential backoff with optional jitter.
///
/// `delay(attempt) = base_delay * 2^attempt * jitter`, jitter uniform in
/// `[0.5, 1.5)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry. Default: 1s.
    pub base_delay: Duration,
    /// Upper bound on any single delay. Default: 60s.
    pub max_delay: Duration,
    /// Whether to randomize delays. Default: true.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Delay before retry number `attempt` (0-indexed), without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.scaled(attempt, 1.0)
    }

    /// Delay before retry number `attempt` (0-indexed), jittered when enabled.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let factor = if self.jitter {
            rand::thread_rng().gen_range(0.5..1.5)
        } else {
            1.0
        };
        self.scaled(attempt, factor)
    }

    /// Delay honouring a provider `retry_after` hint, still capped at `max_delay`.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(self.max_delay),
            None => self.next_delay(attempt),
        }
    }

    fn scaled(&self, attempt: u32, factor: f64) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * 2f64.powi(exponent) * factor;
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }
}
