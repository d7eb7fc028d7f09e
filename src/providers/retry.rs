//! Retry configuration, the retry orchestrator and a provider decorator.
//!
//! [`RetryOrchestrator::execute`] drives a bounded sequence of attempts of
//! any async operation. [`RetryingGenerateProvider`] wraps a
//! [`GenerateProvider`] with the same logic.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::backoff::{BackoffPolicy, RetryDecision, classify};
use super::traits::GenerateProvider;
use crate::types::{GenerateRequest, Generation};
use crate::{Result, telemetry};

/// Configuration for retry behaviour on transient errors.
///
/// ```rust
/// # use heimdall::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200))
///     .jitter(true);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry, 0 is treated as 1. Default: 3.
    pub max_attempts: u32,
    /// Delay calculation between attempts.
    pub backoff: BackoffPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the base delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.backoff.base_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.backoff.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.backoff.jitter = enabled;
        self
    }

    /// Attempts actually made, never less than one.
    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Drives an operation through bounded retries with backoff.
///
/// Stateless across calls. Dropping the future returned by
/// [`execute`](Self::execute) cancels it, including any pending backoff sleep.
#[derive(Debug, Clone, Default)]
pub struct RetryOrchestrator {
    config: RetryConfig,
}

impl RetryOrchestrator {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    ///
    /// Fatal errors return after a single invocation. When attempts are
    /// exhausted the last error is returned unchanged.
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.effective_max_attempts();
        let mut attempt = 0;
        loop {
            let err = match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempt = attempt + 1, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if classify(&err) == RetryDecision::Fatal {
                debug!(
                    operation,
                    attempt = attempt + 1,
                    error = %err,
                    "fatal error, not retrying"
                );
                return Err(err);
            }

            let kind = err.provider_kind().map(|k| k.as_str()).unwrap_or("unknown");
            if attempt + 1 >= max_attempts {
                warn!(
                    operation,
                    attempts = attempt + 1,
                    kind,
                    error = %err,
                    "giving up after transient errors"
                );
                return Err(err);
            }

            let delay = self.config.backoff.effective_delay(attempt, err.retry_after());
            metrics::counter!(telemetry::RETRIES_TOTAL,
                "operation" => operation.to_owned(),
                "kind" => kind,
            )
            .increment(1);
            warn!(
                operation,
                attempt = attempt + 1,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                kind,
                error = %err,
                "retrying after transient error"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

// ============================================================================
// RetryingGenerateProvider
// ============================================================================

/// Decorator that wraps a [`GenerateProvider`] with retry logic.
///
/// Retries transient errors with backoff and returns fatal errors
/// immediately.
pub struct RetryingGenerateProvider {
    inner: Arc<dyn GenerateProvider>,
    orchestrator: RetryOrchestrator,
}

impl RetryingGenerateProvider {
    /// Wrap a generate provider with retry logic.
    pub fn new(inner: Arc<dyn GenerateProvider>, config: RetryConfig) -> Self {
        Self {
            inner,
            orchestrator: RetryOrchestrator::new(config),
        }
    }
}

#[async_trait]
impl GenerateProvider for RetryingGenerateProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation> {
        self.orchestrator
            .execute("generate", || self.inner.generate(request))
            .await
    }
}
