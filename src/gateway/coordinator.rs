//! Request lifecycle: cache, admission, upstream call, accounting.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use super::GatewayBuilder;
use crate::cache::{CacheEntry, CacheStats, CachedPayload, RequestParams, ResponseCache};
use crate::clock::Clock;
use crate::ledger::{CostLedger, ModelPricing, UsageRecord, UsageSummary};
use crate::providers::{GenerateProvider, RetryOrchestrator};
use crate::ratelimit::{Admission, RateLimitConfig, RateLimitStatus, SlidingWindowLimiter};
use crate::types::{GenerateRequest, GenerateResponse, Generation, TokenUsage};
use crate::{HeimdallError, Result, telemetry};

/// Retry settings as reported by [`Gateway::admin_summary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_secs: f64,
    pub max_delay_secs: f64,
    pub jitter: bool,
}

/// Operational snapshot of the whole gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminSummary {
    pub cache: CacheStats,
    pub costs: UsageSummary,
    pub rate_limits: RateLimitConfig,
    pub retry: RetrySettings,
    pub timestamp: DateTime<Utc>,
}

/// Admission and resilience layer in front of a [`GenerateProvider`].
///
/// Every generate request goes through the same fixed sequence: cache
/// lookup, short then long window admission, the upstream call under the
/// retry orchestrator, then cache store and ledger record. A cache hit
/// short-circuits everything after the lookup.
///
/// `Gateway` is `Send + Sync`; share it behind an `Arc`.
pub struct Gateway {
    provider: Arc<dyn GenerateProvider>,
    cache: ResponseCache,
    limiter: SlidingWindowLimiter,
    retry: RetryOrchestrator,
    ledger: CostLedger,
    clock: Arc<dyn Clock>,
}

impl Gateway {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    pub(crate) fn new(
        provider: Arc<dyn GenerateProvider>,
        cache: ResponseCache,
        limiter: SlidingWindowLimiter,
        retry: RetryOrchestrator,
        ledger: CostLedger,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            cache,
            limiter,
            retry,
            ledger,
            clock,
        }
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    /// Handle one generate request end to end.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, model = %request.model))]
    pub async fn handle_generate(&self, mut request: GenerateRequest) -> Result<GenerateResponse> {
        let start = Instant::now();
        let request_id = request
            .request_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();

        let result = self.run(&request, &request_id, start).await;
        match &result {
            Ok(response) => {
                let status = if response.cached { "cached" } else { "ok" };
                Self::record_request(status, start);
                telemetry::response_generated(
                    &request.user_id,
                    &response.model,
                    response.total_tokens,
                    response.cost_usd,
                    response.latency_ms,
                    response.cached,
                    &request_id,
                );
            }
            Err(HeimdallError::RateLimitExceeded { .. }) => {
                Self::record_request("rate_limited", start);
            }
            Err(e) => {
                Self::record_request("error", start);
                telemetry::request_failed(
                    &request.user_id,
                    e.error_type(),
                    &e.to_string(),
                    &request_id,
                );
            }
        }
        result
    }

    async fn run(
        &self,
        request: &GenerateRequest,
        request_id: &str,
        start: Instant,
    ) -> Result<GenerateResponse> {
        telemetry::request_received(
            &request.user_id,
            &request.model,
            request.temperature,
            request_id,
        );
        request.validate()?;

        let fingerprint = RequestParams::from_request(request).fingerprint()?;
        match self.cache.lookup(&fingerprint).await {
            Ok(Some(entry)) => {
                telemetry::cache_hit(&request.user_id, fingerprint.as_str());
                return Ok(Self::cached_response(entry, request_id, start));
            }
            Ok(None) => {}
            Err(e) => telemetry::store_degraded("cache", &e.to_string()),
        }

        self.admit(&request.user_id).await?;

        let generation = self
            .retry
            .execute("generate", || self.provider.generate(request))
            .await
            .map_err(|e| self.upstream_error(e))?;

        let Generation {
            completion,
            model,
            usage,
        } = generation;
        let usage = usage.unwrap_or_else(|| TokenUsage::estimate(&request.prompt, &completion));
        let cost_usd = self.ledger.quote(&request.model, &usage);

        let payload = CachedPayload {
            completion,
            model,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            cost_usd,
        };
        if let Err(e) = self.cache.store(&fingerprint, payload.clone(), None).await {
            telemetry::store_degraded("cache", &e.to_string());
        }

        self.ledger
            .record(&request.user_id, &request.model, usage, request_id);

        Ok(GenerateResponse {
            completion: payload.completion,
            model: payload.model,
            prompt_tokens: payload.prompt_tokens,
            completion_tokens: payload.completion_tokens,
            total_tokens: payload.total_tokens,
            cost_usd: payload.cost_usd,
            request_id: request_id.to_string(),
            cached: false,
            latency_ms: elapsed_ms(start),
        })
    }

    /// Short window first, then long. Store failures admit the request.
    async fn admit(&self, user_id: &str) -> Result<()> {
        match self.limiter.admit_request(user_id).await {
            Ok(Admission::Allowed) => Ok(()),
            Ok(Admission::Denied {
                window_secs,
                retry_after_secs,
            }) => {
                let window = self.limiter.window_label(window_secs);
                metrics::counter!(telemetry::RATE_LIMITED_TOTAL, "window" => window.clone())
                    .increment(1);
                telemetry::rate_limit_exceeded(user_id, &window, retry_after_secs);
                Err(HeimdallError::RateLimitExceeded {
                    window,
                    retry_after_secs,
                })
            }
            Err(e) => {
                telemetry::store_degraded("rate_limiter", &e.to_string());
                Ok(())
            }
        }
    }

    /// Transient failures that survive every attempt become `Upstream`.
    fn upstream_error(&self, error: HeimdallError) -> HeimdallError {
        if error.is_transient() {
            HeimdallError::Upstream {
                attempts: self.retry.config().effective_max_attempts(),
                source: Box::new(error),
            }
        } else {
            error
        }
    }

    fn cached_response(entry: CacheEntry, request_id: &str, start: Instant) -> GenerateResponse {
        let payload = entry.payload;
        GenerateResponse {
            completion: payload.completion,
            model: payload.model,
            prompt_tokens: payload.prompt_tokens,
            completion_tokens: payload.completion_tokens,
            total_tokens: payload.total_tokens,
            cost_usd: payload.cost_usd,
            request_id: request_id.to_string(),
            cached: true,
            latency_ms: elapsed_ms(start),
        }
    }

    fn record_request(status: &'static str, start: Instant) {
        metrics::counter!(telemetry::REQUESTS_TOTAL, "status" => status).increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "status" => status)
            .record(start.elapsed().as_secs_f64());
    }

    // ========================================================================
    // Administrative operations
    // ========================================================================

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Drop every cached response, returning how many were removed.
    pub async fn clear_cache(&self) -> Result<u64> {
        self.cache.clear().await
    }

    pub async fn rate_limit_status(&self, user_id: &str) -> Result<RateLimitStatus> {
        self.limiter.status(user_id).await
    }

    /// Forget a user's rate-limit counters.
    pub async fn reset_rate_limit(&self, user_id: &str) -> Result<u64> {
        self.limiter.reset(user_id).await
    }

    /// Usage totals for one user, or for everyone when `user_id` is `None`.
    pub fn usage_summary(&self, user_id: Option<&str>) -> UsageSummary {
        match user_id {
            Some(user_id) => self.ledger.user_summary(user_id),
            None => self.ledger.summary(),
        }
    }

    /// Most recent usage records, newest first.
    pub fn recent_usage(&self, limit: usize) -> Vec<UsageRecord> {
        self.ledger.recent(limit)
    }

    pub fn models(&self) -> Vec<ModelPricing> {
        self.ledger.pricing().models()
    }

    pub fn estimate_cost(&self, model: &str, prompt_chars: usize, completion_chars: usize) -> f64 {
        self.ledger
            .estimate_cost(model, prompt_chars, completion_chars)
    }

    pub async fn admin_summary(&self) -> AdminSummary {
        let retry = self.retry.config();
        AdminSummary {
            cache: self.cache.stats().await,
            costs: self.ledger.summary(),
            rate_limits: *self.limiter.config(),
            retry: RetrySettings {
                max_attempts: retry.max_attempts,
                base_delay_secs: retry.backoff.base_delay.as_secs_f64(),
                max_delay_secs: retry.backoff.max_delay.as_secs_f64(),
                jitter: retry.backoff.jitter,
            },
            timestamp: DateTime::from_timestamp_millis(self.clock.now_millis() as i64)
                .unwrap_or_default(),
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
