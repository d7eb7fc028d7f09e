//! Telemetry metric names and structured event helpers.
//!
//! Consumers install their own `metrics` recorder (e.g. prometheus, statsd);
//! without a recorder installed, all metric calls are no-ops. Structured
//! events go through `tracing` and carry an `event` field so log pipelines
//! can filter on it.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `heimdall_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `operation` — retried operation name (e.g. "generate")
//! - `status` — outcome: "ok", "cached", "rate_limited" or "error"
//! - `window` — rate limit window, e.g. "60s"
//! - `model` — model identifier
//! - `direction` — token direction: "prompt" or "completion"

use tracing::{info, warn};

/// Total generate requests handled by the gateway.
///
/// Labels: `status`.
pub const REQUESTS_TOTAL: &str = "heimdall_requests_total";

/// End-to-end request duration in seconds.
///
/// Labels: `status`.
pub const REQUEST_DURATION_SECONDS: &str = "heimdall_request_duration_seconds";

/// Total retry attempts (not counting the initial call).
///
/// Labels: `operation`, `kind`.
pub const RETRIES_TOTAL: &str = "heimdall_retries_total";

/// Total cache hits.
pub const CACHE_HITS_TOTAL: &str = "heimdall_cache_hits_total";

/// Total cache misses.
pub const CACHE_MISSES_TOTAL: &str = "heimdall_cache_misses_total";

/// Total requests denied by the rate limiter.
///
/// Labels: `window`.
pub const RATE_LIMITED_TOTAL: &str = "heimdall_rate_limited_total";

/// Total backing store failures that were degraded (fail-open / miss).
///
/// Labels: `component` ("cache" | "rate_limiter").
pub const STORE_ERRORS_TOTAL: &str = "heimdall_store_errors_total";

/// Total tokens recorded by the ledger.
///
/// Labels: `model`, `direction` ("prompt" | "completion").
pub const TOKENS_TOTAL: &str = "heimdall_tokens_total";

/// Total cost recorded by the ledger, in micro-dollars.
///
/// Labels: `model`.
pub const COST_MICRO_USD_TOTAL: &str = "heimdall_cost_micro_usd_total";

// ============================================================================
// Structured events
// ============================================================================

pub(crate) fn request_received(user_id: &str, model: &str, temperature: f64, request_id: &str) {
    info!(
        event = "request_received",
        user_id,
        model,
        temperature,
        request_id,
        "request received"
    );
}

pub(crate) fn response_generated(
    user_id: &str,
    model: &str,
    total_tokens: u32,
    cost_usd: f64,
    latency_ms: f64,
    cached: bool,
    request_id: &str,
) {
    info!(
        event = "response_generated",
        user_id,
        model,
        total_tokens,
        cost_usd,
        latency_ms,
        cached,
        request_id,
        "response generated"
    );
}

pub(crate) fn request_failed(user_id: &str, error_type: &str, error: &str, request_id: &str) {
    warn!(
        event = "request_failed",
        user_id,
        error_type,
        error,
        request_id,
        "request failed"
    );
}

pub(crate) fn rate_limit_exceeded(user_id: &str, window: &str, retry_after_secs: u64) {
    warn!(
        event = "rate_limit_exceeded",
        user_id,
        window,
        retry_after_secs,
        "rate limit exceeded"
    );
}

pub(crate) fn cache_hit(user_id: &str, fingerprint: &str) {
    info!(event = "cache_hit", user_id, fingerprint, "cache hit");
}

/// Warning-level signal for a degraded (fail-open) backing store path.
pub(crate) fn store_degraded(component: &'static str, error: &str) {
    metrics::counter!(STORE_ERRORS_TOTAL, "component" => component).increment(1);
    warn!(
        event = "store_degraded",
        component,
        error,
        "backing store unavailable, degrading"
    );
}
