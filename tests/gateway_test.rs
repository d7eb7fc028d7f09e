//! End-to-end tests for the gateway request lifecycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use heimdall::config::Config;
use heimdall::{
    CacheConfig, Gateway, GatewayBuilder, GenerateProvider, GenerateRequest, Generation,
    HeimdallError, KvStore, ManualClock, ProviderErrorKind, RateLimitConfig, Result, RetryConfig,
    TokenUsage,
};

const T0: u64 = 1_699_999_200;
const EPSILON: f64 = 1e-9;

// ============================================================================
// Mocks
// ============================================================================

/// Provider that fails `failures` times with `fail_with`, then echoes the prompt.
struct ScriptedProvider {
    failures: AtomicU32,
    fail_with: fn() -> HeimdallError,
    usage: Option<TokenUsage>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    fn ok() -> Self {
        Self::failing(0, || HeimdallError::NoProvider)
    }

    fn failing(failures: u32, fail_with: fn() -> HeimdallError) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            fail_with,
            usage: Some(TokenUsage::new(10, 20)),
            calls: AtomicU32::new(0),
        }
    }

    fn without_usage(mut self) -> Self {
        self.usage = None;
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerateProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err((self.fail_with)());
        }
        let generation = Generation::new(format!("echo: {}", request.prompt), &request.model);
        Ok(match self.usage {
            Some(usage) => generation.with_usage(usage),
            None => generation,
        })
    }
}

/// Store whose every operation fails.
struct FailingStore;

#[async_trait]
impl KvStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(HeimdallError::Store("connection refused".into()))
    }
    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Err(HeimdallError::Store("connection refused".into()))
    }
    async fn incr_ex(&self, _key: &str, _ttl: Duration) -> Result<u64> {
        Err(HeimdallError::Store("connection refused".into()))
    }
    async fn keys(&self, _prefix: &str) -> Result<Vec<String>> {
        Err(HeimdallError::Store("connection refused".into()))
    }
    async fn delete(&self, _keys: &[String]) -> Result<u64> {
        Err(HeimdallError::Store("connection refused".into()))
    }
    async fn ping(&self) -> Result<()> {
        Err(HeimdallError::Store("connection refused".into()))
    }
}

fn rate_limited() -> HeimdallError {
    HeimdallError::provider(ProviderErrorKind::RateLimited, "429 too many requests")
}

fn builder(provider: Arc<ScriptedProvider>) -> (Arc<ManualClock>, GatewayBuilder) {
    let clock = Arc::new(ManualClock::from_secs(T0));
    let builder = Gateway::builder()
        .provider(provider)
        .clock(clock.clone())
        .retry(
            RetryConfig::new()
                .max_attempts(3)
                .initial_delay(Duration::from_millis(10))
                .jitter(false),
        );
    (clock, builder)
}

fn gateway(provider: Arc<ScriptedProvider>) -> Gateway {
    builder(provider).1.build().unwrap()
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn retried_then_cached_end_to_end() {
    let provider = Arc::new(ScriptedProvider::failing(1, rate_limited));
    let gateway = gateway(provider.clone());

    let first = gateway
        .handle_generate(GenerateRequest::new("Tell me a joke", "alice"))
        .await
        .unwrap();
    assert!(!first.cached);
    assert_eq!(first.completion, "echo: Tell me a joke");
    assert_eq!(first.total_tokens, 30);
    assert!((first.cost_usd - 30.0 * 0.000_03).abs() < EPSILON);
    assert_eq!(provider.calls(), 2);
    assert_eq!(gateway.usage_summary(None).total_requests, 1);

    let second = gateway
        .handle_generate(GenerateRequest::new("Tell me a joke", "alice"))
        .await
        .unwrap();
    assert!(second.cached);
    assert_eq!(second.completion, first.completion);
    assert_eq!(second.total_tokens, first.total_tokens);
    assert_ne!(second.request_id, first.request_id);
    assert_eq!(provider.calls(), 2, "cache hit must not call the provider");
    assert_eq!(gateway.usage_summary(None).total_requests, 1, "cache hit is free");
}

#[tokio::test]
async fn cache_is_shared_across_users() {
    let provider = Arc::new(ScriptedProvider::ok());
    let gateway = gateway(provider.clone());

    gateway
        .handle_generate(GenerateRequest::new("hi", "alice"))
        .await
        .unwrap();
    let response = gateway
        .handle_generate(GenerateRequest::new("hi", "bob"))
        .await
        .unwrap();
    assert!(response.cached);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn different_parameters_miss_the_cache() {
    let provider = Arc::new(ScriptedProvider::ok());
    let gateway = gateway(provider.clone());

    gateway
        .handle_generate(GenerateRequest::new("hi", "alice"))
        .await
        .unwrap();
    let response = gateway
        .handle_generate(GenerateRequest::new("hi", "alice").temperature(0.1))
        .await
        .unwrap();
    assert!(!response.cached);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn request_id_is_assigned_or_preserved() {
    let gateway = gateway(Arc::new(ScriptedProvider::ok()));

    let assigned = gateway
        .handle_generate(GenerateRequest::new("one", "alice"))
        .await
        .unwrap();
    assert!(uuid::Uuid::parse_str(&assigned.request_id).is_ok());

    let preserved = gateway
        .handle_generate(GenerateRequest::new("two", "alice").request_id("req-42"))
        .await
        .unwrap();
    assert_eq!(preserved.request_id, "req-42");
    assert_eq!(gateway.recent_usage(1)[0].request_id, "req-42");
}

#[tokio::test]
async fn missing_usage_is_estimated() {
    let provider = Arc::new(ScriptedProvider::ok().without_usage());
    let gateway = gateway(provider);

    let prompt = "a".repeat(40);
    let response = gateway
        .handle_generate(GenerateRequest::new(prompt.clone(), "alice"))
        .await
        .unwrap();
    // prompt: 40 chars -> 10 tokens; completion "echo: " + 40 chars -> 11 tokens
    assert_eq!(response.prompt_tokens, 10);
    assert_eq!(response.completion_tokens, 11);
    assert_eq!(response.total_tokens, 21);
}

#[tokio::test]
async fn invalid_request_never_reaches_provider() {
    let provider = Arc::new(ScriptedProvider::ok());
    let gateway = gateway(provider.clone());

    let result = gateway
        .handle_generate(GenerateRequest::new("hi", "alice").temperature(3.0))
        .await;
    assert!(matches!(result, Err(HeimdallError::InvalidInput(_))));
    assert_eq!(provider.calls(), 0);
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test]
async fn rate_limit_denies_before_provider_call() {
    let provider = Arc::new(ScriptedProvider::ok());
    let (_clock, builder) = builder(provider.clone());
    let gateway = builder
        .rate_limits(RateLimitConfig::new().per_minute(2))
        .build()
        .unwrap();

    for prompt in ["a", "b"] {
        gateway
            .handle_generate(GenerateRequest::new(prompt, "alice"))
            .await
            .unwrap();
    }
    let denied = gateway
        .handle_generate(GenerateRequest::new("c", "alice"))
        .await;
    match denied {
        Err(HeimdallError::RateLimitExceeded {
            window,
            retry_after_secs,
        }) => {
            assert_eq!(window, "minute");
            assert_eq!(retry_after_secs, 60);
        }
        other => panic!("expected rate limit error, got {other:?}"),
    }
    assert_eq!(provider.calls(), 2);

    // Other users are unaffected
    assert!(
        gateway
            .handle_generate(GenerateRequest::new("c", "bob"))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn cache_hits_bypass_rate_limit() {
    let provider = Arc::new(ScriptedProvider::ok());
    let (_clock, builder) = builder(provider.clone());
    let gateway = builder
        .rate_limits(RateLimitConfig::new().per_minute(1))
        .build()
        .unwrap();

    for _ in 0..5 {
        gateway
            .handle_generate(GenerateRequest::new("same", "alice"))
            .await
            .unwrap();
    }
    assert_eq!(provider.calls(), 1);
    assert_eq!(gateway.rate_limit_status("alice").await.unwrap().short_count, 1);
}

#[tokio::test]
async fn rate_limit_status_and_reset() {
    let provider = Arc::new(ScriptedProvider::ok());
    let (_clock, builder) = builder(provider);
    let gateway = builder
        .rate_limits(RateLimitConfig::new().per_minute(1))
        .build()
        .unwrap();

    gateway
        .handle_generate(GenerateRequest::new("a", "alice"))
        .await
        .unwrap();
    assert!(
        gateway
            .handle_generate(GenerateRequest::new("b", "alice"))
            .await
            .is_err()
    );

    let status = gateway.rate_limit_status("alice").await.unwrap();
    assert_eq!(status.short_count, 2);
    assert_eq!(status.short_limit, 1);

    gateway.reset_rate_limit("alice").await.unwrap();
    assert!(
        gateway
            .handle_generate(GenerateRequest::new("b", "alice"))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn budget_returns_after_window_elapses() {
    let provider = Arc::new(ScriptedProvider::ok());
    let (clock, builder) = builder(provider);
    let gateway = builder
        .rate_limits(RateLimitConfig::new().per_minute(1))
        .build()
        .unwrap();

    gateway
        .handle_generate(GenerateRequest::new("a", "alice"))
        .await
        .unwrap();
    assert!(
        gateway
            .handle_generate(GenerateRequest::new("b", "alice"))
            .await
            .is_err()
    );
    clock.advance(Duration::from_secs(120));
    assert!(
        gateway
            .handle_generate(GenerateRequest::new("b", "alice"))
            .await
            .is_ok()
    );
}

// ============================================================================
// Upstream failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn exhausted_transient_failure_is_upstream_error() {
    let provider = Arc::new(ScriptedProvider::failing(100, rate_limited));
    let gateway = gateway(provider.clone());

    let result = gateway
        .handle_generate(GenerateRequest::new("hi", "alice"))
        .await;
    match result {
        Err(HeimdallError::Upstream { attempts, source }) => {
            assert_eq!(attempts, 3);
            assert_eq!(source.provider_kind(), Some(ProviderErrorKind::RateLimited));
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
    assert_eq!(provider.calls(), 3);
    assert_eq!(gateway.usage_summary(None).total_requests, 0);
    assert_eq!(gateway.cache_stats().await.total_items, Some(0));
}

#[tokio::test(start_paused = true)]
async fn fatal_failure_is_returned_unchanged() {
    let provider = Arc::new(ScriptedProvider::failing(1, || {
        HeimdallError::provider(ProviderErrorKind::Fatal, "model not supported")
    }));
    let gateway = gateway(provider.clone());

    let result = gateway
        .handle_generate(GenerateRequest::new("hi", "alice").model("gpt-9"))
        .await;
    assert!(matches!(
        result,
        Err(HeimdallError::Provider {
            kind: ProviderErrorKind::Fatal,
            ..
        })
    ));
    assert_eq!(provider.calls(), 1);
}

// ============================================================================
// Degraded store
// ============================================================================

#[tokio::test]
async fn unreachable_store_fails_open() {
    let provider = Arc::new(ScriptedProvider::ok());
    let (_clock, builder) = builder(provider.clone());
    let gateway = builder
        .store(Arc::new(FailingStore))
        .rate_limits(RateLimitConfig::new().per_minute(1))
        .build()
        .unwrap();

    for _ in 0..3 {
        let response = gateway
            .handle_generate(GenerateRequest::new("hi", "alice"))
            .await
            .unwrap();
        assert!(!response.cached);
    }
    assert_eq!(provider.calls(), 3);
    assert_eq!(gateway.usage_summary(Some("alice")).total_requests, 3);
    assert_eq!(gateway.cache_stats().await.total_items, None);
    assert!(gateway.clear_cache().await.is_err());
}

#[tokio::test]
async fn disabled_cache_always_calls_provider() {
    let provider = Arc::new(ScriptedProvider::ok());
    let (_clock, builder) = builder(provider.clone());
    let gateway = builder.cache(CacheConfig::disabled()).build().unwrap();

    for _ in 0..2 {
        gateway
            .handle_generate(GenerateRequest::new("hi", "alice"))
            .await
            .unwrap();
    }
    assert_eq!(provider.calls(), 2);
}

// ============================================================================
// Administrative operations
// ============================================================================

#[tokio::test]
async fn clear_cache_forces_regeneration() {
    let provider = Arc::new(ScriptedProvider::ok());
    let gateway = gateway(provider.clone());

    gateway
        .handle_generate(GenerateRequest::new("hi", "alice"))
        .await
        .unwrap();
    assert_eq!(gateway.cache_stats().await.total_items, Some(1));
    assert_eq!(gateway.clear_cache().await.unwrap(), 1);

    let response = gateway
        .handle_generate(GenerateRequest::new("hi", "alice"))
        .await
        .unwrap();
    assert!(!response.cached);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn usage_summary_by_user() {
    let gateway = gateway(Arc::new(ScriptedProvider::ok()));
    gateway
        .handle_generate(GenerateRequest::new("a", "alice"))
        .await
        .unwrap();
    gateway
        .handle_generate(GenerateRequest::new("b", "bob").model("gpt-3.5-turbo"))
        .await
        .unwrap();

    let alice = gateway.usage_summary(Some("alice"));
    assert_eq!(alice.total_requests, 1);
    assert!(alice.model_breakdown.contains_key("gpt-4"));

    let all = gateway.usage_summary(None);
    assert_eq!(all.total_requests, 2);
    assert_eq!(all.total_tokens, 60);
}

#[tokio::test]
async fn admin_summary_reports_settings() {
    let gateway = gateway(Arc::new(ScriptedProvider::ok()));
    gateway
        .handle_generate(GenerateRequest::new("a", "alice"))
        .await
        .unwrap();

    let summary = gateway.admin_summary().await;
    assert_eq!(summary.cache.total_items, Some(1));
    assert_eq!(summary.cache.ttl_seconds, 3600);
    assert_eq!(summary.costs.total_requests, 1);
    assert_eq!(summary.rate_limits.short.max_requests, 10);
    assert_eq!(summary.rate_limits.long.max_requests, 100);
    assert_eq!(summary.retry.max_attempts, 3);
    assert_eq!(summary.timestamp.timestamp(), T0 as i64);

    let json = serde_json::to_value(&summary).unwrap();
    assert!(json.get("cache").is_some());
    assert!(json.get("timestamp").is_some());
}

#[tokio::test]
async fn models_and_estimates() {
    let gateway = gateway(Arc::new(ScriptedProvider::ok()));
    assert!(gateway.models().iter().any(|m| m.model == "gpt-4"));
    let cost = gateway.estimate_cost("gpt-4", 400, 400);
    assert!((cost - 200.0 * 0.000_03).abs() < EPSILON);
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn build_without_provider_fails() {
    assert!(matches!(
        Gateway::builder().build(),
        Err(HeimdallError::NoProvider)
    ));
}

#[tokio::test]
async fn builder_from_config() {
    let config = Config::parse(
        r#"
        [rate_limit]
        requests_per_minute = 1

        [cache]
        enabled = false

        [retry]
        max_attempts = 1
    "#,
    )
    .unwrap();
    let provider = Arc::new(ScriptedProvider::failing(1, rate_limited));
    let gateway = GatewayBuilder::from_config(&config)
        .unwrap()
        .provider(provider.clone())
        .build()
        .unwrap();

    let result = gateway
        .handle_generate(GenerateRequest::new("hi", "alice"))
        .await;
    assert!(matches!(
        result,
        Err(HeimdallError::Upstream { attempts: 1, .. })
    ));
    assert_eq!(provider.calls(), 1);

    let denied = gateway
        .handle_generate(GenerateRequest::new("hi", "alice"))
        .await;
    assert!(matches!(
        denied,
        Err(HeimdallError::RateLimitExceeded { .. })
    ));
    assert!(!gateway.cache_stats().await.enabled);
}
