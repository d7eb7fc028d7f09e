use std::time::Duration;

use heimdall::providers::{BackoffPolicy, RetryDecision, classify};
use heimdall::{HeimdallError, ProviderErrorKind, RetryConfig};

#[test]
fn backoff_defaults() {
    let policy = BackoffPolicy::default();
    assert_eq!(policy.base_delay, Duration::from_secs(1));
    assert_eq!(policy.max_delay, Duration::from_secs(60));
    assert!(policy.jitter);
}

#[test]
fn retry_config_defaults() {
    let config = RetryConfig::default();
    assert_eq!(config.max_attempts, 3);
    assert_eq!(config.backoff, BackoffPolicy::default());
}

#[test]
fn retry_config_builder() {
    let config = RetryConfig::new()
        .max_attempts(5)
        .initial_delay(Duration::from_millis(100))
        .max_delay(Duration::from_secs(10))
        .jitter(false);

    assert_eq!(config.max_attempts, 5);
    assert_eq!(config.backoff.base_delay, Duration::from_millis(100));
    assert_eq!(config.backoff.max_delay, Duration::from_secs(10));
    assert!(!config.backoff.jitter);
}

#[test]
fn retry_config_disabled() {
    assert_eq!(RetryConfig::disabled().max_attempts, 1);
    assert_eq!(RetryConfig::new().max_attempts(0).effective_max_attempts(), 1);
}

#[test]
fn delay_grows_exponentially() {
    let policy = BackoffPolicy::new()
        .base_delay(Duration::from_millis(250))
        .jitter(false);

    // 250ms, 500ms, 1s, 2s, ...
    assert_eq!(policy.next_delay(0), Duration::from_millis(250));
    assert_eq!(policy.next_delay(1), Duration::from_millis(500));
    assert_eq!(policy.next_delay(2), Duration::from_secs(1));
    assert_eq!(policy.next_delay(3), Duration::from_secs(2));
}

#[test]
fn delay_capped_at_max() {
    let policy = BackoffPolicy::new()
        .base_delay(Duration::from_secs(1))
        .max_delay(Duration::from_secs(5))
        .jitter(false);

    // attempt 3 = 1 * 2^3 = 8s, but capped at 5s
    assert_eq!(policy.next_delay(3), Duration::from_secs(5));
    assert_eq!(policy.delay_for_attempt(30), Duration::from_secs(5));
}

#[test]
fn jittered_delay_stays_within_bounds() {
    let policy = BackoffPolicy::new();
    for attempt in 0..5u32 {
        let nominal = 2f64.powi(attempt as i32);
        for _ in 0..200 {
            let delay = policy.next_delay(attempt).as_secs_f64();
            assert!(delay >= 0.5 * nominal - 1e-9, "attempt {attempt}: {delay}");
            assert!(delay < 1.5 * nominal + 1e-9, "attempt {attempt}: {delay}");
            assert!(delay <= 60.0);
        }
    }
}

#[test]
fn jittered_delay_never_exceeds_cap() {
    let policy = BackoffPolicy::new();
    for _ in 0..200 {
        assert!(policy.next_delay(10) <= Duration::from_secs(60));
    }
}

#[test]
fn retry_after_hint_replaces_computed_delay() {
    let policy = BackoffPolicy::new().jitter(false);
    assert_eq!(
        policy.effective_delay(0, Some(Duration::from_secs(7))),
        Duration::from_secs(7)
    );
    assert_eq!(
        policy.effective_delay(0, Some(Duration::from_secs(600))),
        Duration::from_secs(60)
    );
    assert_eq!(policy.effective_delay(1, None), Duration::from_secs(2));
}

#[test]
fn classification() {
    let cases = [
        (ProviderErrorKind::RateLimited, RetryDecision::Retryable),
        (ProviderErrorKind::Timeout, RetryDecision::Retryable),
        (ProviderErrorKind::ServerError, RetryDecision::Retryable),
        (ProviderErrorKind::NetworkError, RetryDecision::Retryable),
        (ProviderErrorKind::Fatal, RetryDecision::Fatal),
    ];
    for (kind, expected) in cases {
        assert_eq!(classify(&HeimdallError::provider(kind, "x")), expected);
    }
    assert_eq!(
        classify(&HeimdallError::from_provider_message("503 Service Unavailable")),
        RetryDecision::Retryable
    );
    assert_eq!(
        classify(&HeimdallError::from_provider_message("Invalid API key")),
        RetryDecision::Fatal
    );
}
