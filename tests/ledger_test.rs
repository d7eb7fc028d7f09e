use std::sync::Arc;

use heimdall::ledger::round_usd;
use heimdall::{CostLedger, LedgerConfig, ManualClock, PricingTable, TokenUsage};

const EPSILON: f64 = 1e-9;

fn ledger() -> CostLedger {
    CostLedger::new(
        PricingTable::new(),
        LedgerConfig::new(),
        Arc::new(ManualClock::from_secs(1_700_000_000)),
    )
}

#[test]
fn record_prices_total_tokens() {
    let ledger = ledger();
    let record = ledger.record("alice", "gpt-4", TokenUsage::new(100, 50), "req-1");
    assert!((record.cost_usd - 150.0 * 0.000_03).abs() < EPSILON);
    assert_eq!(record.total_tokens, 150);
    assert_eq!(record.request_id, "req-1");
    assert_eq!(record.timestamp.timestamp(), 1_700_000_000);
}

#[test]
fn unknown_model_uses_default_rate() {
    let ledger = ledger();
    let record = ledger.record("alice", "some-new-model", TokenUsage::new(10, 0), "r");
    assert!((record.cost_usd - 10.0 * 0.000_03).abs() < EPSILON);
}

#[test]
fn summary_aggregates_by_model() {
    let ledger = ledger();
    ledger.record("alice", "gpt-4", TokenUsage::new(100, 100), "r1");
    ledger.record("bob", "gpt-3.5-turbo", TokenUsage::new(500, 500), "r2");
    ledger.record("alice", "gpt-4", TokenUsage::new(50, 50), "r3");

    let summary = ledger.summary();
    assert_eq!(summary.total_requests, 3);
    assert_eq!(summary.total_tokens, 1300);
    // 300 * 0.00003 + 1000 * 0.000002
    assert!((summary.total_cost_usd - 0.011).abs() < EPSILON);
    assert!((summary.average_cost_per_request - round_usd(0.011 / 3.0)).abs() < EPSILON);

    let gpt4 = &summary.model_breakdown["gpt-4"];
    assert_eq!(gpt4.requests, 2);
    assert_eq!(gpt4.tokens, 300);
    let gpt35 = &summary.model_breakdown["gpt-3.5-turbo"];
    assert_eq!(gpt35.requests, 1);
    assert!((gpt35.cost_usd - 0.002).abs() < EPSILON);
}

#[test]
fn user_summary_is_scoped() {
    let ledger = ledger();
    ledger.record("alice", "gpt-4", TokenUsage::new(10, 10), "r1");
    ledger.record("bob", "gpt-4", TokenUsage::new(30, 30), "r2");

    let alice = ledger.user_summary("alice");
    assert_eq!(alice.total_requests, 1);
    assert_eq!(alice.total_tokens, 20);

    let nobody = ledger.user_summary("carol");
    assert_eq!(nobody.total_requests, 0);
    assert_eq!(nobody.total_cost_usd, 0.0);
    assert!(nobody.model_breakdown.is_empty());
}

#[test]
fn quote_does_not_record() {
    let ledger = ledger();
    let cost = ledger.quote("gpt-4", &TokenUsage::new(1000, 0));
    assert!((cost - 0.03).abs() < EPSILON);
    assert_eq!(ledger.summary().total_requests, 0);
}

#[test]
fn estimate_uses_four_chars_per_token() {
    let ledger = ledger();
    // 400 chars -> 100 tokens, 200 chars -> 50 tokens
    let cost = ledger.estimate_cost("gpt-3.5-turbo", 400, 200);
    assert!((cost - 150.0 * 0.000_002).abs() < EPSILON);
}

#[test]
fn money_is_rounded_to_six_decimals() {
    let ledger = CostLedger::new(
        PricingTable::empty().default_rate(0.000_000_1),
        LedgerConfig::new(),
        Arc::new(ManualClock::from_secs(0)),
    );
    ledger.record("alice", "m", TokenUsage::new(3, 0), "r");
    let summary = ledger.summary();
    assert_eq!(summary.total_cost_usd, 0.0);
    assert_eq!(summary.average_cost_per_request, 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_records_are_not_lost() {
    let ledger = Arc::new(ledger());
    let handles: Vec<_> = (0..64)
        .map(|i| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                let user = if i % 2 == 0 { "alice" } else { "bob" };
                ledger.record(user, "gpt-4", TokenUsage::new(7, 3), &format!("r{i}"));
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let summary = ledger.summary();
    assert_eq!(summary.total_requests, 64);
    assert_eq!(summary.total_tokens, 640);
    assert!((summary.total_cost_usd - round_usd(640.0 * 0.000_03)).abs() < EPSILON);
    assert_eq!(ledger.user_summary("alice").total_requests, 32);
    assert_eq!(ledger.user_summary("bob").total_requests, 32);
    assert_eq!(ledger.recent(usize::MAX).len(), 64);
}

#[test]
fn models_listing_includes_builtin_rates() {
    let models = PricingTable::new().models();
    let names: Vec<_> = models.iter().map(|m| m.model.as_str()).collect();
    assert!(names.contains(&"gpt-4"));
    assert!(names.contains(&"claude-3-haiku"));
    let gpt35 = models.iter().find(|m| m.model == "gpt-3.5-turbo").unwrap();
    assert!((gpt35.cost_per_1k_tokens - 0.002).abs() < EPSILON);
}
