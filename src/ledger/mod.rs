//! Cost accounting ledger.
//!
//! [`CostLedger`] prices each completed request with a [`PricingTable`] and
//! folds it into process-wide running totals, overall and per user. State
//! lives in memory for the lifetime of the process.

pub mod pricing;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::telemetry;
use crate::types::TokenUsage;
use crate::types::chars_to_tokens;

pub use pricing::{DEFAULT_COST_PER_TOKEN, ModelPricing, PricingTable};

/// Configuration for the cost ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// Per-user cumulative spend that triggers a `cost_alert`. Default: 1.0 USD.
    pub alert_threshold_usd: f64,
    /// How many recent records to keep for inspection. Default: 1000.
    pub recent_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            alert_threshold_usd: 1.0,
            recent_capacity: 1000,
        }
    }
}

impl LedgerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alert_threshold_usd(mut self, threshold: f64) -> Self {
        self.alert_threshold_usd = threshold;
        self
    }

    pub fn recent_capacity(mut self, n: usize) -> Self {
        self.recent_capacity = n;
        self
    }
}

/// One priced request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub user_id: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost_usd: f64,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

/// Running totals for one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub requests: u64,
    pub tokens: u64,
    pub cost_usd: f64,
}

/// Point-in-time usage snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_requests: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub average_cost_per_request: f64,
    pub model_breakdown: BTreeMap<String, ModelUsage>,
}

#[derive(Debug, Default)]
struct Totals {
    requests: u64,
    tokens: u64,
    cost_usd: f64,
    by_model: BTreeMap<String, ModelUsage>,
}

impl Totals {
    fn add(&mut self, record: &UsageRecord) {
        self.requests += 1;
        self.tokens += u64::from(record.total_tokens);
        self.cost_usd += record.cost_usd;
        let model = self.by_model.entry(record.model.clone()).or_default();
        model.requests += 1;
        model.tokens += u64::from(record.total_tokens);
        model.cost_usd += record.cost_usd;
    }

    fn summary(&self) -> UsageSummary {
        UsageSummary {
            total_requests: self.requests,
            total_tokens: self.tokens,
            total_cost_usd: round_usd(self.cost_usd),
            average_cost_per_request: round_usd(self.cost_usd / self.requests.max(1) as f64),
            model_breakdown: self
                .by_model
                .iter()
                .map(|(model, usage)| {
                    (
                        model.clone(),
                        ModelUsage {
                            cost_usd: round_usd(usage.cost_usd),
                            ..usage.clone()
                        },
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    overall: Totals,
    per_user: HashMap<String, Totals>,
    recent: VecDeque<UsageRecord>,
}

/// Round a USD amount to six decimal places.
pub fn round_usd(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Process-wide usage and cost accounting.
pub struct CostLedger {
    pricing: PricingTable,
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<LedgerState>,
}

impl CostLedger {
    pub fn new(pricing: PricingTable, config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            pricing,
            config,
            clock,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Cost of a request without recording it.
    pub fn quote(&self, model: &str, usage: &TokenUsage) -> f64 {
        self.pricing.cost(model, usage)
    }

    /// Pre-flight estimate at four characters per token.
    pub fn estimate_cost(&self, model: &str, prompt_chars: usize, completion_chars: usize) -> f64 {
        let usage = TokenUsage::new(chars_to_tokens(prompt_chars), chars_to_tokens(completion_chars));
        self.quote(model, &usage)
    }

    /// Price a request and add it to the running totals.
    pub fn record(
        &self,
        user_id: &str,
        model: &str,
        usage: TokenUsage,
        request_id: &str,
    ) -> UsageRecord {
        let cost_usd = self.quote(model, &usage);
        let record = UsageRecord {
            user_id: user_id.to_string(),
            model: model.to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            cost_usd,
            timestamp: DateTime::from_timestamp_millis(self.clock.now_millis() as i64)
                .unwrap_or_default(),
            request_id: request_id.to_string(),
        };

        let (user_before, user_after) = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.overall.add(&record);
            let user = state.per_user.entry(record.user_id.clone()).or_default();
            let before = user.cost_usd;
            user.add(&record);
            let after = user.cost_usd;
            if self.config.recent_capacity > 0 {
                if state.recent.len() >= self.config.recent_capacity {
                    state.recent.pop_front();
                }
                state.recent.push_back(record.clone());
            }
            (before, after)
        };

        metrics::counter!(telemetry::TOKENS_TOTAL,
            "model" => model.to_owned(),
            "direction" => "prompt",
        )
        .increment(u64::from(usage.prompt_tokens));
        metrics::counter!(telemetry::TOKENS_TOTAL,
            "model" => model.to_owned(),
            "direction" => "completion",
        )
        .increment(u64::from(usage.completion_tokens));
        metrics::counter!(telemetry::COST_MICRO_USD_TOTAL, "model" => model.to_owned())
            .increment((cost_usd * 1_000_000.0).round() as u64);

        info!(
            event = "cost_tracked",
            user_id,
            model,
            total_tokens = usage.total_tokens,
            cost_usd = round_usd(cost_usd),
            request_id,
            "cost tracked"
        );

        let threshold = self.config.alert_threshold_usd;
        if user_before <= threshold && user_after > threshold {
            warn!(
                event = "cost_alert",
                user_id,
                cost_usd = round_usd(user_after),
                threshold_usd = threshold,
                "cost threshold exceeded"
            );
        }

        record
    }

    /// Totals across all users.
    pub fn summary(&self) -> UsageSummary {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.overall.summary()
    }

    /// Totals for one user; zeros for a user with no records.
    pub fn user_summary(&self, user_id: &str) -> UsageSummary {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .per_user
            .get(user_id)
            .map(Totals::summary)
            .unwrap_or_default()
    }

    /// Most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<UsageRecord> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.recent.iter().rev().take(limit).cloned().collect()
    }
}
