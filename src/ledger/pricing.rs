//! Static per-model pricing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::TokenUsage;

/// Rate applied to models missing from the table, in USD per token.
pub const DEFAULT_COST_PER_TOKEN: f64 = 0.000_03;

const BUILTIN_RATES: &[(&str, f64)] = &[
    ("gpt-4", 0.000_03),
    ("gpt-4-turbo", 0.000_03),
    ("gpt-3.5-turbo", 0.000_002),
    ("claude-3-opus", 0.000_015),
    ("claude-3-sonnet", 0.000_015),
    ("claude-3-haiku", 0.000_015),
];

/// Pricing entry as listed by [`PricingTable::models`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub model: String,
    pub cost_per_token: f64,
    pub cost_per_1k_tokens: f64,
}

/// Per-token USD rates by model.
///
/// Unknown models fall back to a conservative default rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    rates: BTreeMap<String, f64>,
    default_rate: f64,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            rates: BUILTIN_RATES
                .iter()
                .map(|(model, rate)| (model.to_string(), *rate))
                .collect(),
            default_rate: DEFAULT_COST_PER_TOKEN,
        }
    }
}

impl PricingTable {
    /// Table with the built-in rates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with no model rates; everything is billed at the default rate.
    pub fn empty() -> Self {
        Self {
            rates: BTreeMap::new(),
            default_rate: DEFAULT_COST_PER_TOKEN,
        }
    }

    /// Add or replace a model rate.
    pub fn with_rate(mut self, model: impl Into<String>, cost_per_token: f64) -> Self {
        self.rates.insert(model.into(), cost_per_token);
        self
    }

    pub fn default_rate(mut self, cost_per_token: f64) -> Self {
        self.default_rate = cost_per_token;
        self
    }

    /// Rate applied to models without an entry.
    pub fn fallback_rate(&self) -> f64 {
        self.default_rate
    }

    pub fn cost_per_token(&self, model: &str) -> f64 {
        self.rates.get(model).copied().unwrap_or(self.default_rate)
    }

    /// Cost of a request's total tokens.
    pub fn cost(&self, model: &str, usage: &TokenUsage) -> f64 {
        f64::from(usage.total_tokens) * self.cost_per_token(model)
    }

    /// Priced models, sorted by name.
    pub fn models(&self) -> Vec<ModelPricing> {
        self.rates
            .iter()
            .map(|(model, rate)| ModelPricing {
                model: model.clone(),
                cost_per_token: *rate,
                cost_per_1k_tokens: rate * 1000.0,
            })
            .collect()
    }
}
