//! Provider results and gateway responses.

use serde::{Deserialize, Serialize};

/// Characters per token used when a provider reports no usage.
const CHARS_PER_TOKEN: usize = 4;

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// Rough usage estimate at four characters per token.
    pub fn estimate(prompt: &str, completion: &str) -> Self {
        Self::new(estimate_tokens(prompt), estimate_tokens(completion))
    }
}

/// Estimate a token count from text length.
fn estimate_tokens(text: &str) -> u32 {
    chars_to_tokens(text.chars().count())
}

pub(crate) fn chars_to_tokens(chars: usize) -> u32 {
    u32::try_from(chars / CHARS_PER_TOKEN).unwrap_or(u32::MAX)
}

/// What a provider returns for one successful generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub completion: String,
    pub model: String,
    /// Provider-reported usage, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl Generation {
    pub fn new(completion: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            completion: completion.into(),
            model: model.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Gateway response for a generate request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub completion: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost_usd: f64,
    pub request_id: String,
    /// Whether the response was served from the cache.
    pub cached: bool,
    pub latency_ms: f64,
}
