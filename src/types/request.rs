//! Normalized generation request.

use serde::{Deserialize, Serialize};

use crate::{HeimdallError, Result};

/// Model used when a request names none.
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Sampling temperature used when a request specifies none.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Longest accepted prompt, in characters.
pub const MAX_PROMPT_CHARS: usize = 10_000;

/// Largest accepted `max_tokens`.
pub const MAX_MAX_TOKENS: u32 = 4_000;

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

/// A generation request as seen by the gateway.
///
/// ```rust
/// # use heimdall::GenerateRequest;
/// let request = GenerateRequest::new("Summarize this", "alice")
///     .model("gpt-3.5-turbo")
///     .temperature(0.2)
///     .max_tokens(256);
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature (0.0 to 2.0).
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub user_id: String,
    /// Correlation id; the gateway assigns one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl GenerateRequest {
    /// Create a request with the default model and temperature.
    pub fn new(prompt: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: default_model(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            user_id: user_id.into(),
            request_id: None,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Check field bounds.
    ///
    /// Model membership is not checked here; providers reject models
    /// they cannot serve.
    pub fn validate(&self) -> Result<()> {
        let prompt_chars = self.prompt.chars().count();
        if prompt_chars == 0 {
            return Err(HeimdallError::InvalidInput("prompt must not be empty".into()));
        }
        if prompt_chars > MAX_PROMPT_CHARS {
            return Err(HeimdallError::InvalidInput(format!(
                "prompt is {prompt_chars} characters, maximum is {MAX_PROMPT_CHARS}"
            )));
        }
        if self.model.trim().is_empty() {
            return Err(HeimdallError::InvalidInput("model must not be empty".into()));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(HeimdallError::InvalidInput(format!(
                "temperature {} is outside [0, 2]",
                self.temperature
            )));
        }
        if let Some(max_tokens) = self.max_tokens
            && !(1..=MAX_MAX_TOKENS).contains(&max_tokens)
        {
            return Err(HeimdallError::InvalidInput(format!(
                "max_tokens {max_tokens} is outside [1, {MAX_MAX_TOKENS}]"
            )));
        }
        if self.user_id.trim().is_empty() {
            return Err(HeimdallError::InvalidInput("user_id must not be empty".into()));
        }
        Ok(())
    }
}
