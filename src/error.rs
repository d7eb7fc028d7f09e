//! Heimdall error types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Classification attached to every provider failure.
///
/// Provider clients tag their errors with one of these kinds so retry
/// decisions never depend on inspecting error text at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Provider-side throttling (HTTP 429).
    RateLimited,
    /// The call did not complete in time.
    Timeout,
    /// 5xx from the provider.
    ServerError,
    /// Connection refused/reset, DNS failure and similar.
    NetworkError,
    /// Bad request, authentication, unsupported model, ...
    Fatal,
}

/// Markers that identify a transient failure when only a description is available.
const TRANSIENT_MARKERS: &[(&str, ProviderErrorKind)] = &[
    ("rate limit", ProviderErrorKind::RateLimited),
    ("too many requests", ProviderErrorKind::RateLimited),
    ("429", ProviderErrorKind::RateLimited),
    ("gateway timeout", ProviderErrorKind::ServerError),
    ("timeout", ProviderErrorKind::Timeout),
    ("timed out", ProviderErrorKind::Timeout),
    ("internal server error", ProviderErrorKind::ServerError),
    ("server error", ProviderErrorKind::ServerError),
    ("service unavailable", ProviderErrorKind::ServerError),
    ("bad gateway", ProviderErrorKind::ServerError),
    ("connection", ProviderErrorKind::NetworkError),
    ("network", ProviderErrorKind::NetworkError),
];

impl ProviderErrorKind {
    /// Whether failures of this kind are worth retrying.
    pub fn is_transient(self) -> bool {
        !matches!(self, ProviderErrorKind::Fatal)
    }

    /// Classify an HTTP status code returned by a provider.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => ProviderErrorKind::RateLimited,
            408 => ProviderErrorKind::Timeout,
            500..=599 => ProviderErrorKind::ServerError,
            _ => ProviderErrorKind::Fatal,
        }
    }

    /// Conservative classification from a free-text error description.
    ///
    /// Anything that matches no known marker is `Fatal`.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        TRANSIENT_MARKERS
            .iter()
            .find(|(marker, _)| lower.contains(marker))
            .map(|(_, kind)| *kind)
            .unwrap_or(ProviderErrorKind::Fatal)
    }

    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderErrorKind::RateLimited => "rate_limited",
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::ServerError => "server_error",
            ProviderErrorKind::NetworkError => "network_error",
            ProviderErrorKind::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heimdall error types
#[derive(Debug, thiserror::Error)]
pub enum HeimdallError {
    // Provider errors
    #[error("provider error ({kind}): {message}")]
    Provider {
        kind: ProviderErrorKind,
        message: String,
        /// Provider hint for how long to wait before retrying.
        retry_after: Option<Duration>,
    },

    /// Transient provider failure that outlived every retry attempt.
    #[error("upstream failed after {attempts} attempt(s): {source}")]
    Upstream {
        attempts: u32,
        #[source]
        source: Box<HeimdallError>,
    },

    // Admission errors
    #[error("rate limit exceeded for {window} window, retry after {retry_after_secs}s")]
    RateLimitExceeded { window: String, retry_after_secs: u64 },

    // Backing store errors
    #[error("backing store unavailable: {0}")]
    Store(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("no provider configured")]
    NoProvider,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl HeimdallError {
    /// Shorthand for a provider error without a retry hint.
    pub fn provider(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        HeimdallError::Provider {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Provider error classified from its description.
    pub fn from_provider_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = ProviderErrorKind::from_message(&message);
        Self::provider(kind, message)
    }

    /// Whether this error is transient and the failed call may be retried.
    ///
    /// Only provider errors carry a retryable classification; everything
    /// else (admission, validation, configuration, store) is final.
    pub fn is_transient(&self) -> bool {
        match self {
            HeimdallError::Provider { kind, .. } => kind.is_transient(),
            _ => false,
        }
    }

    /// Provider `retry_after` hint, if one was supplied.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HeimdallError::Provider { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Provider classification, looking through `Upstream` wrappers.
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            HeimdallError::Provider { kind, .. } => Some(*kind),
            HeimdallError::Upstream { source, .. } => source.provider_kind(),
            _ => None,
        }
    }

    /// Short, stable name of the error variant for structured logs.
    pub fn error_type(&self) -> &'static str {
        match self {
            HeimdallError::Provider { .. } => "provider",
            HeimdallError::Upstream { .. } => "upstream",
            HeimdallError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            HeimdallError::Store(_) => "store",
            HeimdallError::Json(_) => "json",
            HeimdallError::InvalidInput(_) => "invalid_input",
            HeimdallError::NoProvider => "no_provider",
            HeimdallError::Configuration(_) => "configuration",
        }
    }
}

/// Result type alias for Heimdall operations
pub type Result<T> = std::result::Result<T, HeimdallError>;
