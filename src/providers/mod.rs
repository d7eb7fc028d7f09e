//! Provider seam, backoff policy and retry orchestration.
//!
//! Network clients live outside this crate and plug in through
//! [`GenerateProvider`]. Everything here is about calling them safely.

pub mod backoff;
pub mod retry;
pub mod traits;

pub use backoff::{BackoffPolicy, RetryDecision, classify};
pub use retry::{RetryConfig, RetryOrchestrator, RetryingGenerateProvider};
pub use traits::GenerateProvider;
