//! Heimdall - admission and resilience layer for LLM provider APIs
//!
//! Heimdall sits in front of an LLM provider and decides, for every
//! generation request, whether it can be answered from the response cache,
//! whether the user is within their rate budget, how to retry transient
//! upstream failures without causing retry storms, and what the request
//! cost.
//!
//! Provider network clients are not part of this crate; they plug in
//! through the [`GenerateProvider`] trait.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use heimdall::{Gateway, GenerateProvider, GenerateRequest, Generation};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl GenerateProvider for Echo {
//!     fn name(&self) -> &str {
//!         "echo"
//!     }
//!
//!     async fn generate(&self, request: &GenerateRequest) -> heimdall::Result<Generation> {
//!         Ok(Generation::new(request.prompt.clone(), request.model.clone()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> heimdall::Result<()> {
//!     let gateway = Gateway::builder().provider(Arc::new(Echo)).build()?;
//!
//!     let response = gateway
//!         .handle_generate(GenerateRequest::new("What is the capital of France?", "alice"))
//!         .await?;
//!
//!     println!("{} (cached: {})", response.completion, response.cached);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod providers;
pub mod ratelimit;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use error::{HeimdallError, ProviderErrorKind, Result};
pub use gateway::{AdminSummary, Gateway, GatewayBuilder};

pub use cache::{CacheConfig, CacheEntry, CacheStats, Fingerprint, RequestParams, ResponseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use ledger::{CostLedger, LedgerConfig, PricingTable, UsageRecord, UsageSummary};
pub use providers::{
    BackoffPolicy, GenerateProvider, RetryConfig, RetryDecision, RetryOrchestrator,
    RetryingGenerateProvider,
};
pub use ratelimit::{Admission, RateLimitConfig, RateLimitStatus, SlidingWindowLimiter, WindowLimit};
pub use store::{KvStore, MemoryStore};
pub use types::{GenerateRequest, GenerateResponse, Generation, TokenUsage};
