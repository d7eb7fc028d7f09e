//! Provider trait for upstream text generation.
//!
//! The gateway never talks HTTP itself; network clients implement
//! [`GenerateProvider`] and classify their failures with
//! [`ProviderErrorKind`](crate::ProviderErrorKind) so retry decisions stay
//! out of the client code.
//!
//! # Example
//!
//! ```ignore
//! async fn generate(&self, request: &GenerateRequest) -> Result<Generation> {
//!     let response = self.client.post(..).send().await
//!         .map_err(|e| HeimdallError::provider(ProviderErrorKind::NetworkError, e.to_string()))?;
//!     if !response.status().is_success() {
//!         let kind = ProviderErrorKind::from_status(response.status().as_u16());
//!         return Err(HeimdallError::provider(kind, response.text().await?));
//!     }
//!     // ... parse completion and usage
//! }
//! ```

use async_trait::async_trait;

use crate::Result;
use crate::types::{GenerateRequest, Generation};

/// Provider for text generation.
#[async_trait]
pub trait GenerateProvider: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Generate a completion for the request.
    ///
    /// Failures are `HeimdallError::Provider` with a kind that says whether
    /// the call may be retried. `usage` may be left empty; the gateway then
    /// estimates it.
    async fn generate(&self, request: &GenerateRequest) -> Result<Generation>;
}
