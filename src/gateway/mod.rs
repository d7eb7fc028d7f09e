//! Gateway coordinator and its builder

mod builder;
mod coordinator;

pub use builder::GatewayBuilder;
pub use coordinator::{AdminSummary, Gateway, RetrySettings};
