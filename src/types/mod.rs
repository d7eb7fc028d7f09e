//! Public request and response types.

mod request;
mod response;

pub use request::{
    DEFAULT_MODEL, DEFAULT_TEMPERATURE, GenerateRequest, MAX_MAX_TOKENS, MAX_PROMPT_CHARS,
};
pub use response::{GenerateResponse, Generation, TokenUsage};
pub(crate) use response::chars_to_tokens;
