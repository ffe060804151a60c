//! Language-model client adapter.
//!
//! One operation: generate text from a prompt, fully awaited, no streaming.
//! The [`LlmClient`] trait is the seam; [`AnthropicClient`] is the
//! reqwest-backed implementation talking to the messages API. Credential
//! resolution is per call: a request-supplied key wins over the
//! process-wide default, and having neither is an error.

mod anthropic;
mod options;
mod text;

pub use anthropic::{AnthropicClient, LlmError};
pub use options::{GenerateOptions, GenerateRequest, GenerateResponse, TokenUsage};
pub use text::{parse_field_updates, strip_code_fences};

use async_trait::async_trait;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError>;
}
