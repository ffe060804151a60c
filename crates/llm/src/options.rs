use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Recognized generation parameters plus an explicit escape hatch.
///
/// The named fields cover what the relay itself sets; `extra` is merged
/// into the outgoing request body verbatim for any other parameter the
/// model API accepts. Named fields always win over `extra` entries of the
/// same name.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GenerateOptions {
    pub system: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default)]
pub struct GenerateRequest {
    pub prompt: String,
    pub options: GenerateOptions,
    /// Caller-supplied credential; takes precedence over the configured
    /// process-wide key.
    pub api_key_override: Option<String>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Self::default() }
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_api_key_override(mut self, key: Option<String>) -> Self {
        self.api_key_override = key;
        self
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct GenerateResponse {
    pub id: String,
    pub model: String,
    /// Concatenated text content blocks of the completion.
    pub text: String,
    pub stop_reason: Option<String>,
    pub usage: TokenUsage,
}
