use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

use crmrelay_core::config::AnthropicConfig;

use crate::{GenerateOptions, GenerateRequest, GenerateResponse, LlmClient, TokenUsage};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no model api key available: supply one per request or configure a default")]
    MissingApiKey,
    #[error("model transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model api error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Messages-API client. One fully awaited request per `generate` call.
pub struct AnthropicClient {
    http: Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self, LlmError> {
        let http =
            Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self { http, config })
    }

    fn resolve_api_key(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        if let Some(key) = &request.api_key_override {
            if !key.trim().is_empty() {
                return Ok(key.clone());
            }
        }
        self.config
            .api_key
            .as_ref()
            .map(|key| key.expose_secret().to_string())
            .filter(|key| !key.trim().is_empty())
            .ok_or(LlmError::MissingApiKey)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let api_key = self.resolve_api_key(&request)?;
        let body = build_request_body(
            &request.prompt,
            &request.options,
            &self.config.model,
            self.config.max_tokens,
        );

        debug!(
            model = body.get("model").and_then(serde_json::Value::as_str).unwrap_or_default(),
            "sending model generation request"
        );

        let response = self
            .http
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let message: MessageResponse = response.json().await?;
        Ok(message.into())
    }
}

/// Assemble the messages-API request body.
///
/// Recognized options override the configured defaults; `extra` entries are
/// merged last but never displace a key that is already set.
fn build_request_body(
    prompt: &str,
    options: &GenerateOptions,
    default_model: &str,
    default_max_tokens: u32,
) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert(
        "model".to_string(),
        Value::String(options.model.clone().unwrap_or_else(|| default_model.to_string())),
    );
    body.insert(
        "max_tokens".to_string(),
        Value::from(options.max_tokens.unwrap_or(default_max_tokens)),
    );
    body.insert(
        "messages".to_string(),
        json!([{ "role": "user", "content": prompt }]),
    );
    if let Some(system) = &options.system {
        body.insert("system".to_string(), Value::String(system.clone()));
    }
    if let Some(temperature) = options.temperature {
        body.insert("temperature".to_string(), json!(temperature));
    }
    for (key, value) in &options.extra {
        body.entry(key.clone()).or_insert_with(|| value.clone());
    }
    body
}

fn api_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorEnvelope {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        kind: String,
        message: String,
    }

    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => format!("{}: {}", envelope.error.kind, envelope.error.message),
        Err(_) => body.trim().to_string(),
    }
}

#[derive(Deserialize)]
struct MessageResponse {
    id: String,
    model: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: UsageBlock,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Default, Deserialize)]
struct UsageBlock {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl From<MessageResponse> for GenerateResponse {
    fn from(message: MessageResponse) -> Self {
        let text = message
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        GenerateResponse {
            id: message.id,
            model: message.model,
            text,
            stop_reason: message.stop_reason,
            usage: TokenUsage {
                input_tokens: message.usage.input_tokens,
                output_tokens: message.usage.output_tokens,
            },
        }
    }
}
