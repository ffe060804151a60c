use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};
use tracing::error;

use crmrelay_core::errors::{RelayError, UpstreamService};

pub type ApiResult<T> = Result<T, ApiError>;

/// Handler-layer error: a [`RelayError`] plus the redaction decision.
///
/// Upstream failures keep their raw message internally (it is always
/// logged) but the response body only carries it when the deployment
/// opted in via `server.expose_upstream_errors`.
#[derive(Debug)]
pub struct ApiError {
    error: RelayError,
    expose_upstream: bool,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self { error: RelayError::Validation(message.into()), expose_upstream: true }
    }

    pub fn missing_credential(message: impl Into<String>) -> Self {
        Self { error: RelayError::MissingCredential(message.into()), expose_upstream: true }
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self { error: RelayError::RateLimited { retry_after_secs }, expose_upstream: true }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { error: RelayError::Internal(message.into()), expose_upstream: true }
    }

    pub fn upstream(service: UpstreamService, message: impl Into<String>, expose: bool) -> Self {
        Self {
            error: RelayError::Upstream { service, message: message.into() },
            expose_upstream: expose,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.error {
            RelayError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            RelayError::MissingCredential(_) => (StatusCode::UNAUTHORIZED, "MISSING_CREDENTIAL"),
            RelayError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            RelayError::Upstream { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_ERROR"),
            RelayError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let message = match &self.error {
            RelayError::Upstream { service, message } => {
                error!(service = %service, error = %message, "upstream failure");
                if self.expose_upstream {
                    self.error.to_string()
                } else {
                    self.error.generic_message().to_string()
                }
            }
            RelayError::Internal(detail) => {
                error!(error = %detail, "internal error");
                self.error.generic_message().to_string()
            }
            other => other.to_string(),
        };

        let mut response =
            (status, Json(json!({ "error": message, "code": code }))).into_response();
        if let RelayError::RateLimited { retry_after_secs } = self.error {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// A required, non-empty string field. Trims surrounding whitespace.
pub fn require_text(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ApiError::validation(format!("`{field}` is required")))
}

/// A required, non-empty JSON object body.
pub fn require_object(value: Value, what: &str) -> Result<Map<String, Value>, ApiError> {
    match value {
        Value::Object(map) if !map.is_empty() => Ok(map),
        Value::Object(_) => Err(ApiError::validation(format!("{what} must not be empty"))),
        _ => Err(ApiError::validation(format!("{what} must be a JSON object"))),
    }
}
