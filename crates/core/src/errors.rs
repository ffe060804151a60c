use thiserror::Error;

/// Application-level error taxonomy shared by the handler layer.
///
/// Four request-scoped classes exist: invalid input, missing credential,
/// rate-limit rejection, and upstream (CRM or model) failure. Row-level
/// import errors are deliberately not represented here — they are data,
/// collected into the import summary, never raised.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("missing credential: {0}")]
    MissingCredential(String),
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("upstream {service} failure: {message}")]
    Upstream { service: UpstreamService, message: String },
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpstreamService {
    Salesforce,
    Anthropic,
}

impl std::fmt::Display for UpstreamService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Salesforce => write!(f, "salesforce"),
            Self::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl RelayError {
    pub fn upstream_salesforce(message: impl Into<String>) -> Self {
        Self::Upstream { service: UpstreamService::Salesforce, message: message.into() }
    }

    pub fn upstream_anthropic(message: impl Into<String>) -> Self {
        Self::Upstream { service: UpstreamService::Anthropic, message: message.into() }
    }

    /// Message safe to return to callers when upstream details are redacted.
    pub fn generic_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "The request could not be processed. Check inputs and try again.",
            Self::MissingCredential(_) => "A credential header is required for this route.",
            Self::RateLimited { .. } => "Too many requests. Please retry later.",
            Self::Upstream { .. } => "An upstream service failure occurred.",
            Self::Internal(_) => "An internal error occurred.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RelayError, UpstreamService};

    #[test]
    fn upstream_errors_carry_the_service_and_raw_message() {
        let error = RelayError::upstream_salesforce("INVALID_SESSION_ID: session expired");

        assert_eq!(
            error,
            RelayError::Upstream {
                service: UpstreamService::Salesforce,
                message: "INVALID_SESSION_ID: session expired".to_string(),
            }
        );
        assert!(error.to_string().contains("salesforce"));
        assert!(error.to_string().contains("session expired"));
    }

    #[test]
    fn generic_messages_never_leak_upstream_detail() {
        let error = RelayError::upstream_anthropic("api_key invalid: sk-ant-...");

        assert!(!error.generic_message().contains("sk-ant"));
        assert_eq!(error.generic_message(), "An upstream service failure occurred.");
    }

    #[test]
    fn rate_limited_message_includes_retry_hint() {
        let error = RelayError::RateLimited { retry_after_secs: 42 };
        assert!(error.to_string().contains("42"));
    }
}
