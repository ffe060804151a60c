use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::error::ApiError;

/// Header carrying the caller's model API key.
pub const CREDENTIAL_HEADER: &str = "x-api-key";

/// Per-request model credential, required on every route that calls the
/// model. The key is forwarded upstream verbatim and never stored.
#[derive(Clone, Debug)]
pub struct ModelCredential(pub String);

impl ModelCredential {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        headers
            .get(CREDENTIAL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Self(value.to_string()))
            .ok_or_else(|| {
                ApiError::missing_credential(format!(
                    "`{CREDENTIAL_HEADER}` header is required for this route"
                ))
            })
    }
}

impl<S> FromRequestParts<S> for ModelCredential
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};

    use super::ModelCredential;

    #[test]
    fn missing_or_blank_headers_are_rejected() {
        let mut headers = HeaderMap::new();
        assert!(ModelCredential::from_headers(&headers).is_err());

        headers.insert("x-api-key", HeaderValue::from_static("   "));
        assert!(ModelCredential::from_headers(&headers).is_err());
    }

    #[test]
    fn present_keys_are_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static(" sk-ant-test "));
        let credential = ModelCredential::from_headers(&headers).expect("credential");
        assert_eq!(credential.0, "sk-ant-test");
    }
}
