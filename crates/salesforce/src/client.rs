use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crmrelay_core::config::SalesforceConfig;

use crate::types::{ObjectDescribe, QueryResult, SaveResult};

#[derive(Debug, Error)]
pub enum SalesforceError {
    #[error("salesforce authentication failed: {0}")]
    Auth(String),
    #[error("salesforce transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("salesforce api error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// The query/record operations the rest of the system depends on.
///
/// Pipelines and handlers only ever see this trait, so tests substitute
/// in-memory fakes and the HTTP client below stays the single place that
/// knows about sessions and endpoints.
#[async_trait]
pub trait CrmApi: Send + Sync {
    async fn query(&self, soql: &str) -> Result<QueryResult, SalesforceError>;
    async fn create(
        &self,
        object: &str,
        fields: &Map<String, Value>,
    ) -> Result<SaveResult, SalesforceError>;
    async fn update(
        &self,
        object: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> Result<SaveResult, SalesforceError>;
    async fn delete(&self, object: &str, id: &str) -> Result<SaveResult, SalesforceError>;
    async fn describe(&self, object: &str) -> Result<ObjectDescribe, SalesforceError>;
}

#[derive(Clone, Debug, Deserialize)]
struct Session {
    access_token: String,
    instance_url: String,
}

/// Authenticated Salesforce REST client.
///
/// Constructed once at bootstrap. The session is established lazily on the
/// first operation and reused for the process lifetime; the `OnceCell`
/// guard means two concurrent first requests perform a single login.
pub struct SalesforceClient {
    http: Client,
    config: SalesforceConfig,
    session: OnceCell<Session>,
}

impl SalesforceClient {
    pub fn new(config: SalesforceConfig) -> Self {
        Self { http: Client::new(), config, session: OnceCell::new() }
    }

    async fn session(&self) -> Result<&Session, SalesforceError> {
        self.session.get_or_try_init(|| self.login()).await
    }

    async fn login(&self) -> Result<Session, SalesforceError> {
        let token_url = format!("{}/services/oauth2/token", self.config.login_url);
        // Salesforce expects the security token appended to the password for
        // the username-password grant.
        let password = format!(
            "{}{}",
            self.config.password.expose_secret(),
            self.config.security_token.expose_secret()
        );

        let response = self
            .http
            .post(&token_url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret()),
                ("username", self.config.username.as_str()),
                ("password", password.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SalesforceError::Auth(auth_failure_message(&body)));
        }

        let session: Session = serde_json::from_str(&body)
            .map_err(|err| SalesforceError::Auth(format!("malformed token response: {err}")))?;

        info!(instance_url = %session.instance_url, "salesforce session established");
        Ok(session)
    }

    fn data_url(&self, session: &Session, suffix: &str) -> String {
        format!(
            "{}/services/data/v{}/{suffix}",
            session.instance_url, self.config.api_version
        )
    }

    async fn read_api_error(
        status: reqwest::StatusCode,
        response: reqwest::Response,
    ) -> SalesforceError {
        let body = response.text().await.unwrap_or_default();
        SalesforceError::Api { status: status.as_u16(), message: collapse_error_body(&body) }
    }
}

#[async_trait]
impl CrmApi for SalesforceClient {
    async fn query(&self, soql: &str) -> Result<QueryResult, SalesforceError> {
        let session = self.session().await?;
        debug!(soql, "executing salesforce query");

        let response = self
            .http
            .get(self.data_url(session, "query"))
            .bearer_auth(&session.access_token)
            .query(&[("q", soql)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::read_api_error(status, response).await);
        }
        Ok(response.json().await?)
    }

    async fn create(
        &self,
        object: &str,
        fields: &Map<String, Value>,
    ) -> Result<SaveResult, SalesforceError> {
        let session = self.session().await?;

        let response = self
            .http
            .post(self.data_url(session, &format!("sobjects/{object}")))
            .bearer_auth(&session.access_token)
            .json(fields)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::read_api_error(status, response).await);
        }

        #[derive(Deserialize)]
        struct CreateBody {
            id: String,
            success: bool,
        }
        let body: CreateBody = response.json().await?;
        Ok(SaveResult { id: Some(body.id), success: body.success, errors: Vec::new() })
    }

    async fn update(
        &self,
        object: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> Result<SaveResult, SalesforceError> {
        let session = self.session().await?;

        let response = self
            .http
            .patch(self.data_url(session, &format!("sobjects/{object}/{id}")))
            .bearer_auth(&session.access_token)
            .json(fields)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::read_api_error(status, response).await);
        }
        // PATCH responds 204 with no body.
        Ok(SaveResult { id: Some(id.to_string()), success: true, errors: Vec::new() })
    }

    async fn delete(&self, object: &str, id: &str) -> Result<SaveResult, SalesforceError> {
        let session = self.session().await?;

        let response = self
            .http
            .delete(self.data_url(session, &format!("sobjects/{object}/{id}")))
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::read_api_error(status, response).await);
        }
        Ok(SaveResult { id: Some(id.to_string()), success: true, errors: Vec::new() })
    }

    async fn describe(&self, object: &str) -> Result<ObjectDescribe, SalesforceError> {
        let session = self.session().await?;

        let response = self
            .http
            .get(self.data_url(session, &format!("sobjects/{object}/describe")))
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::read_api_error(status, response).await);
        }
        Ok(response.json().await?)
    }
}

/// Collapse a Salesforce error body into one message line.
///
/// The REST API reports errors as `[{"message": ..., "errorCode": ...}]`;
/// anything unparseable is passed through as-is.
fn collapse_error_body(body: &str) -> String {
    #[derive(Deserialize)]
    struct ApiErrorItem {
        message: String,
        #[serde(rename = "errorCode")]
        error_code: Option<String>,
    }

    match serde_json::from_str::<Vec<ApiErrorItem>>(body) {
        Ok(items) if !items.is_empty() => items
            .into_iter()
            .map(|item| match item.error_code {
                Some(code) => format!("{code}: {}", item.message),
                None => item.message,
            })
            .collect::<Vec<_>>()
            .join("; "),
        _ => body.trim().to_string(),
    }
}

fn auth_failure_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct OAuthError {
        error: String,
        error_description: Option<String>,
    }

    match serde_json::from_str::<OAuthError>(body) {
        Ok(parsed) => match parsed.error_description {
            Some(description) => format!("{}: {description}", parsed.error),
            None => parsed.error,
        },
        Err(_) => body.trim().to_string(),
    }
}
