use std::sync::Arc;

use crmrelay_core::errors::UpstreamService;
use crmrelay_llm::{LlmClient, LlmError};
use crmrelay_pipeline::ReportError;
use crmrelay_salesforce::{CrmApi, SalesforceError};

use crate::error::ApiError;
use crate::rate_limit::RateLimiter;

/// Shared handler state. Clients sit behind their traits so router tests
/// run against in-memory fakes.
#[derive(Clone)]
pub struct AppState {
    pub crm: Arc<dyn CrmApi>,
    pub llm: Arc<dyn LlmClient>,
    pub limiter: RateLimiter,
    pub expose_upstream_errors: bool,
}

impl AppState {
    pub fn crm_error(&self, error: SalesforceError) -> ApiError {
        ApiError::upstream(
            UpstreamService::Salesforce,
            error.to_string(),
            self.expose_upstream_errors,
        )
    }

    pub fn llm_error(&self, error: LlmError) -> ApiError {
        match error {
            LlmError::MissingApiKey => ApiError::missing_credential(error.to_string()),
            other => ApiError::upstream(
                UpstreamService::Anthropic,
                other.to_string(),
                self.expose_upstream_errors,
            ),
        }
    }

    pub fn report_error(&self, error: ReportError) -> ApiError {
        match error {
            ReportError::Crm(inner) => self.crm_error(inner),
            ReportError::Llm(inner) => self.llm_error(inner),
            ReportError::Write(inner) => {
                ApiError::internal(format!("report file error: {inner}"))
            }
            ReportError::Csv(inner) => {
                ApiError::internal(format!("report serialization error: {inner}"))
            }
        }
    }
}
