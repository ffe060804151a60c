use std::sync::Arc;

use thiserror::Error;

use crmrelay_core::config::{AppConfig, ConfigError};
use crmrelay_llm::{AnthropicClient, LlmError};
use crmrelay_salesforce::SalesforceClient;

use crate::rate_limit::{InMemoryCounterStore, RateLimiter};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not construct model client: {0}")]
    Llm(#[from] LlmError),
}

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

/// Wire the real clients and the in-memory rate limiter from a loaded
/// config. The CRM session is not established here; the first CRM
/// operation logs in lazily.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let crm = Arc::new(SalesforceClient::new(config.salesforce.clone()));
    let llm = Arc::new(AnthropicClient::new(config.anthropic.clone())?);
    let limiter = RateLimiter::new(
        Arc::new(InMemoryCounterStore::default()),
        config.rate_limit.max_requests,
        config.rate_limit.window_secs,
    );

    let state = AppState {
        crm,
        llm,
        limiter,
        expose_upstream_errors: config.server.expose_upstream_errors,
    };
    Ok(Application { config, state })
}
