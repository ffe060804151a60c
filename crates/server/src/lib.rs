//! HTTP relay surface.
//!
//! Thin axum handlers over the CRM and model clients: every route
//! validates its input, calls through the [`CrmApi`] / [`LlmClient`]
//! seams held in [`state::AppState`], and maps failures onto the shared
//! error taxonomy. All `/api` routes sit behind the fixed-window rate
//! limiter; the health probe does not.
//!
//! [`CrmApi`]: crmrelay_salesforce::CrmApi
//! [`LlmClient`]: crmrelay_llm::LlmClient

pub mod auth;
pub mod bootstrap;
pub mod claude;
pub mod csv;
pub mod error;
pub mod health;
pub mod integrated;
pub mod rate_limit;
pub mod router;
pub mod salesforce;
pub mod state;
