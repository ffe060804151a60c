//! CRM client adapter for the relay.
//!
//! Exposes the [`CrmApi`] trait — the seam every pipeline and handler talks
//! through — and [`SalesforceClient`], its reqwest-backed implementation.
//! The client is constructed once at bootstrap and injected; the
//! authenticated session itself is established lazily on first use and then
//! reused for the process lifetime. There is no refresh-on-expiry and no
//! retry: upstream failures surface unchanged.

mod client;
mod types;

pub use client::{CrmApi, SalesforceClient, SalesforceError};
pub use types::{FieldDescribe, ObjectDescribe, QueryResult, SaveResult, SObject};
