//! CSV pipelines: contact import and query-to-file report generation.
//!
//! Both pipelines talk to the CRM exclusively through the [`CrmApi`] trait
//! and (for query authoring) to the model through [`LlmClient`], so their
//! behavior is fully testable with in-memory fakes.
//!
//! [`CrmApi`]: crmrelay_salesforce::CrmApi
//! [`LlmClient`]: crmrelay_llm::LlmClient

pub mod import;
pub mod report;

pub use import::{
    escape_soql_literal, ContactImporter, ImportError, ImportSummary, ImportedRecord, RowFailure,
};
pub use report::{
    AuthoredQuery, AuthoringOptions, ReportError, ReportFile, ReportGenerator, ReportOutcome,
};
