//! Shared foundation for the crmrelay service.
//!
//! Holds the layered configuration loader, the application error taxonomy,
//! and the pure contact-row mapping rules used by the CSV import pipeline.
//! Everything here is synchronous and free of I/O beyond config file reads,
//! so the adapter and server crates can depend on it without pulling in a
//! runtime.

pub mod config;
pub mod contacts;
pub mod errors;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use contacts::{display_name, map_contact_row, MappedContact, LAST_NAME_PLACEHOLDER};
pub use errors::RelayError;
