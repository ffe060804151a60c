use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crmrelay_core::contacts::{display_name, map_contact_row};
use crmrelay_salesforce::{CrmApi, SalesforceError};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("could not read csv file: {0}")]
    Read(#[from] std::io::Error),
    #[error("could not parse csv file: {0}")]
    Parse(#[from] csv::Error),
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportedRecord {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RowFailure {
    pub row: HashMap<String, String>,
    pub error: String,
}

/// Aggregate import result. Invariants:
/// `total_processed == successful + failed`,
/// `successful == successful_records.len()`, `failed == errors.len()`.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total_processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub successful_records: Vec<ImportedRecord>,
    pub errors: Vec<RowFailure>,
}

enum RowOutcome {
    Created { id: String, name: String },
    Rejected(String),
}

/// Imports contact rows from an uploaded CSV, one create call per row.
///
/// Rows are processed strictly sequentially and independently: a failing
/// row is recorded and the batch continues. Only a structural parse
/// failure of the file itself aborts the operation.
pub struct ContactImporter {
    crm: Arc<dyn CrmApi>,
}

impl ContactImporter {
    pub fn new(crm: Arc<dyn CrmApi>) -> Self {
        Self { crm }
    }

    /// Import every row of the file, then delete the file.
    pub async fn import_file(&self, path: &Path) -> Result<ImportSummary, ImportError> {
        let raw = tokio::fs::read(path).await?;
        let rows = parse_rows(&raw)?;

        let mut summary = ImportSummary { total_processed: rows.len(), ..Default::default() };

        for row in rows {
            match self.import_row(&row).await {
                Ok(RowOutcome::Created { id, name }) => {
                    summary.successful += 1;
                    summary.successful_records.push(ImportedRecord { id, name });
                }
                Ok(RowOutcome::Rejected(error)) => {
                    summary.failed += 1;
                    summary.errors.push(RowFailure { row, error });
                }
                Err(error) => {
                    summary.failed += 1;
                    summary.errors.push(RowFailure { row, error: error.to_string() });
                }
            }
        }

        // The uploaded file is transient; remove it whatever the row outcomes.
        if let Err(error) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %error, "could not delete imported csv file");
        }

        info!(
            total = summary.total_processed,
            successful = summary.successful,
            failed = summary.failed,
            "contact import finished"
        );
        Ok(summary)
    }

    async fn import_row(
        &self,
        row: &HashMap<String, String>,
    ) -> Result<RowOutcome, SalesforceError> {
        let mapped = map_contact_row(row);
        let mut fields = mapped.fields;

        if let Some(account_name) = &mapped.account_name {
            if let Some(account_id) = self.resolve_account(account_name).await {
                fields.insert("AccountId".to_string(), Value::String(account_id));
            }
        }

        let name = display_name(&fields);
        let result = self.crm.create("Contact", &fields).await?;
        if result.success {
            let id = result.id.unwrap_or_default();
            Ok(RowOutcome::Created { id, name })
        } else {
            let error = if result.errors.is_empty() {
                "create reported failure".to_string()
            } else {
                result.errors.join("; ")
            };
            Ok(RowOutcome::Rejected(error))
        }
    }

    /// Find the account by exact name, creating it when absent.
    ///
    /// Resolution failure is not a row failure: the contact proceeds
    /// without a parent link.
    async fn resolve_account(&self, account_name: &str) -> Option<String> {
        let soql = format!(
            "SELECT Id FROM Account WHERE Name = '{}' LIMIT 1",
            escape_soql_literal(account_name)
        );

        match self.crm.query(&soql).await {
            Ok(result) => {
                if let Some(record) = result.records.first() {
                    return record.get("Id").and_then(Value::as_str).map(str::to_string);
                }
            }
            Err(error) => {
                warn!(account_name, error = %error, "account lookup failed, row proceeds unlinked");
                return None;
            }
        }

        let mut account = Map::new();
        account.insert("Name".to_string(), Value::String(account_name.to_string()));
        match self.crm.create("Account", &account).await {
            Ok(result) if result.success => result.id,
            Ok(_) | Err(_) => {
                warn!(account_name, "account creation failed, row proceeds unlinked");
                None
            }
        }
    }
}

/// Eagerly parse the whole file; a malformed record aborts the import.
fn parse_rows(raw: &[u8]) -> Result<Vec<HashMap<String, String>>, csv::Error> {
    let mut reader = csv::Reader::from_reader(raw);
    reader.deserialize::<HashMap<String, String>>().collect()
}

/// Escape a string for embedding in a single-quoted SOQL literal.
pub fn escape_soql_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    use crmrelay_core::contacts::LAST_NAME_PLACEHOLDER;
    use crmrelay_salesforce::{
        CrmApi, ObjectDescribe, QueryResult, SalesforceError, SaveResult,
    };

    use super::{escape_soql_literal, parse_rows, ContactImporter};

    /// Scriptable CRM fake: records every call, answers from canned data.
    #[derive(Default)]
    struct FakeCrm {
        /// Account name → existing id for exact-match lookups.
        accounts: HashMap<String, String>,
        /// Contact last names whose create call should report failure.
        reject_last_names: Vec<String>,
        /// Contact last names whose create call should raise.
        raise_last_names: Vec<String>,
        created: Mutex<Vec<(String, Map<String, Value>)>>,
        next_id: Mutex<u32>,
    }

    impl FakeCrm {
        fn created(&self) -> Vec<(String, Map<String, Value>)> {
            self.created.lock().expect("created lock").clone()
        }

        fn mint_id(&self, prefix: &str) -> String {
            let mut counter = self.next_id.lock().expect("id lock");
            *counter += 1;
            format!("{prefix}{:03}", *counter)
        }
    }

    #[async_trait]
    impl CrmApi for FakeCrm {
        async fn query(&self, soql: &str) -> Result<QueryResult, SalesforceError> {
            let records = self
                .accounts
                .iter()
                .filter(|(name, _)| soql.contains(&format!("'{}'", escape_soql_literal(name))))
                .map(|(_, id)| {
                    let mut record = Map::new();
                    record.insert("Id".to_string(), json!(id));
                    record
                })
                .collect::<Vec<_>>();
            Ok(QueryResult { total_size: records.len() as u64, done: true, records })
        }

        async fn create(
            &self,
            object: &str,
            fields: &Map<String, Value>,
        ) -> Result<SaveResult, SalesforceError> {
            let last_name =
                fields.get("LastName").and_then(Value::as_str).unwrap_or_default().to_string();
            if object == "Contact" && self.raise_last_names.contains(&last_name) {
                return Err(SalesforceError::Api {
                    status: 503,
                    message: "UNABLE_TO_LOCK_ROW: try again later".to_string(),
                });
            }
            if object == "Contact" && self.reject_last_names.contains(&last_name) {
                return Ok(SaveResult {
                    id: None,
                    success: false,
                    errors: vec!["INVALID_EMAIL_ADDRESS: bad email".to_string()],
                });
            }

            let id = self.mint_id(if object == "Account" { "001" } else { "003" });
            self.created
                .lock()
                .expect("created lock")
                .push((object.to_string(), fields.clone()));
            Ok(SaveResult { id: Some(id), success: true, errors: Vec::new() })
        }

        async fn update(
            &self,
            _object: &str,
            id: &str,
            _fields: &Map<String, Value>,
        ) -> Result<SaveResult, SalesforceError> {
            Ok(SaveResult { id: Some(id.to_string()), success: true, errors: Vec::new() })
        }

        async fn delete(&self, _object: &str, id: &str) -> Result<SaveResult, SalesforceError> {
            Ok(SaveResult { id: Some(id.to_string()), success: true, errors: Vec::new() })
        }

        async fn describe(&self, _object: &str) -> Result<ObjectDescribe, SalesforceError> {
            Ok(ObjectDescribe { name: "Contact".to_string(), label: "Contact".to_string(), fields: Vec::new() })
        }
    }

    fn write_csv(content: &str) -> tempfile::TempPath {
        let mut file = tempfile::NamedTempFile::new().expect("temp csv");
        file.write_all(content.as_bytes()).expect("write csv");
        file.into_temp_path()
    }

    #[tokio::test]
    async fn two_row_import_substitutes_placeholder_and_counts_both() {
        let path = write_csv("FirstName,LastName,Email\nAda,Lovelace,ada@example.com\nGrace,,grace@example.com\n");
        let crm = Arc::new(FakeCrm::default());
        let importer = ContactImporter::new(crm.clone());

        let summary = importer.import_file(&path).await.expect("import succeeds");

        assert_eq!(summary.total_processed, 2);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.successful_records.len(), 2);

        let created = crm.created();
        assert_eq!(created[1].1.get("LastName").unwrap(), LAST_NAME_PLACEHOLDER);
        assert!(!path.exists(), "source file must be deleted after processing");
    }

    #[tokio::test]
    async fn existing_account_is_linked_and_unknown_account_is_created() {
        let path = write_csv(
            "LastName,AccountName\nLovelace,Analytical Ltd\nHopper,Compilers Inc\n",
        );
        let crm = Arc::new(FakeCrm {
            accounts: [("Analytical Ltd".to_string(), "001EXISTING".to_string())].into(),
            ..FakeCrm::default()
        });
        let importer = ContactImporter::new(crm.clone());

        let summary = importer.import_file(&path).await.expect("import succeeds");
        assert_eq!(summary.successful, 2);

        let created = crm.created();
        let contacts: Vec<_> =
            created.iter().filter(|(object, _)| object == "Contact").collect();
        assert_eq!(contacts[0].1.get("AccountId").unwrap(), "001EXISTING");
        // Second row's account did not exist: one Account create happened
        // and the minted id was attached.
        let accounts: Vec<_> =
            created.iter().filter(|(object, _)| object == "Account").collect();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].1.get("Name").unwrap(), "Compilers Inc");
        let linked = contacts[1].1.get("AccountId").and_then(Value::as_str).unwrap();
        assert!(linked.starts_with("001"));
        // AccountName itself never reaches the created record.
        assert!(contacts.iter().all(|(_, fields)| !fields.contains_key("AccountName")));
    }

    #[tokio::test]
    async fn failing_rows_are_isolated_and_later_rows_still_process() {
        let path = write_csv(
            "LastName,Email\nLovelace,ada@example.com\nBroken,nope\nHopper,grace@example.com\n",
        );
        let crm = Arc::new(FakeCrm {
            raise_last_names: vec!["Broken".to_string()],
            ..FakeCrm::default()
        });
        let importer = ContactImporter::new(crm.clone());

        let summary = importer.import_file(&path).await.expect("import succeeds");

        assert_eq!(summary.total_processed, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.successful, summary.successful_records.len());
        assert_eq!(summary.failed, summary.errors.len());

        let failure = &summary.errors[0];
        assert_eq!(failure.row.get("LastName").unwrap(), "Broken");
        assert!(failure.error.contains("UNABLE_TO_LOCK_ROW"));

        // The row after the failure was still created.
        let names: Vec<_> = summary.successful_records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Lovelace", "Hopper"]);
    }

    #[tokio::test]
    async fn reported_create_failure_lands_in_the_error_list() {
        let path = write_csv("LastName\nRejected\n");
        let crm = Arc::new(FakeCrm {
            reject_last_names: vec!["Rejected".to_string()],
            ..FakeCrm::default()
        });

        let summary = ContactImporter::new(crm).import_file(&path).await.expect("import runs");
        assert_eq!(summary.failed, 1);
        assert!(summary.errors[0].error.contains("INVALID_EMAIL_ADDRESS"));
    }

    #[tokio::test]
    async fn structural_parse_failure_aborts_the_whole_import() {
        // Second record has more cells than the header: a csv parse error.
        let path = write_csv("LastName,Email\nLovelace,ada@example.com,extra\n");
        let crm = Arc::new(FakeCrm::default());

        let result = ContactImporter::new(crm.clone()).import_file(&path).await;
        assert!(result.is_err());
        assert!(crm.created().is_empty(), "no row may be submitted on a parse failure");
    }

    #[test]
    fn soql_literals_are_escaped() {
        assert_eq!(escape_soql_literal("O'Brien & Co \\ Ltd"), "O\\'Brien & Co \\\\ Ltd");
    }

    #[test]
    fn parse_rows_reads_headers_into_maps() {
        let rows = parse_rows(b"A,B\n1,2\n3,4\n").expect("valid csv");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("B").unwrap(), "4");
    }
}
