use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crmrelay_llm::{GenerateOptions, GenerateRequest, LlmClient, LlmError};
use crmrelay_salesforce::{CrmApi, ObjectDescribe, SalesforceError};

/// Key present on every queried record that never becomes a CSV column.
const METADATA_KEY: &str = "attributes";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Crm(#[from] SalesforceError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("could not write report file: {0}")]
    Write(#[from] std::io::Error),
    #[error("could not serialize report rows: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReportFile {
    pub path: PathBuf,
    pub file_name: String,
    pub record_count: usize,
    pub columns: Vec<String>,
}

/// Result of a report run. An empty query is a reported failure, not an
/// error: no file is created and the caller gets the reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReportOutcome {
    Empty { message: String },
    File(ReportFile),
}

/// Knobs forwarded into the query-authoring prompt. The model is the only
/// consumer; nothing here is validated against the object schema.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthoringOptions {
    pub fields: Option<Vec<String>>,
    pub filters: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct AuthoredQuery {
    pub soql: String,
    pub describe: ObjectDescribe,
}

/// Runs a query and serializes the result to a transient CSV file.
///
/// The returned file is the caller's to stream and delete.
pub struct ReportGenerator {
    crm: Arc<dyn CrmApi>,
    llm: Arc<dyn LlmClient>,
}

impl ReportGenerator {
    pub fn new(crm: Arc<dyn CrmApi>, llm: Arc<dyn LlmClient>) -> Self {
        Self { crm, llm }
    }

    pub async fn generate(
        &self,
        soql: &str,
        report_name: &str,
        output_dir: Option<&Path>,
    ) -> Result<ReportOutcome, ReportError> {
        let result = self.crm.query(soql).await?;
        if result.records.is_empty() {
            return Ok(ReportOutcome::Empty {
                message: format!("query returned no records: {soql}"),
            });
        }

        let columns: Vec<String> = result.records[0]
            .keys()
            .filter(|key| key.as_str() != METADATA_KEY)
            .cloned()
            .collect();

        let file_name = report_file_name(report_name);
        let dir = output_dir.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
        let path = dir.join(&file_name);

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(&columns)?;
        for record in &result.records {
            let cells: Vec<String> =
                columns.iter().map(|column| cell_text(record.get(column))).collect();
            writer.write_record(&cells)?;
        }
        writer.flush()?;

        info!(
            file_name,
            record_count = result.records.len(),
            "report file written"
        );

        Ok(ReportOutcome::File(ReportFile {
            path,
            file_name,
            record_count: result.records.len(),
            columns,
        }))
    }

    /// Ask the model to author a SOQL statement from a natural-language
    /// description and the object's live metadata.
    ///
    /// The returned text is trusted verbatim (code fences stripped, nothing
    /// validated) — the caller decides what to do with it.
    pub async fn generate_report_query(
        &self,
        description: &str,
        object_name: &str,
        options: &AuthoringOptions,
        api_key_override: Option<String>,
    ) -> Result<AuthoredQuery, ReportError> {
        let describe = self.crm.describe(object_name).await?;
        let prompt = build_soql_prompt(description, &describe, options);

        let request = GenerateRequest::new(prompt)
            .with_options(GenerateOptions {
                system: Some(
                    "You translate report descriptions into a single SOQL query. \
                     Respond with the SOQL statement only, no commentary."
                        .to_string(),
                ),
                ..GenerateOptions::default()
            })
            .with_api_key_override(api_key_override);

        let response = self.llm.generate(request).await?;
        let soql = crmrelay_llm::strip_code_fences(&response.text).to_string();
        Ok(AuthoredQuery { soql, describe })
    }
}

/// `{sanitized name}_{timestamp}.csv` — consecutive calls get distinct names.
fn report_file_name(report_name: &str) -> String {
    let sanitized: String = report_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S%3f");
    format!("{sanitized}_{timestamp}.csv")
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn build_soql_prompt(
    description: &str,
    describe: &ObjectDescribe,
    options: &AuthoringOptions,
) -> String {
    let mut prompt = format!(
        "Write a SOQL query against the `{}` object.\n\nReport description:\n{}\n\nAvailable fields (name, label, type, custom):\n",
        describe.name, description
    );
    for field in &describe.fields {
        prompt.push_str(&format!(
            "- {} | {} | {} | custom={}\n",
            field.name, field.label, field.field_type, field.custom
        ));
    }
    if let Some(fields) = &options.fields {
        prompt.push_str(&format!("\nPrefer selecting these fields: {}\n", fields.join(", ")));
    }
    if let Some(filters) = &options.filters {
        prompt.push_str(&format!("\nApply these filter constraints: {filters}\n"));
    }
    if let Some(limit) = options.limit {
        prompt.push_str(&format!("\nLimit the result to {limit} records.\n"));
    }
    prompt
}
