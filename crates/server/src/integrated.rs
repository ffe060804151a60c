use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crmrelay_core::errors::UpstreamService;
use crmrelay_llm::{parse_field_updates, GenerateOptions, GenerateRequest};
use crmrelay_pipeline::{escape_soql_literal, AuthoringOptions, ReportGenerator};
use crmrelay_salesforce::{FieldDescribe, SObject, SaveResult};

use crate::auth::ModelCredential;
use crate::error::{require_text, ApiError, ApiResult};
use crate::state::AppState;

/// Key present on queried records that carries endpoint metadata, not data.
const METADATA_KEY: &str = "attributes";

const DEFAULT_ANALYZE_TASK: &str = "Summarize the notable patterns in this data.";
const DEFAULT_ENRICH_TASK: &str =
    "Suggest improved values for incomplete or inconsistent fields.";
const DEFAULT_SOQL_OBJECT: &str = "Contact";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/integrated/query-analyze", post(query_analyze))
        .route("/integrated/generate-soql", post(generate_soql))
        .route("/integrated/enrich-data/{object_name}/{record_id}", post(enrich_data))
}

/// Object names land in the query as identifiers, not quoted literals,
/// so they are restricted to `[A-Za-z0-9_]` instead of escaped.
fn is_object_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct QueryAnalyzeBody {
    soql: Option<String>,
    task: Option<String>,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryAnalyzeResponse {
    soql: String,
    record_count: u64,
    records: Vec<SObject>,
    analysis: String,
    model: String,
}

/// Run a caller-supplied query, then ask the model to analyze the
/// returned records.
async fn query_analyze(
    State(state): State<AppState>,
    credential: ModelCredential,
    Json(body): Json<QueryAnalyzeBody>,
) -> ApiResult<Json<QueryAnalyzeResponse>> {
    let soql = require_text(body.soql, "soql")?;
    let task = body
        .task
        .filter(|task| !task.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ANALYZE_TASK.to_string());

    let result = state.crm.query(&soql).await.map_err(|error| state.crm_error(error))?;

    let rendered = serde_json::to_string_pretty(&result.records)
        .unwrap_or_else(|_| format!("{:?}", result.records));
    let prompt = format!(
        "Task: {task}\n\nQuery:\n{soql}\n\nRecords ({} returned, {} total):\n{rendered}",
        result.records.len(),
        result.total_size
    );

    let request = GenerateRequest::new(prompt)
        .with_options(body.options)
        .with_api_key_override(Some(credential.0));
    let response = state.llm.generate(request).await.map_err(|error| state.llm_error(error))?;

    Ok(Json(QueryAnalyzeResponse {
        soql,
        record_count: result.total_size,
        records: result.records,
        analysis: response.text,
        model: response.model,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GenerateSoqlBody {
    description: Option<String>,
    object_name: Option<String>,
    #[serde(flatten)]
    options: AuthoringOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateSoqlResponse {
    soql: String,
    object_name: String,
    fields: Vec<FieldDescribe>,
}

/// Have the model author a SOQL query from a description and the target
/// object's live metadata. The returned text is trusted verbatim.
async fn generate_soql(
    State(state): State<AppState>,
    credential: ModelCredential,
    Json(body): Json<GenerateSoqlBody>,
) -> ApiResult<Json<GenerateSoqlResponse>> {
    let description = require_text(body.description, "description")?;
    let object_name = body
        .object_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SOQL_OBJECT.to_string());

    let generator = ReportGenerator::new(state.crm.clone(), state.llm.clone());
    let authored = generator
        .generate_report_query(&description, &object_name, &body.options, Some(credential.0))
        .await
        .map_err(|error| state.report_error(error))?;

    Ok(Json(GenerateSoqlResponse {
        soql: authored.soql,
        object_name: authored.describe.name,
        fields: authored.describe.fields,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct EnrichBody {
    task: Option<String>,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnrichResponse {
    object_name: String,
    record_id: String,
    updates: Map<String, Value>,
    result: SaveResult,
    model: String,
}

/// Fetch a record, ask the model for field updates, and write the
/// model's answer back to the record.
async fn enrich_data(
    State(state): State<AppState>,
    Path((object_name, record_id)): Path<(String, String)>,
    credential: ModelCredential,
    Json(body): Json<EnrichBody>,
) -> ApiResult<Json<EnrichResponse>> {
    if !is_object_identifier(&object_name) {
        return Err(ApiError::validation(format!(
            "`{object_name}` is not a valid object name"
        )));
    }
    let soql = format!(
        "SELECT FIELDS(ALL) FROM {object_name} WHERE Id = '{}' LIMIT 1",
        escape_soql_literal(&record_id)
    );
    let result = state.crm.query(&soql).await.map_err(|error| state.crm_error(error))?;
    let Some(mut record) = result.records.into_iter().next() else {
        return Err(ApiError::validation(format!(
            "no {object_name} record found for id `{record_id}`"
        )));
    };
    record.remove(METADATA_KEY);

    let task = body
        .task
        .filter(|task| !task.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ENRICH_TASK.to_string());
    let rendered = serde_json::to_string_pretty(&record)
        .unwrap_or_else(|_| Value::Object(record.clone()).to_string());
    let prompt = format!(
        "Task: {task}\n\nCurrent `{object_name}` record:\n{rendered}\n\n\
         Respond with a JSON object mapping field names to their new values. \
         Respond with JSON only, no commentary."
    );

    let request = GenerateRequest::new(prompt)
        .with_options(body.options)
        .with_api_key_override(Some(credential.0));
    let response = state.llm.generate(request).await.map_err(|error| state.llm_error(error))?;

    let updates = parse_field_updates(&response.text).map_err(|reason| {
        ApiError::upstream(
            UpstreamService::Anthropic,
            format!("model did not return a field-update object: {reason}"),
            state.expose_upstream_errors,
        )
    })?;

    let save = state
        .crm
        .update(&object_name, &record_id, &updates)
        .await
        .map_err(|error| state.crm_error(error))?;

    Ok(Json(EnrichResponse {
        object_name,
        record_id,
        updates,
        result: save,
        model: response.model,
    }))
}

#[cfg(test)]
mod tests {
    use super::is_object_identifier;

    #[test]
    fn object_identifiers_allow_word_characters_only() {
        assert!(is_object_identifier("Contact"));
        assert!(is_object_identifier("Invoice__c"));
        assert!(!is_object_identifier(""));
        assert!(!is_object_identifier("Contact WHERE Id != null"));
        assert!(!is_object_identifier("Contact;DELETE"));
    }
}
