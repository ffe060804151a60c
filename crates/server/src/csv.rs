use std::path::PathBuf;

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crmrelay_llm::{GenerateRequest, TokenUsage};
use crmrelay_pipeline::{
    AuthoringOptions, ContactImporter, ImportError, ImportSummary, ReportFile, ReportGenerator,
    ReportOutcome,
};

use crate::auth::ModelCredential;
use crate::error::{require_text, ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_REPORT_NAME: &str = "contacts";
const DEFAULT_ANALYZE_TASK: &str =
    "Summarize this contact data and call out anything unusual or incomplete.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/csv/import/contacts", post(import_contacts))
        .route("/csv/report/contacts", post(report_contacts))
        .route("/csv/analyze/contacts", post(analyze_contacts))
}

/// Stage the uploaded CSV to a transient file and run the import
/// pipeline over it. Row failures come back inside the summary; only a
/// structurally unreadable file is an error.
async fn import_contacts(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<ImportSummary>> {
    let staged = stage_upload(multipart).await?;
    let importer = ContactImporter::new(state.crm.clone());

    match importer.import_file(&staged).await {
        Ok(summary) => Ok(Json(summary)),
        Err(error) => {
            // The pipeline only deletes the file once it parses; clean up here.
            if let Err(cleanup) = tokio::fs::remove_file(&staged).await {
                warn!(path = %staged.display(), error = %cleanup, "could not delete staged upload");
            }
            Err(match error {
                ImportError::Parse(inner) => {
                    ApiError::validation(format!("could not parse csv upload: {inner}"))
                }
                ImportError::Read(inner) => {
                    ApiError::internal(format!("could not read staged upload: {inner}"))
                }
            })
        }
    }
}

async fn stage_upload(mut multipart: Multipart) -> Result<PathBuf, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::validation(format!("malformed multipart body: {error}")))?
    {
        if field.name() != Some("file") && field.file_name().is_none() {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|error| ApiError::validation(format!("could not read upload: {error}")))?;
        let path = std::env::temp_dir()
            .join(format!("crmrelay_upload_{}.csv", Uuid::new_v4().simple()));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|error| ApiError::internal(format!("could not stage upload: {error}")))?;
        return Ok(path);
    }
    Err(ApiError::validation("multipart field `file` is required"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ReportBody {
    soql: Option<String>,
    description: Option<String>,
    report_name: Option<String>,
    #[serde(flatten)]
    authoring: AuthoringOptions,
}

/// Produce a CSV report and stream it back.
///
/// The query comes either verbatim from `soql` or, given `description`,
/// from the model (which needs the caller's credential). An empty result
/// set is a 200 with `success: false`, not a file.
async fn report_contacts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ReportBody>,
) -> ApiResult<Response> {
    let report_name = body
        .report_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REPORT_NAME.to_string());
    let generator = ReportGenerator::new(state.crm.clone(), state.llm.clone());

    let soql = match body.soql.map(|soql| soql.trim().to_string()).filter(|soql| !soql.is_empty())
    {
        Some(soql) => soql,
        None => {
            let description = require_text(body.description, "description").map_err(|_| {
                ApiError::validation("either `soql` or `description` is required")
            })?;
            let credential = ModelCredential::from_headers(&headers)?;
            generator
                .generate_report_query(&description, "Contact", &body.authoring, Some(credential.0))
                .await
                .map_err(|error| state.report_error(error))?
                .soql
        }
    };

    match generator
        .generate(&soql, &report_name, None)
        .await
        .map_err(|error| state.report_error(error))?
    {
        ReportOutcome::Empty { message } => {
            Ok(Json(json!({ "success": false, "message": message })).into_response())
        }
        ReportOutcome::File(file) => stream_and_delete(file).await,
    }
}

async fn stream_and_delete(file: ReportFile) -> ApiResult<Response> {
    let bytes = tokio::fs::read(&file.path)
        .await
        .map_err(|error| ApiError::internal(format!("could not read report file: {error}")))?;
    if let Err(error) = tokio::fs::remove_file(&file.path).await {
        warn!(path = %file.path.display(), error = %error, "could not delete report file");
    }

    let disposition = format!("attachment; filename=\"{}\"", file.file_name);
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|error| ApiError::internal(format!("invalid report file name: {error}")))?;
    let record_count = HeaderValue::from_str(&file.record_count.to_string())
        .map_err(|error| ApiError::internal(format!("invalid record count: {error}")))?;

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static("text/csv")),
        (header::CONTENT_DISPOSITION, disposition),
        (HeaderName::from_static("x-record-count"), record_count),
    ];
    Ok((headers, bytes).into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    analysis: String,
    model: String,
    usage: TokenUsage,
}

/// Hand an uploaded CSV to the model for analysis. The file is never
/// staged to disk and never reaches the CRM.
async fn analyze_contacts(
    State(state): State<AppState>,
    credential: ModelCredential,
    mut multipart: Multipart,
) -> ApiResult<Json<AnalyzeResponse>> {
    let mut csv_text: Option<String> = None;
    let mut task: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::validation(format!("malformed multipart body: {error}")))?
    {
        let name = field.name().map(str::to_string);
        let is_file = field.file_name().is_some();
        let text = field
            .text()
            .await
            .map_err(|error| ApiError::validation(format!("could not read upload: {error}")))?;
        match name.as_deref() {
            Some("file") => csv_text = Some(text),
            Some("task") => task = Some(text),
            _ if is_file && csv_text.is_none() => csv_text = Some(text),
            _ => {}
        }
    }

    let csv_text = csv_text
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| ApiError::validation("multipart field `file` is required"))?;
    let task = task
        .filter(|task| !task.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ANALYZE_TASK.to_string());

    let prompt = format!("Task: {task}\n\nContact CSV data:\n{csv_text}");
    let request = GenerateRequest::new(prompt).with_api_key_override(Some(credential.0));
    let response = state.llm.generate(request).await.map_err(|error| state.llm_error(error))?;

    Ok(Json(AnalyzeResponse {
        analysis: response.text,
        model: response.model,
        usage: response.usage,
    }))
}
