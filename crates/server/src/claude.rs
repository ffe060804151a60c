use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;

use crmrelay_llm::{GenerateOptions, GenerateRequest, GenerateResponse};

use crate::auth::ModelCredential;
use crate::error::{require_text, ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/claude/generate", post(generate))
        .route("/claude/process-salesforce", post(process_salesforce))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GenerateBody {
    prompt: Option<String>,
    options: GenerateOptions,
}

async fn generate(
    State(state): State<AppState>,
    credential: ModelCredential,
    Json(body): Json<GenerateBody>,
) -> ApiResult<Json<GenerateResponse>> {
    let prompt = require_text(body.prompt, "prompt")?;
    let request = GenerateRequest::new(prompt)
        .with_options(body.options)
        .with_api_key_override(Some(credential.0));
    let response = state.llm.generate(request).await.map_err(|error| state.llm_error(error))?;
    Ok(Json(response))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ProcessBody {
    sf_data: Option<Value>,
    task: Option<String>,
    options: GenerateOptions,
}

/// Render caller-supplied CRM data into a prompt and hand it to the
/// model. The data is embedded as pretty-printed JSON, untouched.
async fn process_salesforce(
    State(state): State<AppState>,
    credential: ModelCredential,
    Json(body): Json<ProcessBody>,
) -> ApiResult<Json<GenerateResponse>> {
    let data = body.sf_data.ok_or_else(|| ApiError::validation("`sfData` is required"))?;
    let task = require_text(body.task, "task")?;

    let rendered =
        serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string());
    let prompt = format!("Task: {task}\n\nSalesforce data:\n{rendered}");

    let request = GenerateRequest::new(prompt)
        .with_options(body.options)
        .with_api_key_override(Some(credential.0));
    let response = state.llm.generate(request).await.map_err(|error| state.llm_error(error))?;
    Ok(Json(response))
}
