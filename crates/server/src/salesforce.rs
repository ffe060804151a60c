use axum::extract::{Path, State};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;

use crmrelay_salesforce::{ObjectDescribe, QueryResult, SaveResult};

use crate::error::{require_object, require_text, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/salesforce/query", post(run_query))
        .route("/salesforce/create/{object_name}", post(create_record))
        .route("/salesforce/update/{object_name}/{record_id}", patch(update_record))
        .route("/salesforce/delete/{object_name}/{record_id}", delete(delete_record))
        .route("/salesforce/describe/{object_name}", get(describe_object))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QueryBody {
    soql: Option<String>,
}

async fn run_query(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> ApiResult<Json<QueryResult>> {
    let soql = require_text(body.soql, "soql")?;
    let result = state.crm.query(&soql).await.map_err(|error| state.crm_error(error))?;
    Ok(Json(result))
}

async fn create_record(
    State(state): State<AppState>,
    Path(object_name): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<SaveResult>> {
    let fields = require_object(body, "request body")?;
    let result = state
        .crm
        .create(&object_name, &fields)
        .await
        .map_err(|error| state.crm_error(error))?;
    Ok(Json(result))
}

async fn update_record(
    State(state): State<AppState>,
    Path((object_name, record_id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResult<Json<SaveResult>> {
    let fields = require_object(body, "request body")?;
    let result = state
        .crm
        .update(&object_name, &record_id, &fields)
        .await
        .map_err(|error| state.crm_error(error))?;
    Ok(Json(result))
}

async fn delete_record(
    State(state): State<AppState>,
    Path((object_name, record_id)): Path<(String, String)>,
) -> ApiResult<Json<SaveResult>> {
    let result = state
        .crm
        .delete(&object_name, &record_id)
        .await
        .map_err(|error| state.crm_error(error))?;
    Ok(Json(result))
}

async fn describe_object(
    State(state): State<AppState>,
    Path(object_name): Path<String>,
) -> ApiResult<Json<ObjectDescribe>> {
    let describe =
        state.crm.describe(&object_name).await.map_err(|error| state.crm_error(error))?;
    Ok(Json(describe))
}
