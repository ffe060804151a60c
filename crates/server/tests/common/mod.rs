#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{Map, Value};
use tower::ServiceExt;

use crmrelay_llm::{GenerateRequest, GenerateResponse, LlmClient, LlmError, TokenUsage};
use crmrelay_salesforce::{
    CrmApi, FieldDescribe, ObjectDescribe, QueryResult, SalesforceError, SaveResult,
};
use crmrelay_server::rate_limit::{InMemoryCounterStore, RateLimiter};
use crmrelay_server::router::build_router;
use crmrelay_server::state::AppState;

/// Scriptable CRM fake: answers every query from canned records and
/// logs write calls.
#[derive(Default)]
pub struct FakeCrm {
    pub records: Vec<Map<String, Value>>,
    /// When set, every query fails with this API error message.
    pub fail_query: Option<String>,
    pub creates: Mutex<Vec<(String, Map<String, Value>)>>,
    pub updates: Mutex<Vec<(String, String, Map<String, Value>)>>,
    pub deletes: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl CrmApi for FakeCrm {
    async fn query(&self, _soql: &str) -> Result<QueryResult, SalesforceError> {
        if let Some(message) = &self.fail_query {
            return Err(SalesforceError::Api { status: 400, message: message.clone() });
        }
        Ok(QueryResult {
            total_size: self.records.len() as u64,
            done: true,
            records: self.records.clone(),
        })
    }

    async fn create(
        &self,
        object: &str,
        fields: &Map<String, Value>,
    ) -> Result<SaveResult, SalesforceError> {
        self.creates.lock().expect("creates lock").push((object.to_string(), fields.clone()));
        Ok(SaveResult { id: Some("003FAKE".to_string()), success: true, errors: Vec::new() })
    }

    async fn update(
        &self,
        object: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> Result<SaveResult, SalesforceError> {
        self.updates
            .lock()
            .expect("updates lock")
            .push((object.to_string(), id.to_string(), fields.clone()));
        Ok(SaveResult { id: Some(id.to_string()), success: true, errors: Vec::new() })
    }

    async fn delete(&self, object: &str, id: &str) -> Result<SaveResult, SalesforceError> {
        self.deletes.lock().expect("deletes lock").push((object.to_string(), id.to_string()));
        Ok(SaveResult { id: Some(id.to_string()), success: true, errors: Vec::new() })
    }

    async fn describe(&self, object: &str) -> Result<ObjectDescribe, SalesforceError> {
        Ok(ObjectDescribe {
            name: object.to_string(),
            label: object.to_string(),
            fields: vec![FieldDescribe {
                name: "LastName".to_string(),
                label: "Last Name".to_string(),
                field_type: "string".to_string(),
                custom: false,
            }],
        })
    }
}

/// Model fake: logs every request and answers with a fixed reply.
pub struct FakeLlm {
    pub reply: String,
    pub requests: Mutex<Vec<GenerateRequest>>,
}

impl FakeLlm {
    pub fn new(reply: &str) -> Self {
        Self { reply: reply.to_string(), requests: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError> {
        self.requests.lock().expect("requests lock").push(request);
        Ok(GenerateResponse {
            id: "msg_fake".to_string(),
            model: "claude-fake".to_string(),
            text: self.reply.clone(),
            stop_reason: Some("end_turn".to_string()),
            usage: TokenUsage { input_tokens: 10, output_tokens: 5 },
        })
    }
}

pub struct TestAppBuilder {
    crm: Arc<FakeCrm>,
    llm: Arc<FakeLlm>,
    max_requests: u32,
    window_secs: u64,
    expose_upstream_errors: bool,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        Self {
            crm: Arc::new(FakeCrm::default()),
            llm: Arc::new(FakeLlm::new("fake analysis")),
            max_requests: 1000,
            window_secs: 60,
            expose_upstream_errors: true,
        }
    }

    pub fn crm(mut self, crm: Arc<FakeCrm>) -> Self {
        self.crm = crm;
        self
    }

    pub fn llm(mut self, llm: Arc<FakeLlm>) -> Self {
        self.llm = llm;
        self
    }

    pub fn rate_limit(mut self, max_requests: u32, window_secs: u64) -> Self {
        self.max_requests = max_requests;
        self.window_secs = window_secs;
        self
    }

    pub fn redact_upstream_errors(mut self) -> Self {
        self.expose_upstream_errors = false;
        self
    }

    pub fn build(self) -> Router {
        let limiter = RateLimiter::new(
            Arc::new(InMemoryCounterStore::default()),
            self.max_requests,
            self.window_secs,
        );
        build_router(AppState {
            crm: self.crm,
            llm: self.llm,
            limiter,
            expose_upstream_errors: self.expose_upstream_errors,
        })
    }
}

pub fn record(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(key, value)| (key.to_string(), value.clone())).collect()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).expect("request");
    app.clone().oneshot(request).await.expect("response")
}

pub async fn post_json(
    app: &Router,
    uri: &str,
    body: Value,
    api_key: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    let request = builder.body(Body::from(body.to_string())).expect("request");
    app.clone().oneshot(request).await.expect("response")
}

pub async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: Value,
) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    app.clone().oneshot(request).await.expect("response")
}

pub const MULTIPART_BOUNDARY: &str = "crmrelay-test-boundary";

/// Build a multipart/form-data body from (name, filename, content) parts.
pub fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> String {
    let mut body = String::new();
    for (name, file_name, content) in parts {
        body.push_str(&format!("--{MULTIPART_BOUNDARY}\r\n"));
        match file_name {
            Some(file_name) => {
                body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n"
                ));
                body.push_str("Content-Type: text/csv\r\n");
            }
            None => {
                body.push_str(&format!("Content-Disposition: form-data; name=\"{name}\"\r\n"));
            }
        }
        body.push_str("\r\n");
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{MULTIPART_BOUNDARY}--\r\n"));
    body
}

pub async fn post_multipart(
    app: &Router,
    uri: &str,
    parts: &[(&str, Option<&str>, &str)],
    api_key: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder().method("POST").uri(uri).header(
        "content-type",
        format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
    );
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    let request = builder.body(Body::from(multipart_body(parts))).expect("request");
    app.clone().oneshot(request).await.expect("response")
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.expect("body").to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).expect("utf8 body")
}
