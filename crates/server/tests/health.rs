mod common;

use axum::http::StatusCode;

use common::{body_json, get, TestAppBuilder};

#[tokio::test]
async fn health_reports_ok_without_touching_upstreams() {
    let app = TestAppBuilder::new().build();

    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    // The probe is exempt from rate limiting.
    assert!(response.headers().get("x-ratelimit-limit").is_none());

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "crmrelay");
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let app = TestAppBuilder::new().build();
    let response = get(&app, "/api/unknown").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
