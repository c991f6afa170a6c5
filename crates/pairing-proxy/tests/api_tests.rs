//! Integration tests for the pairing proxy API.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{FakeEngine, Harness, UPLOAD_URL};
use pairing_proxy::api::{create_router, AppState, RateLimitState};
use tower::ServiceExt;

fn create_test_app(h: &Harness) -> Router {
    let state = AppState::new(h.coordinator.clone());
    create_router(state, RateLimitState::permissive(), None)
}

async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = Harness::new(FakeEngine::new(), Some(UPLOAD_URL));

    let (status, json) = get(create_test_app(&h), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["state"], "idle");
    assert_eq!(json["session_active"], false);
    assert!(json.get("bridge_healthy").is_none());
    assert!(json["checked_at"].is_string());
}

#[tokio::test]
async fn test_pair_without_number() {
    let h = Harness::new(FakeEngine::new(), Some(UPLOAD_URL));

    let (status, json) = get(create_test_app(&h), "/pair").await;

    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(json["message"], "Phone number is required");
    assert_eq!(json["code"], "PHONE_NUMBER_REQUIRED");
    assert_eq!(h.engine.connects(), 0);
}

#[tokio::test]
async fn test_pair_returns_formatted_code() {
    let h = Harness::new(FakeEngine::new(), Some(UPLOAD_URL));

    let (status, json) = get(create_test_app(&h), "/pair?code=%2B1%20555-123-4567").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["code"], "ABCD-EFGH");
    assert_eq!(h.engine.pairing_numbers(), vec!["15551234567".to_string()]);
}

#[tokio::test]
async fn test_pair_failure_hides_details() {
    let h = Harness::new(FakeEngine::new().failing_pairing(), Some(UPLOAD_URL));

    let (status, json) = get(create_test_app(&h), "/pair?code=15551234567").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Internal error");
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert!(!json.to_string().contains("rejected"));
}

#[tokio::test]
async fn test_health_reports_session_after_pairing() {
    let h = Harness::new(FakeEngine::new(), Some(UPLOAD_URL));
    let app = create_test_app(&h);

    let (status, _) = get(app.clone(), "/pair?code=15551234567").await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = get(app, "/health").await;
    assert_eq!(json["state"], "awaiting_link");
    assert_eq!(json["session_active"], true);
}

#[tokio::test]
async fn test_pair_rate_limited() {
    let h = Harness::new(FakeEngine::new(), Some(UPLOAD_URL));
    let state = AppState::new(h.coordinator.clone());
    let app = create_router(state, RateLimitState::new(1), None);

    let (first, _) = get(app.clone(), "/pair").await;
    let (second, _) = get(app.clone(), "/pair").await;

    assert_eq!(first, StatusCode::IM_A_TEAPOT);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);

    // Health checks are not limited
    let (health, _) = get(app, "/health").await;
    assert_eq!(health, StatusCode::OK);
}

#[tokio::test]
async fn test_static_front_end_served() {
    let h = Harness::new(FakeEngine::new(), Some(UPLOAD_URL));
    let site = tempfile::TempDir::new().unwrap();
    std::fs::write(site.path().join("index.html"), "<h1>pair</h1>").unwrap();

    let state = AppState::new(h.coordinator.clone());
    let app = create_router(
        state,
        RateLimitState::permissive(),
        Some(site.path().to_path_buf()),
    );

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"<h1>pair</h1>");
}
