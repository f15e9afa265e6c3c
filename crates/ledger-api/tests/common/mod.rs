//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use ledger_service::{LedgerConfig, LedgerService, spawn_notification_pipeline};
use ledger_store::PgLedgerStore;
use ledger_test_support::{FixedClock, RecordingPublisher, SequenceNotificationIds};
use sqlx::PgPool;
use tower::ServiceExt;

use ledger_api::app;
use ledger_api::state::AppState;

/// Build the full app router on a real `PgLedgerStore` with a deterministic
/// clock, sequential notification ids and a recording publisher.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with_publisher(pool, Arc::new(RecordingPublisher::new()))
}

/// Same as `build_test_app` but publishing through `publisher`, so tests
/// can inspect what was published.
pub fn build_test_app_with_publisher(pool: PgPool, publisher: Arc<RecordingPublisher>) -> Router {
    let store = Arc::new(PgLedgerStore::new(pool));
    let clock = Arc::new(FixedClock::default());
    let (queue, _pipeline) = spawn_notification_pipeline(store.clone(), publisher, clock.clone(), 64);
    let service = LedgerService::new(
        store,
        clock,
        Arc::new(SequenceNotificationIds::new()),
        queue,
        LedgerConfig::default(),
    );
    app(AppState::new(Arc::new(service)))
}

/// Send a POST request with a JSON body and return the status and raw body.
pub async fn post_json(app: Router, uri: &str, body: &serde_json::Value) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();

    (status, body_bytes.to_vec())
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Parse a response body as JSON.
pub fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}
