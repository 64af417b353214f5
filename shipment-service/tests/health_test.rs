mod common;

use common::TestApp;
use serde_json::Value;

#[tokio::test]
async fn health_and_readiness_respond() {
    let app = TestApp::spawn().await;

    let response = app.get("/health").await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "shipment-service");
    assert!(body["version"].is_string());

    let response = app.get("/ready").await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn metrics_endpoint_exports_request_counters() {
    let app = TestApp::spawn().await;

    app.get("/health").await;

    let response = app.get("/metrics").await;
    assert_eq!(response.status().as_u16(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("http_requests_total"));
}
