//! Health check integration tests for clinic-billing-service.

mod common;

use common::TestApp;
use reqwest::Client;

#[tokio::test]
async fn health_check_works() {
    let app = TestApp::new().await;
    let address = app.spawn_http().await;
    let client = Client::new();

    let response = client
        .get(&format!("{}/health", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "clinic-billing-service");
}

#[tokio::test]
async fn readiness_check_works() {
    let app = TestApp::new().await;
    let address = app.spawn_http().await;
    let client = Client::new();

    let response = client
        .get(&format!("{}/ready", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
}

#[tokio::test]
async fn metrics_endpoint_works() {
    let app = TestApp::new().await;
    let address = app.spawn_http().await;
    let client = Client::new();

    let response = client
        .get(&format!("{}/metrics", address))
        .send()
        .await
        .expect("Failed to execute request");

    // Metrics endpoint should return 200 OK with text/plain content type
    assert!(response.status().is_success());
    assert!(response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap_or("").contains("text/plain"))
        .unwrap_or(false));
}

#[tokio::test]
async fn request_id_is_echoed_or_assigned() {
    let app = TestApp::new().await;
    let address = app.spawn_http().await;
    let client = Client::new();

    let echoed = client
        .get(&format!("{}/health", address))
        .header("x-request-id", "front-desk-42")
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(
        echoed.headers().get("x-request-id").unwrap(),
        "front-desk-42"
    );

    let assigned = client
        .get(&format!("{}/health", address))
        .send()
        .await
        .expect("Failed to execute request");
    let id = assigned.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn metrics_endpoint_reports_http_requests() {
    let app = TestApp::new().await;
    let address = app.spawn_http().await;
    let client = Client::new();

    client
        .get(&format!("{}/ready", address))
        .send()
        .await
        .expect("Failed to execute request");

    let body = client
        .get(&format!("{}/metrics", address))
        .send()
        .await
        .expect("Failed to execute request")
        .text()
        .await
        .expect("Failed to read body");

    assert!(body.contains("http_requests_total"));
    assert!(body.contains("http_request_duration_seconds"));
}
