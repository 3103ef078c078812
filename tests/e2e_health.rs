//! E2E tests for health and metrics endpoints

mod common;

use common::TestServer;
use serde_json::json;

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_metrics_expose_login_counters() {
    oauth_profile::metrics::init_metrics();
    let server = TestServer::new().await;
    server
        .login("github", json!({"id": 1, "login": "octocat"}))
        .await;

    let response = server
        .client
        .get(server.url("/metrics"))
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = response.text().await.unwrap();
    assert!(body.contains("oauth_profile_logins_total"));
    assert!(body.contains(r#"provider="github""#));
}

#[tokio::test]
async fn test_metrics_label_rejected_claims() {
    oauth_profile::metrics::init_metrics();
    let server = TestServer::new().await;
    server
        .provider
        .set_claims("google", json!({"sub": "1", "name": "No Mail"}));

    let response = server.callback("google", "code-1").await;
    assert_eq!(response.status(), 401);

    let body = server
        .client
        .get(server.url("/metrics"))
        .send()
        .await
        .expect("request succeeds")
        .text()
        .await
        .unwrap();
    assert!(body.contains(r#"outcome="invalid_claims",provider="google""#));
}
