//! Health endpoints.

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use pairline_api::build_app;

use crate::helpers::TestServer;

async fn get_json(server: &TestServer, uri: &str) -> (StatusCode, Value) {
    let response = build_app(server.state.clone())
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::start().await;
    let (status, body) = get_json(&server, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_detailed_health_counts_connections() {
    let server = TestServer::start().await;
    let _a = server.login("user-a", "male").await;

    let (status, body) = get_json(&server, "/api/health/detailed").await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["store"], "connected");
    assert_eq!(data["ws_connections"], 1);
    assert_eq!(data["online_users"], 1);
    assert_eq!(data["metrics"]["connections_active"], 1);
}
