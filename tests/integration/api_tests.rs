//! API surface tests: health endpoints, auth gating and error shapes

use axum::http::StatusCode;
use uuid::Uuid;

use crate::common::{generate_expired_token, generate_test_token, TestApp};

#[tokio::test]
async fn health_returns_ok_with_timestamp() {
    let app = TestApp::new().await;

    let response = app.get("/api/v1/health").await;
    response.assert_ok();

    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "ok");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn health_does_not_require_authentication() {
    let app = TestApp::new().await;

    // No Authorization header at all
    let response = app.get("/api/v1/health").await;
    response.assert_ok();
}

#[tokio::test]
async fn organizations_require_authentication() {
    let app = TestApp::new().await;

    let response = app.get("/api/v1/organizations").await;
    response.assert_unauthorized();

    let json: serde_json::Value = response.json();
    assert_eq!(json["error"], "unauthorized");
}

#[tokio::test]
async fn audit_logs_require_authentication() {
    let app = TestApp::new().await;

    let response = app.get("/api/v1/audit-logs").await;
    response.assert_unauthorized();
}

#[tokio::test]
async fn garbage_token_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .get_with_auth("/api/v1/organizations", "not-a-jwt")
        .await;
    response.assert_unauthorized();
}

#[tokio::test]
async fn expired_token_is_rejected_with_message() {
    let app = TestApp::new().await;
    let token = generate_expired_token(&app.state.config, Uuid::new_v4());

    let response = app.get_with_auth("/api/v1/organizations", &token).await;
    response.assert_unauthorized();

    let json: serde_json::Value = response.json();
    assert!(json["message"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .contains("expired"));
}

#[tokio::test]
async fn token_signed_with_other_secret_is_rejected() {
    let app = TestApp::new().await;

    let mut other = app.state.config.clone();
    other.auth.jwt_secret = "a_different_secret_also_32_bytes_long!!".to_string();
    let token = generate_test_token(&other, Uuid::new_v4());

    let response = app.get_with_auth("/api/v1/organizations", &token).await;
    response.assert_unauthorized();
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = TestApp::new().await;

    let response = app.get("/api/v1/does-not-exist").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn database_health_reports_ok_against_live_database() {
    let app = TestApp::new().await;

    let response = app.get("/api/v1/health/database").await;
    response.assert_ok();

    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn authenticated_user_without_memberships_sees_empty_listing() {
    let app = TestApp::new().await;
    let token = generate_test_token(&app.state.config, Uuid::new_v4());

    let response = app.get_with_auth("/api/v1/organizations", &token).await;
    response.assert_ok();

    let orgs: Vec<serde_json::Value> = response.json();
    assert!(orgs.is_empty());
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn create_organization_rejects_empty_name() {
    let app = TestApp::new().await;
    let token = generate_test_token(&app.state.config, Uuid::new_v4());

    let response = app
        .post_json_with_auth(
            "/api/v1/organizations",
            serde_json::json!({ "name": "" }),
            &token,
        )
        .await;

    // validator rejects the payload before any database work
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}
