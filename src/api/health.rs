//! Health check endpoints
//!
//! Provides health check endpoints for monitoring and load balancers. These
//! stay servable while the database is down.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{db, AppState};

/// Basic health response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Database health response
#[derive(Serialize)]
pub struct DatabaseHealthResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Simple health check endpoint (for load balancers)
///
/// Returns 200 OK if the service is running.
/// Does not check component health.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    })
}

/// Database connectivity check
///
/// Runs a trivial round trip against the pool. Returns 200 when the database
/// answers and 500 with the error detail when it does not.
pub async fn database_health(
    State(state): State<AppState>,
) -> (StatusCode, Json<DatabaseHealthResponse>) {
    match db::check_health(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(DatabaseHealthResponse {
                status: "ok".to_string(),
                message: "Database connection successful".to_string(),
                timestamp: Utc::now(),
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(DatabaseHealthResponse {
                status: "error".to_string(),
                message: "Database connection failed".to_string(),
                timestamp: Utc::now(),
                error: Some(e.to_string()),
            }),
        ),
    }
}
