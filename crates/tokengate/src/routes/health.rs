//! Health check endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: i64,
}

/// Basic health check (is the server running?)
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: chrono::Utc::now().timestamp() - state.started_at,
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    credentials: bool,
}

/// Readiness check (is the credential backend reachable?)
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<Json<ReadyResponse>, StatusCode> {
    if state.engine.ready().await {
        Ok(Json(ReadyResponse {
            status: "ready",
            credentials: true,
        }))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
