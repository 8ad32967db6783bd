//! HTTP route handlers for Tokengate.
//!
//! The bot front-end forwards slash-command interactions here and renders
//! the JSON replies (ephemeral text and an optional CAPTCHA attachment).

use axum::{
    Json, Router,
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, StatusCode, header, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use tokengate_common::constants::headers::X_ACTOR_ID;
use tokengate_common::{GateError, UserId};

use crate::state::AppState;

mod admin;
mod health;
mod redeem;

/// Upper bound on one request, platform round-trips included
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // Everything except health checks requires the front-end secret
    let authenticated = Router::new()
        // Redemption
        .route("/redeem", post(redeem::redeem))

        // Admin endpoints (privilege checked against the guild per request)
        .nest("/admin", admin_routes())

        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))

        .merge(authenticated)

        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Reject requests without `Authorization: Bearer <api_key>`
async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|key| keys_match(key, &state.api_key));

    if !authorized {
        tracing::warn!(path = %request.uri().path(), "Rejected request without valid API key");
        return Err(GateError::Unauthorized.into());
    }
    Ok(next.run(request).await)
}

/// Compare digests so the time taken does not depend on where the keys differ
fn keys_match(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/tokens", post(admin::issue_token))
        .route(
            "/lockouts/{identity}",
            get(admin::inspect_lockout).delete(admin::reset_lockout),
        )
        .route("/staff-roles", post(admin::add_staff_role))
        .route("/log-channel", put(admin::set_log_channel))
        .route("/stats", get(admin::stats))
}

/// JSON error body
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// `GateError` rendered as an HTTP response
pub struct ApiError(pub GateError);

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        let mut response = (
            status,
            Json(ErrorBody {
                error: self.0.public_message(),
            }),
        )
            .into_response();

        if self.0.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

/// Identity performing an administrative request, from `X-Actor-Id`
pub struct Actor(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(X_ACTOR_ID)
            .ok_or_else(|| GateError::InvalidInput(format!("missing {X_ACTOR_ID} header")))?;

        value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<UserId>().ok())
            .map(Actor)
            .ok_or_else(|| GateError::InvalidInput(format!("malformed {X_ACTOR_ID} header")).into())
    }
}
