//! Administrative endpoints. Privilege is checked by the engine against the
//! guild on every call.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use tokengate_common::{
    IssueTokenRequest, IssueTokenResponse, LockoutView, LogChannelRequest, StaffRoleRequest,
    StatsSnapshot, UserId,
};

use super::{Actor, ApiError};
use crate::state::AppState;

/// Mint a token for `target`; the caller delivers it out-of-band
pub async fn issue_token(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<IssueTokenRequest>,
) -> Result<Json<IssueTokenResponse>, ApiError> {
    let token = state.engine.issue_token(actor, payload.target).await?;
    Ok(Json(IssueTokenResponse {
        target: payload.target,
        token,
    }))
}

pub async fn inspect_lockout(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(identity): Path<UserId>,
) -> Result<Json<LockoutView>, ApiError> {
    Ok(Json(state.engine.inspect(actor, identity).await?))
}

pub async fn reset_lockout(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(identity): Path<UserId>,
) -> Result<StatusCode, ApiError> {
    state.engine.reset(actor, identity).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 201 when added, 200 when it was already configured
pub async fn add_staff_role(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<StaffRoleRequest>,
) -> Result<StatusCode, ApiError> {
    let added = state.engine.configure_role(actor, payload.role_id).await?;
    Ok(if added { StatusCode::CREATED } else { StatusCode::OK })
}

pub async fn set_log_channel(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<LogChannelRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .configure_log_channel(actor, payload.channel_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn stats(
    State(state): State<AppState>,
    Actor(actor): Actor,
) -> Result<Json<StatsSnapshot>, ApiError> {
    Ok(Json(state.engine.stats(actor).await?))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{app, body_json, json_request};
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_missing_actor_header() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _guild) = app(&dir).await;

        let response = app
            .oneshot(json_request("POST", "/admin/tokens", None, json!({"target": 5})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_non_admin_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _guild) = app(&dir).await;

        let response = app
            .clone()
            .oneshot(json_request("POST", "/admin/tokens", Some(55), json!({"target": 5})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Administrators cannot change guild settings; only the owner can
        let response = app
            .oneshot(json_request("PUT", "/admin/log-channel", Some(2), json!({"channel_id": 9})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_reset_and_inspect() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _guild) = app(&dir).await;

        for _ in 0..3 {
            app.clone()
                .oneshot(json_request("POST", "/redeem", None, json!({"identity": 9, "token": "bad"})))
                .await
                .unwrap();
        }

        let response = app
            .clone()
            .oneshot(json_request("GET", "/admin/lockouts/9", Some(2), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["state"], "warned");
        assert_eq!(body["record"]["failures"], 3);

        let response = app
            .clone()
            .oneshot(json_request("DELETE", "/admin/lockouts/9", Some(2), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(json_request("GET", "/admin/lockouts/9", Some(1), json!({})))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["state"], "clear");
        assert_eq!(body["record"]["failures"], 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _guild) = app(&dir).await;

        app.clone()
            .oneshot(json_request("POST", "/admin/tokens", Some(1), json!({"target": 5})))
            .await
            .unwrap();

        let response = app
            .oneshot(json_request("GET", "/admin/stats", Some(1), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["outstanding_tokens"], 1);
    }
}
