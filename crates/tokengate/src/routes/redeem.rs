//! Token redemption endpoint.

use axum::{Json, extract::State, http::StatusCode};
use base64::{Engine, engine::general_purpose::STANDARD};

use tokengate_common::{RedeemRequest, RedeemResponse, RedeemStatus};

use super::ApiError;
use crate::engine::{ChallengeImage, Outcome};
use crate::state::AppState;

/// Redeem a staff token
///
/// Returns:
/// - 200: Redeemed, or a CAPTCHA must be solved first
/// - 401: Invalid token (failure count included)
/// - 403: Identity is hard-locked
/// - 429: Timeout active
pub async fn redeem(
    State(state): State<AppState>,
    Json(payload): Json<RedeemRequest>,
) -> Result<(StatusCode, Json<RedeemResponse>), ApiError> {
    let outcome = state
        .engine
        .redeem(payload.identity, &payload.token, payload.captcha_answer.as_deref())
        .await?;

    let status = outcome
        .rejection()
        .and_then(|e| StatusCode::from_u16(e.status_code()).ok())
        .unwrap_or(StatusCode::OK);

    Ok((status, Json(render(outcome))))
}

fn render(outcome: Outcome) -> RedeemResponse {
    let message = outcome.message();
    let mut response = RedeemResponse {
        status: RedeemStatus::Success,
        message,
        failures: None,
        retry_after_secs: None,
        captcha_png_base64: None,
        granted_roles: Vec::new(),
    };

    match outcome {
        Outcome::Success { granted } => response.granted_roles = granted,
        Outcome::Throttled { retry_after_secs } => {
            response.status = RedeemStatus::Throttled;
            response.retry_after_secs = Some(retry_after_secs);
        }
        Outcome::PermanentlyLocked => response.status = RedeemStatus::Locked,
        Outcome::ChallengeRequired { challenge } => {
            response.status = RedeemStatus::ChallengeRequired;
            response.captcha_png_base64 = Some(encode(&challenge));
        }
        Outcome::InvalidToken {
            failures,
            challenge,
            ..
        } => {
            response.status = RedeemStatus::InvalidToken;
            response.failures = Some(failures);
            response.captcha_png_base64 = challenge.as_ref().map(encode);
        }
    }

    response
}

fn encode(challenge: &ChallengeImage) -> String {
    STANDARD.encode(&challenge.png)
}
