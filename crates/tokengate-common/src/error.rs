//! Common error types for Tokengate components.

use thiserror::Error;

/// Errors surfaced by the stores, the engine, and the platform adapter.
///
/// Expected redemption results (throttled, locked, challenge, invalid token)
/// are not errors; they are reported through the engine's `Outcome`.
#[derive(Debug, Error)]
pub enum GateError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Durable write or read failed; the state change did not take effect
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Redis connection/operation error
    #[error("Redis error: {0}")]
    Redis(String),

    /// Chat platform request failed
    #[error("Platform error: {0}")]
    Platform(String),

    /// Request did not carry the front-end credential
    #[error("Unauthorized")]
    Unauthorized,

    /// Caller lacks the privilege required for an administrative operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request arrived during an active timeout window
    #[error("Rate limited: retry in {0}s")]
    RateLimited(i64),

    /// Identity is hard-locked
    #[error("Locked")]
    Locked,

    /// Token absent or bound to another identity
    #[error("Invalid credential")]
    InvalidCredential,

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// CAPTCHA rendering error
    #[error("CAPTCHA error: {0}")]
    Captcha(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::Persistence(_) => 503,
            Self::Redis(_) => 503,
            Self::Platform(_) => 502,
            Self::Unauthorized => 401,
            Self::Forbidden(_) => 403,
            Self::RateLimited(_) => 429,
            Self::Locked => 403,
            Self::InvalidCredential => 401,
            Self::InvalidInput(_) => 400,
            Self::Captcha(_) => 500,
            Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Redis(_))
    }

    /// Message safe to show to the requesting user.
    ///
    /// Infrastructure failures never leak their detail.
    pub fn public_message(&self) -> String {
        match self {
            Self::Persistence(_) | Self::Redis(_) | Self::Internal(_) | Self::Config(_) => {
                "Storage is unavailable, nothing was changed. Try again later.".to_string()
            }
            Self::Platform(_) => "The chat platform did not respond. Try again later.".to_string(),
            Self::Captcha(_) => "Could not create a challenge. Try again later.".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(GateError::RateLimited(30).status_code(), 429);
        assert_eq!(GateError::Locked.status_code(), 403);
        assert_eq!(GateError::InvalidCredential.status_code(), 401);
        assert_eq!(GateError::Unauthorized.status_code(), 401);
        assert_eq!(GateError::Persistence("disk full".into()).status_code(), 503);
    }

    #[test]
    fn test_public_message_hides_storage_detail() {
        let err = GateError::Persistence("/var/lib/tokengate/tokens.json: EROFS".into());
        assert!(!err.public_message().contains("EROFS"));
        assert!(err.is_retryable());
        assert!(!GateError::Locked.is_retryable());
    }
}
