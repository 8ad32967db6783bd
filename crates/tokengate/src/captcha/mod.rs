//! CAPTCHA challenges gating redemption after repeated failures.
//!
//! A challenge is a 4-digit code rendered as a noisy PNG. At most one
//! challenge is outstanding per identity: issuing a new one replaces the
//! previous answer.

mod generator;
mod registry;

pub use generator::CaptchaRenderer;
pub use registry::ChallengeRegistry;

/// Outstanding challenge kept in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChallenge {
    /// The expected answer
    pub answer: String,
    /// Creation timestamp
    pub issued_at: i64,
    /// Expiry timestamp
    pub expires_at: i64,
}

impl StoredChallenge {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}
