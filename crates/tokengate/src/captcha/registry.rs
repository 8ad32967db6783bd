//! Outstanding challenges keyed by identity.

use std::collections::HashMap;
use tokio::sync::Mutex;

use tokengate_common::{GateError, UserId};

use super::{CaptchaRenderer, StoredChallenge};

/// A freshly issued challenge
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub png: Vec<u8>,
    pub expires_at: i64,
}

/// Last-challenge-wins registry with a fixed validity window
pub struct ChallengeRegistry {
    renderer: CaptchaRenderer,
    ttl_secs: i64,
    outstanding: Mutex<HashMap<UserId, StoredChallenge>>,
}

impl ChallengeRegistry {
    pub fn new(renderer: CaptchaRenderer, ttl_secs: i64) -> Self {
        Self {
            renderer,
            ttl_secs,
            outstanding: Mutex::new(HashMap::new()),
        }
    }

    /// Create a challenge for `identity`, replacing any previous one
    pub async fn issue(&self, identity: UserId, now: i64) -> Result<IssuedChallenge, GateError> {
        let (answer, png) = {
            let mut rng = rand::rng();
            let answer = CaptchaRenderer::random_code(&mut rng);
            let png = self.renderer.render(&answer, &mut rng)?;
            (answer, png)
        };

        let stored = StoredChallenge {
            answer,
            issued_at: now,
            expires_at: now + self.ttl_secs,
        };
        let expires_at = stored.expires_at;
        let replaced = self.outstanding.lock().await.insert(identity, stored);

        tracing::debug!(
            identity = %identity,
            replaced = replaced.is_some(),
            "Issued CAPTCHA challenge"
        );

        Ok(IssuedChallenge {
            png,
            expires_at,
        })
    }

    /// Exact match against the current, unexpired challenge.
    ///
    /// A mismatch leaves the challenge in place.
    pub async fn verify(&self, identity: UserId, answer: &str, now: i64) -> bool {
        match self.outstanding.lock().await.get(&identity) {
            Some(challenge) => !challenge.is_expired(now) && challenge.answer == answer,
            None => false,
        }
    }

    pub async fn clear(&self, identity: UserId) {
        self.outstanding.lock().await.remove(&identity);
    }

    /// Drop expired challenges. Returns how many were removed.
    pub async fn purge_expired(&self, now: i64) -> usize {
        let mut outstanding = self.outstanding.lock().await;
        let before = outstanding.len();
        outstanding.retain(|_, challenge| !challenge.is_expired(now));
        before - outstanding.len()
    }

    pub async fn len(&self) -> usize {
        self.outstanding.lock().await.len()
    }

    #[cfg(test)]
    pub async fn answer_for(&self, identity: UserId) -> Option<String> {
        self.outstanding
            .lock()
            .await
            .get(&identity)
            .map(|challenge| challenge.answer.clone())
    }
}
