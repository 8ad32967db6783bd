//! Credential store backed by a JSON document on disk.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use tokengate_common::{GateError, UserId};

use super::{CredentialStore, fingerprint, generate_token};
use crate::persist::JsonDocument;

/// Tokens held in memory and mirrored to `tokens.json`.
///
/// The mutex is the single serialization point for every mutation, so the
/// check-then-delete in `redeem` is atomic with respect to other requests.
pub struct FileCredentialStore {
    document: JsonDocument,
    tokens: Mutex<HashMap<String, UserId>>,
}

impl FileCredentialStore {
    /// Load outstanding tokens from `document`
    pub async fn open(document: JsonDocument) -> Result<Self, GateError> {
        let tokens: HashMap<String, UserId> = document.load().await?;
        tracing::info!(
            path = %document.path().display(),
            outstanding = tokens.len(),
            "Credential store loaded"
        );

        Ok(Self {
            document,
            tokens: Mutex::new(tokens),
        })
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn issue(&self, identity: UserId) -> Result<String, GateError> {
        let token = generate_token(identity, chrono::Utc::now().timestamp());

        let mut tokens = self.tokens.lock().await;
        tokens.insert(token.clone(), identity);
        if let Err(e) = self.document.save(&*tokens).await {
            tokens.remove(&token);
            return Err(e);
        }

        tracing::info!(
            identity = %identity,
            token = %fingerprint(&token),
            "Token issued"
        );
        Ok(token)
    }

    async fn redeem(&self, token: &str, claimed: UserId) -> Result<bool, GateError> {
        let mut tokens = self.tokens.lock().await;

        if tokens.get(token) != Some(&claimed) {
            return Ok(false);
        }

        tokens.remove(token);
        if let Err(e) = self.document.save(&*tokens).await {
            // The deletion is not durable, so the token stays redeemable
            tokens.insert(token.to_string(), claimed);
            return Err(e);
        }

        tracing::debug!(identity = %claimed, token = %fingerprint(token), "Token consumed");
        Ok(true)
    }

    async fn restore(&self, token: &str, identity: UserId) -> Result<(), GateError> {
        let mut tokens = self.tokens.lock().await;
        tokens.insert(token.to_string(), identity);
        self.document.save(&*tokens).await
    }

    async fn len(&self) -> Result<u64, GateError> {
        Ok(self.tokens.lock().await.len() as u64)
    }
}
