//! Application state and shared resources.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::captcha::{CaptchaRenderer, ChallengeRegistry};
use crate::config::{AppConfig, StorageBackend};
use crate::credentials::{CredentialStore, FileCredentialStore, RedisCredentialStore};
use crate::engine::RedemptionEngine;
use crate::guild_config::GuildConfigStore;
use crate::ledger::SecurityLedger;
use crate::persist::JsonDocument;
use crate::platform::Guild;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Redemption engine (stores, ledger, challenges, guild)
    pub engine: Arc<RedemptionEngine>,

    /// Bearer secret required on redeem and admin routes
    pub api_key: Arc<str>,

    /// Process start, for uptime reporting
    pub started_at: i64,
}

impl AppState {
    /// Open the durable stores and wire the engine to `guild`
    pub async fn new(config: &AppConfig, guild: Arc<dyn Guild>) -> Result<Self> {
        let storage = &config.storage;

        let credentials: Box<dyn CredentialStore> = match storage.backend {
            StorageBackend::File => Box::new(
                FileCredentialStore::open(JsonDocument::new(
                    storage.tokens_path(),
                    storage.persist_retries,
                ))
                .await
                .context("Failed to open credential store")?,
            ),
            StorageBackend::Redis => {
                let store = RedisCredentialStore::connect(&storage.redis_url)
                    .await
                    .context("Failed to connect to Redis")?;
                tracing::info!("✅ Redis connected: {}", storage.redis_url);
                Box::new(store)
            }
        };

        let guild_config = GuildConfigStore::open(JsonDocument::new(
            storage.guild_config_path(),
            storage.persist_retries,
        ))
        .await
        .context("Failed to open guild config")?;

        let challenges = ChallengeRegistry::new(
            CaptchaRenderer::new(&config.captcha),
            config.captcha.ttl_secs,
        );

        let engine = RedemptionEngine::new(
            credentials,
            guild_config,
            SecurityLedger::new(config.security),
            challenges,
            guild,
        );

        let api_key = config
            .api_key
            .as_deref()
            .context("api_key is not configured")?;

        Ok(Self::from_engine(engine, api_key))
    }

    pub fn from_engine(engine: RedemptionEngine, api_key: &str) -> Self {
        Self {
            engine: Arc::new(engine),
            api_key: Arc::from(api_key),
            started_at: chrono::Utc::now().timestamp(),
        }
    }
}
