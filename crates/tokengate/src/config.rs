//! Configuration management for Tokengate.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use tokengate_common::constants::{
    CAPTCHA_TTL_SECS, CHALLENGE_THRESHOLD, DEFAULT_DATA_DIR, DEFAULT_LISTEN_ADDR,
    DEFAULT_PERSIST_RETRIES, DEFAULT_REDIS_URL, GUILD_CONFIG_FILE, HARD_LOCK_THRESHOLD,
    LONG_THROTTLE_SECS, LONG_THROTTLE_THRESHOLD, MAINTENANCE_INTERVAL_SECS, THROTTLE_SECS,
    THROTTLE_THRESHOLD, TOKENS_FILE,
};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Guild (deployment) this instance manages
    #[serde(default)]
    pub guild_id: u64,

    /// Bot token for the platform REST API (usually from DISCORD_TOKEN)
    #[serde(default)]
    pub discord_token: Option<String>,

    /// Shared secret the bot front-end presents as a bearer token
    #[serde(default)]
    pub api_key: Option<String>,

    /// Maintenance sweep interval in seconds
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,

    /// Durable storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Lockout escalation thresholds
    #[serde(default)]
    pub security: SecurityConfig,

    /// CAPTCHA configuration
    #[serde(default)]
    pub captcha: CaptchaConfig,
}

/// Where credentials live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON document on local disk
    File,
    /// One Redis key per token
    Redis,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Credential backend
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Directory holding tokens.json and guild.json
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Redis connection URL (redis backend only)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Attempts for an idempotent write before surfacing a persistence failure
    #[serde(default = "default_persist_retries")]
    pub persist_retries: u32,
}

impl StorageConfig {
    pub fn tokens_path(&self) -> PathBuf {
        self.data_dir.join(TOKENS_FILE)
    }

    pub fn guild_config_path(&self) -> PathBuf {
        self.data_dir.join(GUILD_CONFIG_FILE)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
            redis_url: default_redis_url(),
            persist_retries: default_persist_retries(),
        }
    }
}

/// Shortest accepted front-end secret
const MIN_API_KEY_LEN: usize = 16;

/// Longest configurable timeout window
const MAX_TIMEOUT_SECS: i64 = 365 * 24 * 3600;

/// Lockout escalation thresholds, evaluated against the cumulative failure count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_challenge_threshold")]
    pub challenge_threshold: u32,

    #[serde(default = "default_throttle_threshold")]
    pub throttle_threshold: u32,

    #[serde(default = "default_throttle_secs")]
    pub throttle_secs: i64,

    #[serde(default = "default_long_throttle_threshold")]
    pub long_throttle_threshold: u32,

    #[serde(default = "default_long_throttle_secs")]
    pub long_throttle_secs: i64,

    #[serde(default = "default_hard_lock_threshold")]
    pub hard_lock_threshold: u32,
}

impl SecurityConfig {
    /// Thresholds must escalate strictly and timeouts stay within a year
    pub fn validate(&self) -> Result<()> {
        if !(self.challenge_threshold >= 1
            && self.challenge_threshold <= self.throttle_threshold
            && self.throttle_threshold < self.long_throttle_threshold
            && self.long_throttle_threshold < self.hard_lock_threshold)
        {
            bail!(
                "security thresholds must satisfy \
                 1 <= challenge <= throttle < long_throttle < hard_lock"
            );
        }
        for secs in [self.throttle_secs, self.long_throttle_secs] {
            if !(1..=MAX_TIMEOUT_SECS).contains(&secs) {
                bail!("throttle durations must be between 1 and {MAX_TIMEOUT_SECS} seconds");
            }
        }
        Ok(())
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            challenge_threshold: default_challenge_threshold(),
            throttle_threshold: default_throttle_threshold(),
            throttle_secs: default_throttle_secs(),
            long_throttle_threshold: default_long_throttle_threshold(),
            long_throttle_secs: default_long_throttle_secs(),
            hard_lock_threshold: default_hard_lock_threshold(),
        }
    }
}

/// CAPTCHA-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    /// Challenge validity in seconds
    #[serde(default = "default_challenge_ttl")]
    pub ttl_secs: i64,

    /// Image width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Image height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Random noise lines drawn over the code
    #[serde(default = "default_noise_lines")]
    pub noise_lines: u32,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_challenge_ttl(),
            width: default_width(),
            height: default_height(),
            noise_lines: default_noise_lines(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_maintenance_interval() -> u64 { MAINTENANCE_INTERVAL_SECS }
fn default_backend() -> StorageBackend { StorageBackend::File }
fn default_data_dir() -> PathBuf { PathBuf::from(DEFAULT_DATA_DIR) }
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_persist_retries() -> u32 { DEFAULT_PERSIST_RETRIES }
fn default_challenge_threshold() -> u32 { CHALLENGE_THRESHOLD }
fn default_throttle_threshold() -> u32 { THROTTLE_THRESHOLD }
fn default_throttle_secs() -> i64 { THROTTLE_SECS }
fn default_long_throttle_threshold() -> u32 { LONG_THROTTLE_THRESHOLD }
fn default_long_throttle_secs() -> i64 { LONG_THROTTLE_SECS }
fn default_hard_lock_threshold() -> u32 { HARD_LOCK_THRESHOLD }
fn default_challenge_ttl() -> i64 { CAPTCHA_TTL_SECS }
fn default_width() -> u32 { 150 }
fn default_height() -> u32 { 60 }
fn default_noise_lines() -> u32 { 10 }

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .add_source(config::Environment::with_prefix("TOKENGATE").separator("__"))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            tracing::warn!("Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(ref redis_url) = args.redis_url {
            config.storage.redis_url = redis_url.clone();
        }
        if let Some(ref data_dir) = args.data_dir {
            config.storage.data_dir = data_dir.clone();
        }
        if let Some(guild_id) = args.guild_id {
            config.guild_id = guild_id;
        }
        if args.discord_token.is_some() {
            config.discord_token = args.discord_token.clone();
        }
        if args.api_key.is_some() {
            config.api_key = args.api_key.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that do not depend on where the values came from
    pub fn validate(&self) -> Result<()> {
        self.security.validate()?;
        if self.guild_id == 0 {
            bail!("guild_id must be set (config file, --guild-id, or GUILD_ID)");
        }
        match self.api_key.as_deref() {
            Some(key) if key.len() >= MIN_API_KEY_LEN => Ok(()),
            Some(_) => bail!("api_key must be at least {MIN_API_KEY_LEN} characters"),
            None => bail!("api_key must be set (config file, --api-key, or TOKENGATE_API_KEY)"),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            guild_id: 0,
            discord_token: None,
            api_key: None,
            maintenance_interval_secs: default_maintenance_interval(),
            storage: StorageConfig::default(),
            security: SecurityConfig::default(),
            captcha: CaptchaConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_escalation_table() {
        let security = SecurityConfig::default();
        assert_eq!(security.challenge_threshold, 5);
        assert_eq!(security.throttle_threshold, 7);
        assert_eq!(security.throttle_secs, 900);
        assert_eq!(security.long_throttle_threshold, 10);
        assert_eq!(security.long_throttle_secs, 3600);
        assert_eq!(security.hard_lock_threshold, 15);
        assert!(security.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_escalating_thresholds() {
        let security = SecurityConfig {
            long_throttle_threshold: 20,
            ..Default::default()
        };
        assert!(security.validate().is_err());
    }

    #[test]
    fn test_requires_guild_and_api_key() {
        let mut config = AppConfig {
            guild_id: 77,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.api_key = Some("short".to_string());
        assert!(config.validate().is_err());

        config.api_key = Some("0123456789abcdef".to_string());
        assert!(config.validate().is_ok());

        config.guild_id = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_challenge_after_throttle() {
        let security = SecurityConfig {
            challenge_threshold: 8,
            ..Default::default()
        };
        assert!(security.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_durations() {
        let huge = SecurityConfig {
            long_throttle_secs: i64::MAX,
            ..Default::default()
        };
        assert!(huge.validate().is_err());

        let zero = SecurityConfig {
            throttle_secs: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                "guild_id = 77\n[storage]\nbackend = \"redis\"\n[captcha]\nttl_secs = 60\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let config: AppConfig = settings.try_deserialize().unwrap();

        assert_eq!(config.guild_id, 77);
        assert_eq!(config.storage.backend, StorageBackend::Redis);
        assert_eq!(config.storage.persist_retries, 3);
        assert_eq!(config.captcha.ttl_secs, 60);
        assert_eq!(config.captcha.width, 150);
        assert_eq!(config.security.hard_lock_threshold, 15);
        assert_eq!(config.storage.tokens_path(), PathBuf::from("data/tokens.json"));
    }
}
