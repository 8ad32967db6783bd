//! Shared constants for Tokengate components.

/// Default Redis connection URL (only used by the Redis credential backend)
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8890";

/// Default directory holding the credential and guild documents
pub const DEFAULT_DATA_DIR: &str = "data";

/// Credential document file name
pub const TOKENS_FILE: &str = "tokens.json";

/// Guild configuration document file name
pub const GUILD_CONFIG_FILE: &str = "guild.json";

/// Failures at which every further attempt must carry a solved CAPTCHA
pub const CHALLENGE_THRESHOLD: u32 = 5;

/// Failures at which the short timeout starts
pub const THROTTLE_THRESHOLD: u32 = 7;

/// Short timeout in seconds (15 minutes)
pub const THROTTLE_SECS: i64 = 900;

/// Failures at which the long timeout starts
pub const LONG_THROTTLE_THRESHOLD: u32 = 10;

/// Long timeout in seconds (1 hour)
pub const LONG_THROTTLE_SECS: i64 = 3600;

/// Failures at which the identity is hard-locked until an admin reset
pub const HARD_LOCK_THRESHOLD: u32 = 15;

/// CAPTCHA challenge validity in seconds (5 minutes)
pub const CAPTCHA_TTL_SECS: i64 = 300;

/// Number of digits in a CAPTCHA code
pub const CAPTCHA_DIGITS: usize = 4;

/// Random bytes in the secret segment of a token (256 bits)
pub const TOKEN_SECRET_BYTES: usize = 32;

/// Longest token accepted for redemption; issued tokens are far shorter
pub const MAX_TOKEN_LEN: usize = 512;

/// Attempts for an idempotent persistence write before giving up
pub const DEFAULT_PERSIST_RETRIES: u32 = 3;

/// Maintenance sweep interval (seconds)
pub const MAINTENANCE_INTERVAL_SECS: u64 = 60;

/// Redis key prefixes
pub mod redis_keys {
    /// Outstanding token: token:{value} -> identity
    pub const TOKEN_PREFIX: &str = "tokengate:token:";
}

/// HTTP header names
pub mod headers {
    /// Identity performing an administrative request (set by the bot front-end)
    pub const X_ACTOR_ID: &str = "X-Actor-Id";
}
