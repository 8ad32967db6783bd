//! Core types shared across Tokengate components.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            pub const fn get(&self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake!(
    /// A platform member (the identity redeeming or administering tokens)
    UserId
);
snowflake!(
    /// A guild role that can be granted on redemption
    RoleId
);
snowflake!(
    /// A text channel receiving audit messages
    ChannelId
);

/// Per-identity failure tracking record.
///
/// Timestamps are Unix epoch seconds. A `timeout_until` in the past means
/// no timeout is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRecord {
    /// Failed redemptions since the last success or reset
    pub failures: u32,

    /// End of the current timeout window
    pub timeout_until: i64,

    /// Sticky lock; only an administrative reset clears it
    pub hard_locked: bool,
}

impl SecurityRecord {
    /// Seconds left in the timeout window, if one is active
    pub fn remaining_timeout(&self, now: i64) -> Option<i64> {
        (now < self.timeout_until).then(|| self.timeout_until - now)
    }
}

/// Ledger state derived from a record's failure count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityState {
    /// No failures
    Clear,
    /// Failures recorded, no timeout yet
    Warned,
    /// Short timeout applied on each failure
    Throttled,
    /// Long timeout applied on each failure
    ThrottledLong,
    /// Terminal until reset
    HardLocked,
}

/// Severity of an audit event sent to the log channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

/// An audit message destined for the configured log channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub severity: AuditSeverity,
    pub message: String,
}

impl AuditEvent {
    pub fn new(severity: AuditSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

/// Durable guild settings document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildConfig {
    /// Roles granted on successful redemption, in insertion order
    #[serde(default)]
    pub staff_roles: Vec<RoleId>,

    /// Audit destination
    #[serde(default)]
    pub log_channel: Option<ChannelId>,
}

// === HTTP wire types ===

/// Redemption request forwarded by the bot front-end
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub identity: UserId,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captcha_answer: Option<String>,
}

/// Redemption result kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedeemStatus {
    Success,
    ChallengeRequired,
    InvalidToken,
    Throttled,
    Locked,
}

/// Redemption result rendered for the requesting user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemResponse {
    pub status: RedeemStatus,

    /// User-facing message
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failures: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<i64>,

    /// Base64-encoded PNG challenge image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captcha_png_base64: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub granted_roles: Vec<RoleId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueTokenRequest {
    pub target: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueTokenResponse {
    pub target: UserId,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffRoleRequest {
    pub role_id: RoleId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogChannelRequest {
    pub channel_id: ChannelId,
}

/// Ledger view returned by the admin inspect endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockoutView {
    pub identity: UserId,
    pub state: SecurityState,
    pub record: SecurityRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<i64>,
}

/// Service statistics snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Tokens issued and not yet redeemed
    pub outstanding_tokens: u64,

    /// Identities with a ledger entry
    pub tracked_identities: u64,

    /// Identities currently hard-locked
    pub hard_locked: u64,

    /// Challenges awaiting an answer
    pub outstanding_challenges: u64,

    /// Roles granted on redemption
    pub staff_roles: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_transparent_serde() {
        let config = GuildConfig {
            staff_roles: vec![RoleId::new(42), RoleId::new(7)],
            log_channel: Some(ChannelId::new(99)),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json, serde_json::json!({"staff_roles": [42, 7], "log_channel": 99}));
    }

    #[test]
    fn test_guild_config_missing_fields_default() {
        let config: GuildConfig = serde_json::from_str("{}").unwrap();
        assert!(config.staff_roles.is_empty());
        assert_eq!(config.log_channel, None);
    }

    #[test]
    fn test_remaining_timeout() {
        let record = SecurityRecord {
            failures: 7,
            timeout_until: 1_000,
            hard_locked: false,
        };
        assert_eq!(record.remaining_timeout(400), Some(600));
        assert_eq!(record.remaining_timeout(1_000), None);
    }

    #[test]
    fn test_user_id_from_str() {
        assert_eq!(" 1234 ".parse::<UserId>().unwrap(), UserId::new(1234));
        assert!("abc".parse::<UserId>().is_err());
    }
}
