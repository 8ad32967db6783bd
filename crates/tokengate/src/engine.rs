//! Redemption engine: the only place the stores, the ledger, the challenge
//! registry, and the guild meet.
//!
//! A redemption runs under the identity's ledger lock and follows a fixed
//! order: ledger check, CAPTCHA gate, credential check, then ledger update
//! and audit. A throttled or locked identity never reaches the credential
//! store.

use std::sync::Arc;

use tokengate_common::{
    AuditEvent, AuditSeverity, ChannelId, GateError, GuildConfig, LockoutView, RoleId,
    StatsSnapshot, UserId,
};

use tokengate_common::constants::MAX_TOKEN_LEN;

use crate::captcha::ChallengeRegistry;
use crate::credentials::{CredentialStore, fingerprint};
use crate::guild_config::GuildConfigStore;
use crate::ledger::{Decision, SecurityLedger};
use crate::platform::Guild;

/// PNG challenge attached to an outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeImage {
    pub png: Vec<u8>,
    pub expires_at: i64,
}

/// Result of one redemption attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Token consumed; `granted` are the roles that still exist in the guild
    Success { granted: Vec<RoleId> },

    /// Timeout window active
    Throttled { retry_after_secs: i64 },

    /// Hard-locked until an administrator resets the identity
    PermanentlyLocked,

    /// Solve the attached challenge and resubmit
    ChallengeRequired { challenge: ChallengeImage },

    /// Token unknown or bound to someone else (indistinguishable to the caller).
    /// Carries the next challenge once the identity is past the threshold.
    InvalidToken {
        failures: u32,
        hard_locked: bool,
        challenge: Option<ChallengeImage>,
    },
}

impl Outcome {
    /// User-facing message
    pub fn message(&self) -> String {
        match self {
            Self::Success { .. } => "🔓 Success.".to_string(),
            Self::Throttled { retry_after_secs } => format!("⏳ Wait {retry_after_secs}s."),
            Self::PermanentlyLocked => "❌ **LOCKED.** Contact Owner.".to_string(),
            Self::ChallengeRequired { .. } => "⚠️ Solve captcha:".to_string(),
            Self::InvalidToken { failures, .. } => format!("❌ Invalid. Fail count: {failures}"),
        }
    }

    /// The error this outcome corresponds to, if it is a rejection
    pub fn rejection(&self) -> Option<GateError> {
        match self {
            Self::Throttled { retry_after_secs } => Some(GateError::RateLimited(*retry_after_secs)),
            Self::PermanentlyLocked => Some(GateError::Locked),
            Self::InvalidToken { .. } => Some(GateError::InvalidCredential),
            Self::Success { .. } | Self::ChallengeRequired { .. } => None,
        }
    }
}

pub struct RedemptionEngine {
    credentials: Box<dyn CredentialStore>,
    guild_config: GuildConfigStore,
    ledger: SecurityLedger,
    challenges: ChallengeRegistry,
    guild: Arc<dyn Guild>,
}

impl RedemptionEngine {
    pub fn new(
        credentials: Box<dyn CredentialStore>,
        guild_config: GuildConfigStore,
        ledger: SecurityLedger,
        challenges: ChallengeRegistry,
        guild: Arc<dyn Guild>,
    ) -> Self {
        Self {
            credentials,
            guild_config,
            ledger,
            challenges,
            guild,
        }
    }

    /// Redeem `token` for `identity` at the current time.
    ///
    /// The attempt runs on its own task: once started it completes even if
    /// the caller is dropped, so a consumed token is always either granted
    /// or restored.
    pub async fn redeem(
        self: &Arc<Self>,
        identity: UserId,
        token: &str,
        answer: Option<&str>,
    ) -> Result<Outcome, GateError> {
        let engine = Arc::clone(self);
        let token = token.to_string();
        let answer = answer.map(str::to_string);

        tokio::spawn(async move {
            let now = chrono::Utc::now().timestamp();
            engine.redeem_at(identity, &token, answer.as_deref(), now).await
        })
        .await
        .map_err(|e| GateError::Internal(format!("redemption task failed: {e}")))?
    }

    pub async fn redeem_at(
        &self,
        identity: UserId,
        token: &str,
        answer: Option<&str>,
        now: i64,
    ) -> Result<Outcome, GateError> {
        let mut guard = self.ledger.lock(identity).await;

        match guard.check(now) {
            Decision::Locked => return Ok(Outcome::PermanentlyLocked),
            Decision::Wait(secs) => {
                return Ok(Outcome::Throttled {
                    retry_after_secs: secs,
                });
            }
            Decision::Allow => {}
        }

        let token = token.trim();
        if token.is_empty() || token.len() > MAX_TOKEN_LEN {
            return Err(GateError::InvalidInput("malformed token".to_string()));
        }

        if guard.requires_challenge() {
            let solved = match answer {
                Some(answer) => self.challenges.verify(identity, answer, now).await,
                None => false,
            };
            if !solved {
                let challenge = self.issue_challenge(identity, now).await?;
                return Ok(Outcome::ChallengeRequired { challenge });
            }
        }

        let config = self.guild_config.get().await;

        if self.credentials.redeem(token, identity).await? {
            let granted = match self.grant_staff_roles(identity, &config).await {
                Ok(granted) => granted,
                Err(e) => {
                    if let Err(restore) = self.credentials.restore(token, identity).await {
                        tracing::error!(
                            identity = %identity,
                            token = %fingerprint(token),
                            error = %restore,
                            "Failed to restore token after role grant failure"
                        );
                    }
                    return Err(e);
                }
            };

            guard.record_success();
            self.challenges.clear(identity).await;
            drop(guard);

            let name = self.display_name(identity).await;
            self.audit(
                &config,
                AuditEvent::new(
                    AuditSeverity::Info,
                    format!("{name} redeemed a staff token ({} roles granted)", granted.len()),
                ),
            )
            .await;

            return Ok(Outcome::Success { granted });
        }

        let record = guard.record_failure(now);
        let challenge = if self.ledger.policy().requires_challenge(&record)
            && !record.hard_locked
            && record.remaining_timeout(now).is_none()
        {
            // The failure is already recorded; a rendering error must not hide it
            self.issue_challenge(identity, now)
                .await
                .inspect_err(|e| tracing::error!(identity = %identity, error = %e, "Challenge rendering failed"))
                .ok()
        } else {
            None
        };
        drop(guard);

        let hard_lock = self.ledger.policy().hard_lock_threshold;
        let severity = if record.hard_locked {
            AuditSeverity::Critical
        } else {
            AuditSeverity::Warning
        };
        let name = self.display_name(identity).await;
        self.audit(
            &config,
            AuditEvent::new(
                severity,
                format!("{name} failed token ({}/{hard_lock})", record.failures),
            ),
        )
        .await;

        Ok(Outcome::InvalidToken {
            failures: record.failures,
            hard_locked: record.hard_locked,
            challenge,
        })
    }

    async fn issue_challenge(&self, identity: UserId, now: i64) -> Result<ChallengeImage, GateError> {
        let issued = self.challenges.issue(identity, now).await?;
        Ok(ChallengeImage {
            png: issued.png,
            expires_at: issued.expires_at,
        })
    }

    /// Grant every configured staff role that still exists in the guild
    async fn grant_staff_roles(
        &self,
        identity: UserId,
        config: &GuildConfig,
    ) -> Result<Vec<RoleId>, GateError> {
        if config.staff_roles.is_empty() {
            return Ok(Vec::new());
        }

        let existing = self.guild.existing_roles().await?;
        let (granted, missing): (Vec<RoleId>, Vec<RoleId>) = config
            .staff_roles
            .iter()
            .partition(|role| existing.contains(role));

        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "Configured staff roles no longer exist");
        }
        if !granted.is_empty() {
            self.guild.grant_roles(identity, &granted).await?;
        }
        Ok(granted)
    }

    async fn display_name(&self, identity: UserId) -> String {
        match self.guild.display_name(identity).await {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!(identity = %identity, error = %e, "Display name lookup failed");
                identity.to_string()
            }
        }
    }

    /// Emit to tracing and, when configured, to the log channel
    async fn audit(&self, config: &GuildConfig, event: AuditEvent) {
        match event.severity {
            AuditSeverity::Critical => tracing::error!(target: "audit", "{}", event.message),
            AuditSeverity::Warning => tracing::warn!(target: "audit", "{}", event.message),
            AuditSeverity::Info => tracing::info!(target: "audit", "{}", event.message),
        }

        let Some(channel) = config.log_channel else {
            return;
        };
        if let Err(e) = self.guild.send_audit(channel, &event).await {
            tracing::warn!(channel = %channel, error = %e, "Audit delivery failed");
        }
    }

    // === Administrative operations ===

    async fn require_elevated(&self, actor: UserId) -> Result<(), GateError> {
        if self.guild.is_administrator(actor).await? {
            Ok(())
        } else {
            Err(GateError::Forbidden("administrator permission required".to_string()))
        }
    }

    async fn require_owner(&self, actor: UserId) -> Result<(), GateError> {
        if self.guild.is_owner(actor).await? {
            Ok(())
        } else {
            Err(GateError::Forbidden("only the guild owner can do this".to_string()))
        }
    }

    /// Mint a token for `target`, to be delivered out-of-band
    pub async fn issue_token(&self, actor: UserId, target: UserId) -> Result<String, GateError> {
        self.require_elevated(actor).await?;
        let token = self.credentials.issue(target).await?;

        let config = self.guild_config.get().await;
        let (actor_name, target_name) = (self.display_name(actor).await, self.display_name(target).await);
        self.audit(
            &config,
            AuditEvent::new(
                AuditSeverity::Info,
                format!("{actor_name} issued a staff token for {target_name}"),
            ),
        )
        .await;

        Ok(token)
    }

    /// Clear `target`'s ledger entry, lifting any timeout or hard-lock
    pub async fn reset(&self, actor: UserId, target: UserId) -> Result<(), GateError> {
        self.require_elevated(actor).await?;
        self.ledger.reset(target).await;

        let config = self.guild_config.get().await;
        let (actor_name, target_name) = (self.display_name(actor).await, self.display_name(target).await);
        self.audit(
            &config,
            AuditEvent::new(
                AuditSeverity::Info,
                format!("{actor_name} reset token failures for {target_name}"),
            ),
        )
        .await;
        Ok(())
    }

    /// Add a staff role. Returns false if it was already configured.
    pub async fn configure_role(&self, actor: UserId, role: RoleId) -> Result<bool, GateError> {
        self.require_owner(actor).await?;
        self.guild_config.add_staff_role(role).await
    }

    pub async fn configure_log_channel(
        &self,
        actor: UserId,
        channel: ChannelId,
    ) -> Result<(), GateError> {
        self.require_owner(actor).await?;
        self.guild_config.set_log_channel(channel).await
    }

    /// Ledger view of `target`
    pub async fn inspect(&self, actor: UserId, target: UserId) -> Result<LockoutView, GateError> {
        self.require_elevated(actor).await?;

        let record = self.ledger.snapshot(target).await;
        let now = chrono::Utc::now().timestamp();
        Ok(LockoutView {
            identity: target,
            state: self.ledger.policy().state(&record),
            record,
            retry_after_secs: record.remaining_timeout(now),
        })
    }

    pub async fn stats(&self, actor: UserId) -> Result<StatsSnapshot, GateError> {
        self.require_elevated(actor).await?;

        let (tracked, hard_locked) = self.ledger.counts().await;
        Ok(StatsSnapshot {
            outstanding_tokens: self.credentials.len().await?,
            tracked_identities: tracked,
            hard_locked,
            outstanding_challenges: self.challenges.len().await as u64,
            staff_roles: self.guild_config.get().await.staff_roles.len() as u64,
        })
    }

    /// Purge expired challenges and idle ledger records
    pub async fn sweep(&self, now: i64) -> (usize, usize) {
        let challenges = self.challenges.purge_expired(now).await;
        let records = self.ledger.prune().await;
        (challenges, records)
    }

    /// Credential backend reachable
    pub async fn ready(&self) -> bool {
        self.credentials.ping().await
    }
}
