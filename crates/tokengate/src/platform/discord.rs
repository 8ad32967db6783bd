//! Discord adapter over the serenity REST client.

use async_trait::async_trait;
use serenity::all::{CreateEmbed, CreateMessage, EditMember, GuildId, PartialGuild};
use serenity::http::Http;
use std::collections::HashSet;
use std::sync::Arc;

use tokengate_common::{AuditEvent, AuditSeverity, ChannelId, GateError, RoleId, UserId};

/// Embed colours per severity
const COLOR_INFO: u32 = 0x2ecc71;
const COLOR_WARNING: u32 = 0xe67e22;
const COLOR_CRITICAL: u32 = 0xe74c3c;

pub struct DiscordGuild {
    http: Arc<Http>,
    guild_id: GuildId,
}

impl DiscordGuild {
    pub fn new(token: &str, guild_id: u64) -> Result<Self, GateError> {
        if guild_id == 0 {
            return Err(GateError::Config("guild_id must be non-zero".to_string()));
        }

        Ok(Self {
            http: Arc::new(Http::new(token)),
            guild_id: GuildId::new(guild_id),
        })
    }

    async fn guild(&self) -> Result<PartialGuild, GateError> {
        self.http
            .get_guild(self.guild_id)
            .await
            .map_err(platform_error)
    }
}

fn platform_error(e: serenity::Error) -> GateError {
    GateError::Platform(e.to_string())
}

/// Discord snowflakes are never zero; serenity panics on zero ids
fn user_id(user: UserId) -> Result<serenity::all::UserId, GateError> {
    (user.get() != 0)
        .then(|| serenity::all::UserId::new(user.get()))
        .ok_or_else(|| GateError::InvalidInput("user id must be non-zero".to_string()))
}

/// Member's current roles plus `grant`, or `None` when nothing is new
fn merge_roles(
    current: &[serenity::all::RoleId],
    grant: &[RoleId],
) -> Option<Vec<serenity::all::RoleId>> {
    let mut merged = current.to_vec();
    for role in grant.iter().filter(|r| r.get() != 0) {
        let role = serenity::all::RoleId::new(role.get());
        if !merged.contains(&role) {
            merged.push(role);
        }
    }
    (merged.len() > current.len()).then_some(merged)
}

#[async_trait]
impl super::Guild for DiscordGuild {
    async fn display_name(&self, user: UserId) -> Result<String, GateError> {
        let member = self
            .http
            .get_member(self.guild_id, user_id(user)?)
            .await
            .map_err(platform_error)?;
        Ok(member.display_name().to_string())
    }

    async fn existing_roles(&self) -> Result<HashSet<RoleId>, GateError> {
        let roles = self
            .http
            .get_guild_roles(self.guild_id)
            .await
            .map_err(platform_error)?;
        Ok(roles.iter().map(|role| RoleId::new(role.id.get())).collect())
    }

    /// One member edit carrying the full role list, so Discord applies all
    /// of the new roles or none of them
    async fn grant_roles(&self, user: UserId, roles: &[RoleId]) -> Result<(), GateError> {
        let member_id = user_id(user)?;
        let member = self
            .http
            .get_member(self.guild_id, member_id)
            .await
            .map_err(platform_error)?;

        let Some(merged) = merge_roles(&member.roles, roles) else {
            return Ok(());
        };

        self.guild_id
            .edit_member(
                &self.http,
                member_id,
                EditMember::new()
                    .roles(merged)
                    .audit_log_reason("Staff token redeemed"),
            )
            .await
            .map_err(platform_error)?;
        Ok(())
    }

    async fn is_owner(&self, user: UserId) -> Result<bool, GateError> {
        Ok(self.guild().await?.owner_id.get() == user.get())
    }

    async fn is_administrator(&self, user: UserId) -> Result<bool, GateError> {
        let guild = self.guild().await?;
        if guild.owner_id.get() == user.get() {
            return Ok(true);
        }

        let member = self
            .http
            .get_member(self.guild_id, user_id(user)?)
            .await
            .map_err(platform_error)?;

        Ok(member.roles.iter().any(|id| {
            guild
                .roles
                .get(id)
                .is_some_and(|role| role.permissions.administrator())
        }))
    }

    async fn send_audit(&self, channel: ChannelId, event: &AuditEvent) -> Result<(), GateError> {
        if channel.get() == 0 {
            return Err(GateError::InvalidInput("channel id must be non-zero".to_string()));
        }

        let color = match event.severity {
            AuditSeverity::Info => COLOR_INFO,
            AuditSeverity::Warning => COLOR_WARNING,
            AuditSeverity::Critical => COLOR_CRITICAL,
        };
        let embed = CreateEmbed::new()
            .title("🛡️ Security")
            .description(&event.message)
            .color(color);

        serenity::all::ChannelId::new(channel.get())
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await
            .map_err(platform_error)?;
        Ok(())
    }
}
