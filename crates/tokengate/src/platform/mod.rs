//! Chat platform collaborator interface.
//!
//! The engine never talks to the platform SDK directly; everything it needs
//! (names, roles, privileges, audit delivery) goes through [`Guild`].

mod discord;

pub use discord::DiscordGuild;

use async_trait::async_trait;
use std::collections::HashSet;

use tokengate_common::{AuditEvent, ChannelId, GateError, RoleId, UserId};

/// One guild (deployment) on the chat platform
#[async_trait]
pub trait Guild: Send + Sync {
    /// Display name for audit messages
    async fn display_name(&self, user: UserId) -> Result<String, GateError>;

    /// Roles that currently exist in the guild
    async fn existing_roles(&self) -> Result<HashSet<RoleId>, GateError>;

    /// Add `roles` to `user`
    async fn grant_roles(&self, user: UserId, roles: &[RoleId]) -> Result<(), GateError>;

    /// Guild owner check
    async fn is_owner(&self, user: UserId) -> Result<bool, GateError>;

    /// Administrator permission check (the owner always qualifies)
    async fn is_administrator(&self, user: UserId) -> Result<bool, GateError>;

    /// Post an audit event to `channel`
    async fn send_audit(&self, channel: ChannelId, event: &AuditEvent) -> Result<(), GateError>;
}
