//! Configuration store: roles granted on redemption and the audit channel.

use tokio::sync::RwLock;

use tokengate_common::{ChannelId, GateError, GuildConfig, RoleId};

use crate::persist::JsonDocument;

/// Guild settings, loaded at startup and persisted on every change
pub struct GuildConfigStore {
    document: JsonDocument,
    config: RwLock<GuildConfig>,
}

impl GuildConfigStore {
    pub async fn open(document: JsonDocument) -> Result<Self, GateError> {
        let config: GuildConfig = document.load().await?;
        tracing::info!(
            path = %document.path().display(),
            staff_roles = config.staff_roles.len(),
            log_channel = ?config.log_channel,
            "Guild config loaded"
        );

        Ok(Self {
            document,
            config: RwLock::new(config),
        })
    }

    /// Snapshot of the current settings
    pub async fn get(&self) -> GuildConfig {
        self.config.read().await.clone()
    }

    /// Append a staff role. Returns false if it was already configured.
    pub async fn add_staff_role(&self, role: RoleId) -> Result<bool, GateError> {
        let mut config = self.config.write().await;
        if config.staff_roles.contains(&role) {
            return Ok(false);
        }

        let mut updated = config.clone();
        updated.staff_roles.push(role);
        self.document.save(&updated).await?;
        *config = updated;

        tracing::info!(role = %role, "Staff role added");
        Ok(true)
    }

    /// Replace the audit channel
    pub async fn set_log_channel(&self, channel: ChannelId) -> Result<(), GateError> {
        let mut config = self.config.write().await;

        let mut updated = config.clone();
        updated.log_channel = Some(channel);
        self.document.save(&updated).await?;
        *config = updated;

        tracing::info!(channel = %channel, "Log channel set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_store(dir: &tempfile::TempDir) -> GuildConfigStore {
        GuildConfigStore::open(JsonDocument::new(dir.path().join("guild.json"), 2))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        assert_eq!(store.get().await, GuildConfig::default());
    }

    #[tokio::test]
    async fn test_roles_are_an_ordered_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        assert!(store.add_staff_role(RoleId::new(3)).await.unwrap());
        assert!(store.add_staff_role(RoleId::new(1)).await.unwrap());
        assert!(!store.add_staff_role(RoleId::new(3)).await.unwrap());

        assert_eq!(
            store.get().await.staff_roles,
            vec![RoleId::new(3), RoleId::new(1)]
        );
    }

    #[tokio::test]
    async fn test_changes_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(&dir).await;
            store.add_staff_role(RoleId::new(5)).await.unwrap();
            store.set_log_channel(ChannelId::new(8)).await.unwrap();
            store.set_log_channel(ChannelId::new(9)).await.unwrap();
        }

        let reopened = open_store(&dir).await;
        let config = reopened.get().await;
        assert_eq!(config.staff_roles, vec![RoleId::new(5)]);
        assert_eq!(config.log_channel, Some(ChannelId::new(9)));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let path = dir.path().join("guild.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        assert!(store.add_staff_role(RoleId::new(5)).await.is_err());
        assert!(store.get().await.staff_roles.is_empty());
    }
}
