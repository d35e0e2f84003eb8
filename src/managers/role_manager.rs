use async_trait::async_trait;
use once_cell::sync::OnceCell;
use poise::serenity_prelude::{Cache, ChannelId, EditMember, GuildId, Http, RoleId, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{keys, SharedConfig};
use crate::error::{BotError, Result};
use crate::genius::GeniusAccount;

/// Discord nicknames are capped at 32 characters.
const MAX_NICKNAME_CHARS: usize = 32;

/// What a role sync did for one member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSyncReport {
    pub guild_id: u64,
    pub added: Vec<u64>,
    pub failed: Vec<u64>,
    pub nickname_set: bool,
}

/// Applies the Discord side of a completed verification.
#[async_trait]
pub trait MemberRoleSync: Send + Sync {
    async fn apply_verification(&self, discord_id: u64, account: &GeniusAccount) -> Result<RoleSyncReport>;
}

struct DiscordHandles {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

/// Assigns verification roles and nicknames.
///
/// Created before the gateway connects; the HTTP client and cache are attached
/// once the framework is set up.
pub struct RoleManager {
    config: SharedConfig,
    discord: OnceCell<DiscordHandles>,
}

impl RoleManager {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            config,
            discord: OnceCell::new(),
        }
    }

    /// Attach the Discord client. Later calls are ignored.
    pub fn attach(&self, http: Arc<Http>, cache: Arc<Cache>) {
        if self.discord.set(DiscordHandles { http, cache }).is_err() {
            debug!("Role manager already attached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.discord.get().is_some()
    }

    fn handles(&self) -> Result<&DiscordHandles> {
        self.discord.get().ok_or(BotError::DiscordUnavailable)
    }

    /// Role ids for a member with the given Genius roles: the verified role
    /// first, then one per mapped Genius role that has an id configured.
    pub fn role_ids_for(&self, genius_roles: &[String]) -> Vec<RoleId> {
        let mut ids = Vec::new();
        if let Some(id) = self.config.get_id(keys::VERIFIED_ROLE_ID) {
            ids.push(RoleId::new(id));
        }
        for role in genius_roles {
            let Some((_, key)) = keys::GENIUS_ROLE_KEYS.iter().find(|(name, _)| *name == role.as_str()) else {
                continue;
            };
            match self.config.get_id(key) {
                Some(id) if !ids.contains(&RoleId::new(id)) => ids.push(RoleId::new(id)),
                Some(_) => {}
                None => debug!("No Discord role configured for Genius role '{}'", role),
            }
        }
        ids
    }

    /// Every configured Genius role plus the verified role.
    pub fn configured_role_ids(&self) -> Vec<(&'static str, RoleId)> {
        std::iter::once(keys::VERIFIED_ROLE_ID)
            .chain(keys::GENIUS_ROLE_KEYS.iter().map(|(_, key)| *key))
            .filter_map(|key| self.config.get_id(key).map(|id| (key, RoleId::new(id))))
            .collect()
    }

    /// Guild verifications apply to.
    pub async fn target_guild(&self) -> Result<GuildId> {
        let discord = self.handles()?;

        if let Some(id) = self.config.get_id("DISCORD_GUILD_ID") {
            return Ok(GuildId::new(id));
        }

        if let Some(channel_id) = self.config.get_id(keys::VERIFICATION_CHANNEL_ID) {
            match ChannelId::new(channel_id).to_channel(&discord.http).await {
                Ok(channel) => {
                    if let Some(guild_channel) = channel.guild() {
                        return Ok(guild_channel.guild_id);
                    }
                }
                Err(e) => warn!("Verification channel {} unavailable: {}", channel_id, e),
            }
        }

        let guilds = discord.cache.guilds();
        let configured: Vec<RoleId> = self.configured_role_ids().into_iter().map(|(_, id)| id).collect();
        let holding_role = guilds.iter().copied().find(|guild_id| {
            discord
                .cache
                .guild(*guild_id)
                .map(|guild| configured.iter().any(|role| guild.roles.contains_key(role)))
                .unwrap_or(false)
        });

        holding_role
            .or_else(|| guilds.first().copied())
            .ok_or_else(|| BotError::GuildNotFound {
                id: "no guild available".to_string(),
            })
    }

    /// Add `role_ids` to the member and optionally set a nickname.
    pub async fn assign_roles(
        &self,
        discord_id: u64,
        role_ids: &[RoleId],
        nickname: Option<&str>,
    ) -> Result<RoleSyncReport> {
        let discord = self.handles()?;
        let guild_id = self.target_guild().await?;
        let user_id = UserId::new(discord_id);
        let member = guild_id
            .member(&discord.http, user_id)
            .await
            .map_err(|_| BotError::MemberNotFound {
                user_id: discord_id,
                guild_id: guild_id.get(),
            })?;

        let mut report = RoleSyncReport {
            guild_id: guild_id.get(),
            ..Default::default()
        };

        for role_id in role_ids {
            if member.roles.contains(role_id) {
                report.added.push(role_id.get());
                continue;
            }
            match member.add_role(&discord.http, *role_id).await {
                Ok(()) => {
                    info!("Added role {} to {}", role_id, discord_id);
                    report.added.push(role_id.get());
                }
                Err(e) => {
                    warn!("Failed to add role {} to {}: {}", role_id, discord_id, e);
                    report.failed.push(role_id.get());
                }
            }
        }

        if let Some(name) = nickname {
            let nick = truncate_nickname(name);
            match guild_id
                .edit_member(&discord.http, user_id, EditMember::new().nickname(nick.clone()))
                .await
            {
                Ok(_) => {
                    debug!("Nickname of {} set to '{}'", discord_id, nick);
                    report.nickname_set = true;
                }
                Err(e) => warn!("Could not set nickname for {}: {}", discord_id, e),
            }
        }

        Ok(report)
    }

    /// Strip every verification role from the member and reset the nickname.
    /// Returns how many roles were removed.
    pub async fn remove_genius_roles(&self, discord_id: u64) -> Result<usize> {
        let discord = self.handles()?;
        let guild_id = self.target_guild().await?;
        let user_id = UserId::new(discord_id);
        let member = guild_id
            .member(&discord.http, user_id)
            .await
            .map_err(|_| BotError::MemberNotFound {
                user_id: discord_id,
                guild_id: guild_id.get(),
            })?;

        let mut removed = 0;
        for (key, role_id) in self.configured_role_ids() {
            if !member.roles.contains(&role_id) {
                continue;
            }
            match member.remove_role(&discord.http, role_id).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove {} ({}) from {}: {}", key, role_id, discord_id, e),
            }
        }

        if let Err(e) = guild_id
            .edit_member(&discord.http, user_id, EditMember::new().nickname(""))
            .await
        {
            warn!("Could not reset nickname for {}: {}", discord_id, e);
        }

        info!("Removed {} verification role(s) from {}", removed, discord_id);
        Ok(removed)
    }

    /// Configured role keys whose id does not exist in the target guild.
    pub async fn audit_configured_roles(&self) -> Result<Vec<&'static str>> {
        let discord = self.handles()?;
        let guild_id = self.target_guild().await?;
        let roles = guild_id.roles(&discord.http).await?;

        let missing: Vec<&'static str> = self
            .configured_role_ids()
            .into_iter()
            .filter(|(_, id)| !roles.contains_key(id))
            .map(|(key, _)| key)
            .collect();

        for key in &missing {
            warn!("{} points at a role that does not exist in guild {}", key, guild_id);
        }
        if missing.is_empty() {
            info!("All configured roles exist in guild {}", guild_id);
        }
        Ok(missing)
    }
}

#[async_trait]
impl MemberRoleSync for RoleManager {
    async fn apply_verification(&self, discord_id: u64, account: &GeniusAccount) -> Result<RoleSyncReport> {
        let role_ids = self.role_ids_for(&account.roles);
        let report = self.assign_roles(discord_id, &role_ids, Some(&account.name)).await?;
        info!(
            "Verification roles for {}: {} added, {} failed",
            discord_id,
            report.added.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

pub fn truncate_nickname(name: &str) -> String {
    name.trim().chars().take(MAX_NICKNAME_CHARS).collect()
}

pub type SharedRoleManager = Arc<RoleManager>;

pub fn create_shared_role_manager(config: SharedConfig) -> SharedRoleManager {
    Arc::new(RoleManager::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, DynamicConfig};
    use crate::notify::{EventBus, SignalQueue};

    fn manager() -> RoleManager {
        let config = DynamicConfig::new(
            ConfigStore::open_in_memory().unwrap(),
            Arc::new(EventBus::new()),
            Arc::new(SignalQueue::open_in_memory().unwrap()),
        )
        .unwrap();
        RoleManager::new(Arc::new(config))
    }

    #[test]
    fn test_role_ids_for_verified_and_mapped() {
        let manager = manager();
        manager.config.set(keys::VERIFIED_ROLE_ID, "10").unwrap();
        manager.config.set("ROLE_EDITOR", "20").unwrap();
        manager.config.set("ROLE_STAFF", "bogus").unwrap();

        let ids = manager.role_ids_for(&["Editor".to_string(), "Staff".to_string()]);
        assert_eq!(ids, vec![RoleId::new(10), RoleId::new(20)]);
    }

    #[test]
    fn test_configured_role_ids() {
        let manager = manager();
        manager.config.set("ROLE_CONTRIBUTOR", "30").unwrap();
        assert_eq!(
            manager.configured_role_ids(),
            vec![("ROLE_CONTRIBUTOR", RoleId::new(30))]
        );
    }

    #[test]
    fn test_truncate_nickname() {
        let long = "a".repeat(40);
        assert_eq!(truncate_nickname(&long).chars().count(), 32);
        assert_eq!(truncate_nickname("  Name "), "Name");
    }

    #[tokio::test]
    async fn test_unattached_is_unavailable() {
        let manager = manager();
        assert!(!manager.is_attached());
        assert!(matches!(
            manager.target_guild().await,
            Err(BotError::DiscordUnavailable)
        ));
    }
}
