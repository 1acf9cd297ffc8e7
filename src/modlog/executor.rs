//! Enforcement and permission collaborators
//!
//! The ledger never bans anyone itself. It triggers an [`ActionExecutor`]
//! and then waits for the resulting case to show up in the log channel.

use crate::modlog::{ModLogError, ModLogResult, Subject};
use async_trait::async_trait;
use poise::serenity_prelude::{GuildId, Http, Permissions, RoleId, UserId};
use std::sync::Arc;
use tracing::{info, warn};

/// Days of message history purged by bans and softbans
const PURGE_DAYS: u8 = 7;

/// Timeout applied by a mute. Discord caps timeouts at 28 days.
const MUTE_TIMEOUT_DAYS: i64 = 28;

/// Carries out enforcement actions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn ban(&self, guild_id: u64, subject: &Subject, reason: Option<String>) -> ModLogResult<()>;

    async fn unban(&self, guild_id: u64, subject_id: u64) -> ModLogResult<()>;

    async fn softban(&self, guild_id: u64, subject: &Subject, reason: Option<String>) -> ModLogResult<()>;

    async fn mute(&self, guild_id: u64, subject: &Subject) -> ModLogResult<()>;
}

/// Answers whether a user may manage a guild
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn has_guild_manage(&self, guild_id: u64, user_id: u64) -> bool;
}

/// Executor backed by the Discord HTTP API
#[derive(Clone)]
pub struct DiscordExecutor {
    http: Arc<Http>,
}

impl DiscordExecutor {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    async fn ban_member(&self, guild_id: u64, subject: &Subject, reason: Option<&str>) -> ModLogResult<()> {
        let guild = GuildId::new(guild_id);
        let user = UserId::new(subject.id);
        let result = match reason {
            Some(reason) => guild.ban_with_reason(&*self.http, user, PURGE_DAYS, reason).await,
            None => guild.ban(&*self.http, user, PURGE_DAYS).await,
        };
        result.map_err(|e| ModLogError::Executor(format!("Failed to ban {}: {e}", subject.name)))
    }
}

#[async_trait]
impl ActionExecutor for DiscordExecutor {
    async fn ban(&self, guild_id: u64, subject: &Subject, reason: Option<String>) -> ModLogResult<()> {
        info!("Banning user {} in guild {guild_id}", subject.id);
        self.ban_member(guild_id, subject, reason.as_deref()).await
    }

    async fn unban(&self, guild_id: u64, subject_id: u64) -> ModLogResult<()> {
        info!("Unbanning user {subject_id} in guild {guild_id}");
        GuildId::new(guild_id)
            .unban(&*self.http, UserId::new(subject_id))
            .await
            .map_err(|e| ModLogError::Executor(format!("Failed to unban {subject_id}: {e}")))
    }

    async fn softban(&self, guild_id: u64, subject: &Subject, reason: Option<String>) -> ModLogResult<()> {
        info!("Softbanning user {} in guild {guild_id}", subject.id);
        self.ban_member(guild_id, subject, reason.as_deref()).await?;
        self.unban(guild_id, subject.id).await
    }

    async fn mute(&self, guild_id: u64, subject: &Subject) -> ModLogResult<()> {
        info!("Muting user {} in guild {guild_id}", subject.id);
        let mut member = GuildId::new(guild_id)
            .member(&*self.http, UserId::new(subject.id))
            .await
            .map_err(|e| ModLogError::Executor(format!("Failed to get member {}: {e}", subject.id)))?;

        let timeout_until = chrono::Utc::now() + chrono::Duration::days(MUTE_TIMEOUT_DAYS);
        member
            .disable_communication_until_datetime(&*self.http, timeout_until.into())
            .await
            .map_err(|e| ModLogError::Executor(format!("Failed to mute {}: {e}", subject.name)))
    }
}

/// Permission checker backed by the Discord HTTP API
#[derive(Clone)]
pub struct DiscordPermissions {
    http: Arc<Http>,
}

impl DiscordPermissions {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    async fn can_manage(&self, guild_id: u64, user_id: u64) -> ModLogResult<bool> {
        let guild = GuildId::new(guild_id).to_partial_guild(&*self.http).await?;
        if guild.owner_id.get() == user_id {
            return Ok(true);
        }

        let member = guild.member(&*self.http, UserId::new(user_id)).await?;
        let everyone = RoleId::new(guild_id);
        let permissions = member
            .roles
            .iter()
            .chain(std::iter::once(&everyone))
            .filter_map(|role_id| guild.roles.get(role_id))
            .fold(Permissions::empty(), |acc, role| acc | role.permissions);

        Ok(permissions.administrator() || permissions.manage_guild())
    }
}

#[async_trait]
impl PermissionChecker for DiscordPermissions {
    async fn has_guild_manage(&self, guild_id: u64, user_id: u64) -> bool {
        match self.can_manage(guild_id, user_id).await {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!("Failed to resolve permissions of {user_id} in guild {guild_id}: {e}");
                false
            }
        }
    }
}
