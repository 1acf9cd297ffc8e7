use std::{ops::Deref, sync::Arc};

use crate::modlog::{
    CaseManager, CorrelationEngine, DiscordExecutor, DiscordLedger, DiscordPermissions, Issuer,
    LedgerFeed, LockManager, ModLogResult, SettingsStore,
};
use poise::serenity_prelude as serenity;

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("system", &self.system)
            .field("observers", &self.feed.observer_count())
            .finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    /// Wire the case ledger to the Discord HTTP API
    #[must_use]
    pub fn new(http: Arc<serenity::Http>, settings: Arc<SettingsStore>, system: Issuer) -> Self {
        let feed = LedgerFeed::new();
        let cases = CaseManager::new(
            Arc::new(DiscordLedger::new(Arc::clone(&http))),
            settings.clone(),
            settings.clone(),
            Arc::new(DiscordPermissions::new(Arc::clone(&http))),
            system.clone(),
        );
        let correlation = CorrelationEngine::new(
            Arc::new(DiscordExecutor::new(http)),
            settings.clone(),
            feed.clone(),
        );

        Self(Arc::new(DataInner {
            settings,
            locks: LockManager::new(),
            feed,
            cases: Arc::new(cases),
            correlation: Arc::new(correlation),
            system,
        }))
    }

    /// Log channel of a guild, if one is configured
    #[must_use]
    pub fn log_channel(&self, guild_id: serenity::GuildId) -> Option<u64> {
        self.settings
            .guild(guild_id.get())
            .and_then(|config| config.log_channel_id)
    }

    /// Whether a channel is the configured log channel of a guild
    #[must_use]
    pub fn is_log_channel(&self, guild_id: serenity::GuildId, channel_id: u64) -> bool {
        self.log_channel(guild_id) == Some(channel_id)
    }

    /// Save the guild settings to disk
    /// # Errors
    /// Returns an error if the settings cannot be written
    pub async fn save(&self) -> ModLogResult<()> {
        self.settings.save().await
    }
}

/// Main centralized data structure for the bot
pub struct DataInner {
    /// Per-guild log channels and case counters
    pub settings: Arc<SettingsStore>,
    /// One moderation at a time per member
    pub locks: LockManager,
    /// Newly created messages in log channels, published by the gateway handler
    pub feed: LedgerFeed,
    pub cases: Arc<CaseManager>,
    pub correlation: Arc<CorrelationEngine>,
    /// The bot's own identity
    pub system: Issuer,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_data() -> Data {
        Data::new(
            Arc::new(serenity::Http::new("")),
            Arc::new(SettingsStore::new()),
            Issuer::new(99, "casebot#0000", None),
        )
    }

    #[test]
    fn test_data_creation() {
        let data = test_data();
        assert_eq!(data.system.id, 99);
        assert_eq!(data.cases.system().name, "casebot#0000");
        assert!(data.log_channel(serenity::GuildId::new(1)).is_none());
    }

    #[tokio::test]
    async fn test_log_channel_lookup() {
        let data = test_data();
        data.settings.set_log_channel(1, Some(10)).await.unwrap();
        assert_eq!(data.log_channel(serenity::GuildId::new(1)), Some(10));
        assert!(data.log_channel(serenity::GuildId::new(2)).is_none());
    }

    #[tokio::test]
    async fn test_only_configured_channel_is_log_channel() {
        let data = test_data();
        let guild = serenity::GuildId::new(1);
        assert!(!data.is_log_channel(guild, 10));

        data.settings.set_log_channel(1, Some(10)).await.unwrap();
        assert!(data.is_log_channel(guild, 10));
        assert!(!data.is_log_channel(guild, 11));
        assert!(!data.is_log_channel(serenity::GuildId::new(2), 10));
    }

    #[test]
    fn test_clones_share_state() {
        let data = test_data();
        let other = data.clone();
        assert!(data.locks.acquire(1, 500));
        assert!(other.locks.is_locked(1, 500));

        let _observer = other.feed.subscribe();
        assert_eq!(data.feed.observer_count(), 1);
    }

    #[test]
    fn test_debug_format() {
        let data = test_data();
        let debug = format!("{data:?}");
        assert!(debug.contains("casebot#0000"));
        assert!(debug.contains("observers"));
    }
}
