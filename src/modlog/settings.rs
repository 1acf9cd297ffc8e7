//! Guild ledger settings
//!
//! Per-guild log channel and counters, kept in a `DashMap` and optionally
//! persisted to a YAML file.

use crate::modlog::{ModLogError, ModLogResult};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Counter key holding the last used case number
pub const CASE_COUNTER_KEY: &str = "cases";

/// Default location of the persisted settings
pub const SETTINGS_FILE: &str = "data/guilds.yaml";

/// Persisted integer settings keyed by guild
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read a counter, `0` if it was never set
    async fn get(&self, guild_id: u64, key: &str) -> ModLogResult<u64>;

    /// Write a counter
    async fn set(&self, guild_id: u64, key: &str, value: u64) -> ModLogResult<()>;
}

/// Lookup of the channel a guild logs its cases to
#[async_trait]
pub trait LogChannelSource: Send + Sync {
    /// `None` when logging is not configured for the guild
    async fn log_channel(&self, guild_id: u64) -> ModLogResult<Option<u64>>;
}

/// Ledger configuration of one guild
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildLedgerConfig {
    pub guild_id: u64,
    /// Channel cases are logged to
    pub log_channel_id: Option<u64>,
    /// Named counters, the case counter among them
    #[serde(default)]
    pub counters: BTreeMap<String, u64>,
}

impl GuildLedgerConfig {
    pub fn new(guild_id: u64) -> Self {
        Self {
            guild_id,
            ..Default::default()
        }
    }

    /// Last case number handed out
    #[must_use]
    pub fn next_case_number(&self) -> u64 {
        self.counters.get(CASE_COUNTER_KEY).copied().unwrap_or(0)
    }
}

/// Settings store for every guild the bot is in
#[derive(Clone, Default)]
pub struct SettingsStore {
    guilds: Arc<DashMap<u64, GuildLedgerConfig>>,
    /// File the store is persisted to, `None` for memory-only stores
    path: Option<PathBuf>,
    /// Held from snapshot to write so the newest snapshot lands last
    writing: Arc<Mutex<()>>,
}

impl SettingsStore {
    /// Create an empty store that is never written to disk
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store from a YAML file.
    ///
    /// A missing or unreadable file yields an empty store that will be
    /// written to `path` on the first change.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let guilds = DashMap::new();

        if let Ok(file_content) = tokio::fs::read_to_string(&path).await {
            match serde_yaml::from_str::<Vec<GuildLedgerConfig>>(&file_content) {
                Ok(configs) => {
                    for config in configs {
                        guilds.insert(config.guild_id, config);
                    }
                }
                Err(e) => warn!("Ignoring unreadable settings file {}: {e}", path.display()),
            }
        }

        info!("Loaded ledger settings for {} guild(s)", guilds.len());
        Self {
            guilds: Arc::new(guilds),
            path: Some(path),
            writing: Arc::default(),
        }
    }

    /// Write the store to its YAML file, if it has one
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created, the settings
    /// cannot be serialized or the file cannot be written
    pub async fn save(&self) -> ModLogResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _writing = self.writing.lock().await;

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ModLogError::Settings(format!("{}: {e}", dir.display())))?;
        }

        let mut configs: Vec<GuildLedgerConfig> =
            self.guilds.iter().map(|entry| entry.value().clone()).collect();
        configs.sort_by_key(|config| config.guild_id);

        let yaml =
            serde_yaml::to_string(&configs).map_err(|e| ModLogError::Settings(e.to_string()))?;
        tokio::fs::write(path, yaml)
            .await
            .map_err(|e| ModLogError::Settings(format!("{}: {e}", path.display())))
    }

    /// Configuration of a guild
    #[must_use]
    pub fn guild(&self, guild_id: u64) -> Option<GuildLedgerConfig> {
        self.guilds.get(&guild_id).map(|entry| entry.value().clone())
    }

    /// Set or clear the log channel of a guild
    ///
    /// # Errors
    /// Returns an error if the settings cannot be persisted
    pub async fn set_log_channel(&self, guild_id: u64, channel_id: Option<u64>) -> ModLogResult<()> {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| GuildLedgerConfig::new(guild_id))
            .log_channel_id = channel_id;
        self.save().await
    }
}

#[async_trait]
impl CounterStore for SettingsStore {
    async fn get(&self, guild_id: u64, key: &str) -> ModLogResult<u64> {
        Ok(self
            .guilds
            .get(&guild_id)
            .and_then(|config| config.counters.get(key).copied())
            .unwrap_or(0))
    }

    async fn set(&self, guild_id: u64, key: &str, value: u64) -> ModLogResult<()> {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| GuildLedgerConfig::new(guild_id))
            .counters
            .insert(key.to_string(), value);
        self.save().await
    }
}

#[async_trait]
impl LogChannelSource for SettingsStore {
    async fn log_channel(&self, guild_id: u64) -> ModLogResult<Option<u64>> {
        Ok(self
            .guilds
            .get(&guild_id)
            .and_then(|config| config.log_channel_id))
    }
}
