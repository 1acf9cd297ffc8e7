//! Error types for the case ledger
//!
//! Absent results (unknown case, unauthorized edit, unconfigured log channel)
//! are reported as `Ok(None)` by the callers of these types, never as errors.

use thiserror::Error;

/// Errors that can occur while maintaining the case ledger
#[derive(Debug, Error)]
pub enum ModLogError {
    /// Discord API error
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<poise::serenity_prelude::Error>),

    /// The enforcement action itself could not be carried out
    #[error("Enforcement action failed: {0}")]
    Executor(String),

    /// A renumbering pass ran into an entry the bot did not author
    #[error("Operation failed: entry {entry_id} cannot be edited")]
    ForeignEntry { entry_id: u64 },

    /// Guild settings could not be read or persisted
    #[error("Settings error: {0}")]
    Settings(String),

    /// Generic error
    #[error("Case ledger error: {0}")]
    Other(String),
}

impl From<poise::serenity_prelude::Error> for ModLogError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::DiscordApi(Box::new(error))
    }
}

impl From<String> for ModLogError {
    fn from(message: String) -> Self {
        Self::Other(message)
    }
}

/// Result type for case ledger operations
pub type ModLogResult<T> = Result<T, ModLogError>;
