//! Moderation case ledger
//!
//! Cases live as embeds in a per-guild log channel. This module numbers,
//! posts, finds, edits, merges and renumbers them, and matches enforcement
//! actions to the entries they produce.

pub mod action;
pub mod codec;
pub mod correlation;
pub mod error;
pub mod executor;
pub mod feed;
pub mod ledger;
pub mod lock;
pub mod manager;
pub mod record;
pub mod settings;

#[cfg(test)]
pub(crate) mod memory;

pub use action::{CaseAction, UnknownAction};
pub use codec::CaseCodec;
pub use correlation::{CORRELATION_WINDOW, Correlation, CorrelationEngine, CorrelationRequest};
pub use error::{ModLogError, ModLogResult};
pub use executor::{ActionExecutor, DiscordExecutor, DiscordPermissions, PermissionChecker};
pub use feed::{LedgerFeed, LedgerObserver};
pub use ledger::{DiscordLedger, EntryContent, EntryRef, LedgerEntry, LedgerStore, entry_from_message};
pub use lock::{LockGuard, LockManager};
pub use manager::{CaseManager, CaseRef, FIND_WINDOW, SCAN_PAGE};
pub use record::{CaseAuthor, CaseRecord, Issuer, LoggedCase, REASON_PLACEHOLDER, Subject};
pub use settings::{
    CASE_COUNTER_KEY, CounterStore, GuildLedgerConfig, LogChannelSource, SETTINGS_FILE, SettingsStore,
};
