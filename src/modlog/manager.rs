//! Case manager
//!
//! Logging, lookup, editing, softban merging and renumbering of cases.
//!
//! The case counter is read, incremented and written without any guild-wide
//! lock. Callers serialize per subject through
//! [`LockManager`](super::LockManager), so two commands against different
//! members of the same guild can still race on the counter.

use crate::LEDGER_TARGET;
use crate::modlog::{
    CASE_COUNTER_KEY, CaseAction, CaseCodec, CaseRecord, CounterStore, EntryContent, EntryRef, Issuer,
    LedgerEntry, LedgerStore, LogChannelSource, LoggedCase, ModLogError, ModLogResult,
    PermissionChecker, Subject,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entries searched when looking a case up by number
pub const FIND_WINDOW: u8 = 100;

/// Page size of the renumbering scan
pub const SCAN_PAGE: u8 = 100;

/// A case given either by number or by its ledger entry
#[derive(Debug, Clone)]
pub enum CaseRef {
    Number(u64),
    Entry(LedgerEntry),
}

impl From<u64> for CaseRef {
    fn from(number: u64) -> Self {
        Self::Number(number)
    }
}

impl From<LedgerEntry> for CaseRef {
    fn from(entry: LedgerEntry) -> Self {
        Self::Entry(entry)
    }
}

impl From<LoggedCase> for CaseRef {
    fn from(case: LoggedCase) -> Self {
        Self::Entry(case.entry)
    }
}

/// Orchestrates the case ledger of every guild
pub struct CaseManager {
    ledger: Arc<dyn LedgerStore>,
    counters: Arc<dyn CounterStore>,
    channels: Arc<dyn LogChannelSource>,
    permissions: Arc<dyn PermissionChecker>,
    /// The bot's own identity
    system: Issuer,
}

impl CaseManager {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        counters: Arc<dyn CounterStore>,
        channels: Arc<dyn LogChannelSource>,
        permissions: Arc<dyn PermissionChecker>,
        system: Issuer,
    ) -> Self {
        Self {
            ledger,
            counters,
            channels,
            permissions,
            system,
        }
    }

    /// The identity the bot logs cases under
    #[must_use]
    pub fn system(&self) -> &Issuer {
        &self.system
    }

    /// Post a new case to the guild's log channel.
    ///
    /// Returns `None` if the guild has no log channel configured.
    ///
    /// # Errors
    /// Returns an error if the counter cannot be updated or the entry cannot
    /// be posted
    pub async fn log_case(
        &self,
        guild_id: u64,
        subject: &Subject,
        action: CaseAction,
        reason: Option<&str>,
        issuer: &Issuer,
        duration: Option<&str>,
    ) -> ModLogResult<Option<LoggedCase>> {
        let Some(channel_id) = self.channels.log_channel(guild_id).await? else {
            debug!(guild_id = %guild_id, "No log channel configured, case not logged");
            return Ok(None);
        };

        let case_number = self.counters.get(guild_id, CASE_COUNTER_KEY).await? + 1;
        self.counters.set(guild_id, CASE_COUNTER_KEY, case_number).await?;

        let mut record = CaseRecord::new(
            case_number,
            subject.clone(),
            issuer.author(),
            action,
            reason,
            duration,
        );
        let entry = self.ledger.post(channel_id, CaseCodec::encode(&record)).await?;
        record.entry_ref = Some(entry.entry_ref());

        info!(
            target: LEDGER_TARGET,
            guild_id = %guild_id,
            case_number = case_number,
            subject_id = %subject.id,
            action = %action,
            event = "case_logged",
            "Case logged"
        );
        Ok(Some(LoggedCase { entry, record }))
    }

    /// Look a case up among the most recent entries of the log channel.
    ///
    /// Cases older than the last [`FIND_WINDOW`] entries are not found.
    ///
    /// # Errors
    /// Returns an error if the log channel cannot be read
    pub async fn find_case(&self, guild_id: u64, case_number: u64) -> ModLogResult<Option<LoggedCase>> {
        let Some(channel_id) = self.channels.log_channel(guild_id).await? else {
            return Ok(None);
        };

        let entries = self.ledger.fetch_recent(channel_id, FIND_WINDOW).await?;
        Ok(entries.into_iter().find_map(|entry| {
            CaseCodec::decode(&entry)
                .filter(|record| record.case_number == case_number)
                .map(|record| LoggedCase { entry, record })
        }))
    }

    /// Set the reason and/or length of a case.
    ///
    /// Returns `None` both when the case cannot be found and when `issuer`
    /// may not edit it. A length is only applied to time-bounded actions,
    /// and the timestamp is refreshed only when a length is applied.
    ///
    /// # Errors
    /// Returns an error if the ledger cannot be read or written
    pub async fn edit_case(
        &self,
        guild_id: u64,
        case: impl Into<CaseRef>,
        issuer: &Issuer,
        reason: Option<&str>,
        duration: Option<&str>,
    ) -> ModLogResult<Option<LoggedCase>> {
        let Some((case, content)) = self.resolve(guild_id, case.into()).await? else {
            return Ok(None);
        };
        if !self.may_edit(guild_id, &content, issuer).await {
            debug!(
                guild_id = %guild_id,
                case_number = case.record.case_number,
                issuer_id = %issuer.id,
                "Case edit not permitted"
            );
            return Ok(None);
        }

        let duration = duration.filter(|_| case.record.action.is_time_bounded());
        let mut description = content.description.clone();
        if let Some(duration) = duration {
            description = CaseCodec::set_duration(&description, duration);
        }
        if let Some(reason) = reason {
            description = CaseCodec::set_reason(&description, reason);
        }

        let updated = EntryContent {
            color: content.color,
            author_name: issuer.name.clone(),
            author_icon: issuer.icon.clone(),
            description,
            footer: content.footer.clone(),
            timestamp: if duration.is_some() {
                Utc::now()
            } else {
                content.timestamp
            },
        };

        let edited = self.rewrite(case.entry_ref(), updated).await?;
        info!(
            target: LEDGER_TARGET,
            guild_id = %guild_id,
            case_number = edited.record.case_number,
            issuer_id = %issuer.id,
            event = "case_edited",
            "Case edited"
        );
        Ok(Some(edited))
    }

    /// Merge the ban and unban legs of a softban into a single softban case.
    ///
    /// The ban entry is rewritten in place, the unban entry is deleted and
    /// the case counter goes down by one. Later case numbers are not shifted,
    /// so the unban's number is retired.
    ///
    /// Returns `None` when either case cannot be found or `issuer` may not
    /// edit the ban case.
    ///
    /// # Errors
    /// Returns an error if the ledger or counter cannot be updated
    pub async fn merge_softban(
        &self,
        guild_id: u64,
        ban: impl Into<CaseRef>,
        unban: impl Into<CaseRef>,
        issuer: &Issuer,
        reason: &str,
    ) -> ModLogResult<Option<LoggedCase>> {
        let Some((ban, content)) = self.resolve(guild_id, ban.into()).await? else {
            return Ok(None);
        };
        if !self.may_edit(guild_id, &content, issuer).await {
            return Ok(None);
        }
        let Some((unban, _)) = self.resolve(guild_id, unban.into()).await? else {
            return Ok(None);
        };

        let description = CaseCodec::set_action(&content.description, CaseAction::Softban);
        let updated = EntryContent {
            color: CaseAction::Softban.color(),
            author_name: issuer.name.clone(),
            author_icon: issuer.icon.clone(),
            description: CaseCodec::set_reason(&description, reason),
            footer: content.footer.clone(),
            timestamp: content.timestamp,
        };

        let merged = self.rewrite(ban.entry_ref(), updated).await?;
        self.ledger.delete(unban.entry_ref()).await?;

        let cases = self.counters.get(guild_id, CASE_COUNTER_KEY).await?;
        self.counters
            .set(guild_id, CASE_COUNTER_KEY, cases.saturating_sub(1))
            .await?;

        info!(
            target: LEDGER_TARGET,
            guild_id = %guild_id,
            case_number = merged.record.case_number,
            retired_case = unban.record.case_number,
            issuer_id = %issuer.id,
            event = "softban_merged",
            "Softban cases merged"
        );
        Ok(Some(merged))
    }

    /// Renumber every case after `start` so numbers run on contiguously from
    /// `start`'s own number, then store the last number as the case counter.
    ///
    /// Returns `false` without touching anything if `start` is not a case in
    /// the guild's log channel.
    ///
    /// The pass is not transactional: cases renumbered before a failure keep
    /// their new numbers.
    ///
    /// # Errors
    /// Returns [`ModLogError::ForeignEntry`] on the first scanned entry not
    /// posted by the bot, or an error if the ledger cannot be read or written
    pub async fn fix_cases(&self, guild_id: u64, start: &LedgerEntry) -> ModLogResult<bool> {
        if self.channels.log_channel(guild_id).await? != Some(start.channel_id) {
            return Ok(false);
        }
        let Some(mut current) = start.content.as_ref().and_then(CaseCodec::case_number) else {
            return Ok(false);
        };

        info!(
            target: LEDGER_TARGET,
            guild_id = %guild_id,
            case_number = current,
            event = "renumber_started",
            "Renumbering cases"
        );

        let mut after = start.id;
        let mut renumbered = 0_u64;
        loop {
            let page = self
                .ledger
                .fetch_after(start.channel_id, after, SCAN_PAGE)
                .await?;

            for entry in &page {
                if entry.author_id != self.system.id {
                    warn!(
                        target: LEDGER_TARGET,
                        guild_id = %guild_id,
                        entry_id = %entry.id,
                        renumbered = renumbered,
                        event = "renumber_aborted",
                        "Found a case that cannot be edited"
                    );
                    return Err(ModLogError::ForeignEntry { entry_id: entry.id });
                }

                let Some(content) = &entry.content else {
                    continue;
                };
                let Some(number) = CaseCodec::case_number(content) else {
                    continue;
                };

                current += 1;
                if number != current {
                    let mut updated = content.clone();
                    updated.footer = CaseCodec::footer(current);
                    self.ledger.edit(entry.entry_ref(), updated).await?;
                    renumbered += 1;
                }
            }

            match page.last() {
                Some(last) if page.len() >= usize::from(SCAN_PAGE) => after = last.id,
                _ => break,
            }
        }

        self.counters.set(guild_id, CASE_COUNTER_KEY, current).await?;
        info!(
            target: LEDGER_TARGET,
            guild_id = %guild_id,
            case_number = current,
            renumbered = renumbered,
            event = "renumber_finished",
            "Cases renumbered"
        );
        Ok(true)
    }

    /// Find the case a reference points at, with its decoded content
    async fn resolve(
        &self,
        guild_id: u64,
        case: CaseRef,
    ) -> ModLogResult<Option<(LoggedCase, EntryContent)>> {
        let case = match case {
            CaseRef::Number(number) => self.find_case(guild_id, number).await?,
            CaseRef::Entry(entry) => {
                CaseCodec::decode(&entry).map(|record| LoggedCase { entry, record })
            }
        };
        Ok(case.and_then(|case| {
            let content = case.entry.content.clone()?;
            Some((case, content))
        }))
    }

    /// An issuer may edit a case they are credited with, a case credited to
    /// the bot, or any case if they can manage the guild
    async fn may_edit(&self, guild_id: u64, content: &EntryContent, issuer: &Issuer) -> bool {
        content.author_name == issuer.name
            || content.author_name == self.system.name
            || self.permissions.has_guild_manage(guild_id, issuer.id).await
    }

    async fn rewrite(
        &self,
        entry: EntryRef,
        content: EntryContent,
    ) -> ModLogResult<LoggedCase> {
        let entry = self.ledger.edit(entry, content).await?;
        let record = CaseCodec::decode(&entry).ok_or_else(|| {
            ModLogError::Other(format!("Entry {} no longer decodes as a case", entry.id))
        })?;
        Ok(LoggedCase { entry, record })
    }
}
