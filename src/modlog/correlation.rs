//! Action correlation
//!
//! Triggers an enforcement action and waits, for a bounded time, for the
//! ledger entries that action causes to be posted. Entries may be posted by
//! anyone; they are matched on the decoded subject and action only.

use crate::LEDGER_TARGET;
use crate::modlog::{
    ActionExecutor, CaseAction, CaseCodec, LedgerFeed, LogChannelSource, LoggedCase, ModLogResult,
    Subject,
};
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

/// How long to wait for the ledger to catch up with an action
pub const CORRELATION_WINDOW: Duration = Duration::from_secs(60);

/// What a correlation is waiting for
#[derive(Debug, Clone)]
pub struct CorrelationRequest {
    pub guild_id: u64,
    pub subject_id: u64,
    /// Every kind must be matched once
    pub expected: &'static [CaseAction],
    pub deadline: Instant,
}

/// Outcome of a correlation. Incomplete when the deadline passed first.
#[derive(Debug, Clone)]
pub struct Correlation {
    pub request: CorrelationRequest,
    /// Matched entries in arrival order
    pub legs: Vec<LoggedCase>,
}

impl Correlation {
    /// Whether every expected leg was found
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.request
            .expected
            .iter()
            .all(|action| self.leg(*action).is_some())
    }

    /// The matched leg of a given kind
    #[must_use]
    pub fn leg(&self, action: CaseAction) -> Option<&LoggedCase> {
        self.legs.iter().find(|leg| leg.record.action == action)
    }

    /// The single matched leg, for single-leg actions
    #[must_use]
    pub fn into_single(self) -> Option<LoggedCase> {
        self.legs.into_iter().next()
    }

    fn wants(&self, action: CaseAction) -> bool {
        self.request.expected.contains(&action) && self.leg(action).is_none()
    }
}

/// Matches triggered actions to the ledger entries they produce
pub struct CorrelationEngine {
    executor: Arc<dyn ActionExecutor>,
    channels: Arc<dyn LogChannelSource>,
    feed: LedgerFeed,
    window: Duration,
}

impl CorrelationEngine {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        channels: Arc<dyn LogChannelSource>,
        feed: LedgerFeed,
    ) -> Self {
        Self {
            executor,
            channels,
            feed,
            window: CORRELATION_WINDOW,
        }
    }

    /// Override the wait window
    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Trigger `action` against `subject` and wait for its case entries.
    ///
    /// Softbans wait for a ban leg and an unban leg; every other action waits
    /// for a single entry of its own kind. When the window closes first the
    /// result holds whatever was matched so far.
    ///
    /// # Errors
    /// Returns the executor's error, without waiting, if the action could
    /// not be triggered
    pub async fn await_case(
        &self,
        guild_id: u64,
        subject: &Subject,
        action: CaseAction,
        reason: Option<&str>,
    ) -> ModLogResult<Correlation> {
        let log_channel = self.channels.log_channel(guild_id).await?;
        let mut correlation = Correlation {
            request: CorrelationRequest {
                guild_id,
                subject_id: subject.id,
                expected: action.expected_legs(),
                deadline: Instant::now() + self.window,
            },
            legs: Vec::new(),
        };

        // Subscribe before triggering so no entry can slip past
        let mut observer = self.feed.subscribe();
        self.execute(guild_id, subject, action, reason).await?;

        let Some(log_channel) = log_channel else {
            info!(
                target: LEDGER_TARGET,
                guild_id = %guild_id,
                subject_id = %subject.id,
                action = %action,
                "No log channel configured, nothing to correlate"
            );
            return Ok(correlation);
        };

        info!(
            target: LEDGER_TARGET,
            guild_id = %guild_id,
            subject_id = %subject.id,
            action = %action,
            event = "correlation_started",
            "Waiting for case entries"
        );

        while !correlation.is_complete() {
            let entry = match tokio::time::timeout_at(correlation.request.deadline, observer.next()).await {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    warn!(target: LEDGER_TARGET, guild_id = %guild_id, "Ledger feed closed during correlation");
                    break;
                }
                Err(_) => {
                    warn!(
                        target: LEDGER_TARGET,
                        guild_id = %guild_id,
                        subject_id = %subject.id,
                        action = %action,
                        matched = correlation.legs.len(),
                        expected = correlation.request.expected.len(),
                        event = "correlation_timeout",
                        "Timed out waiting for case entries"
                    );
                    break;
                }
            };

            if entry.channel_id != log_channel {
                continue;
            }
            let Some(record) = CaseCodec::decode(&entry) else {
                continue;
            };
            if record.subject.id != subject.id || !correlation.wants(record.action) {
                continue;
            }

            info!(
                target: LEDGER_TARGET,
                guild_id = %guild_id,
                subject_id = %subject.id,
                case_number = record.case_number,
                action = %record.action,
                event = "correlation_matched",
                "Matched case entry"
            );
            correlation.legs.push(LoggedCase { entry, record });
        }

        Ok(correlation)
    }

    /// Mute `subject` and wait for its case entry
    ///
    /// # Errors
    /// Returns the executor's error if the mute could not be applied
    pub async fn await_mute_case(&self, guild_id: u64, subject: &Subject) -> ModLogResult<Option<LoggedCase>> {
        let correlation = self.await_case(guild_id, subject, CaseAction::Mute, None).await?;
        Ok(correlation.into_single())
    }

    async fn execute(
        &self,
        guild_id: u64,
        subject: &Subject,
        action: CaseAction,
        reason: Option<&str>,
    ) -> ModLogResult<()> {
        let reason = reason.map(ToString::to_string);
        match action {
            CaseAction::Ban => self.executor.ban(guild_id, subject, reason).await,
            CaseAction::Unban => self.executor.unban(guild_id, subject.id).await,
            CaseAction::Softban => self.executor.softban(guild_id, subject, reason).await,
            CaseAction::Mute => self.executor.mute(guild_id, subject).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modlog::executor::MockActionExecutor;
    use crate::modlog::memory::MemoryLedger;
    use crate::modlog::{CaseAuthor, CaseRecord, ModLogError, SettingsStore};

    const GUILD: u64 = 1;
    const LOGS: u64 = 10;
    const BOT: u64 = 99;

    fn subject() -> Subject {
        Subject::new(500, "offender#0001")
    }

    fn case(number: u64, subject: &Subject, action: CaseAction) -> crate::modlog::EntryContent {
        CaseCodec::encode(&CaseRecord::new(
            number,
            subject.clone(),
            CaseAuthor {
                name: "bot#0000".to_string(),
                icon: None,
            },
            action,
            None,
            None,
        ))
    }

    async fn setup(executor: MockActionExecutor, feed: LedgerFeed) -> CorrelationEngine {
        let settings = SettingsStore::new();
        settings.set_log_channel(GUILD, Some(LOGS)).await.unwrap();
        CorrelationEngine::new(Arc::new(executor), Arc::new(settings), feed)
    }

    #[tokio::test]
    async fn test_single_leg_ban() {
        let feed = LedgerFeed::new();
        let ledger = Arc::new(MemoryLedger::new(BOT, feed.clone()));

        let mut executor = MockActionExecutor::new();
        let posting = Arc::clone(&ledger);
        executor
            .expect_ban()
            .withf(|guild, subject, reason| {
                *guild == GUILD && subject.id == 500 && reason.as_deref() == Some("spam")
            })
            .times(1)
            .returning(move |_, subject, _| {
                // Noise: another member, another channel, no embed
                posting.push(BOT, LOGS, Some(case(1, &Subject::new(501, "other"), CaseAction::Ban)));
                posting.push(BOT, 11, Some(case(2, subject, CaseAction::Ban)));
                posting.push(BOT, LOGS, None);
                posting.push(BOT, LOGS, Some(case(3, subject, CaseAction::Ban)));
                Ok(())
            });

        let engine = setup(executor, feed.clone()).await;
        let correlation = engine
            .await_case(GUILD, &subject(), CaseAction::Ban, Some("spam"))
            .await
            .unwrap();

        assert!(correlation.is_complete());
        assert_eq!(correlation.legs.len(), 1);
        assert_eq!(correlation.legs[0].record.case_number, 3);
        assert_eq!(feed.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_entries_from_other_authors_match() {
        let feed = LedgerFeed::new();
        let ledger = Arc::new(MemoryLedger::new(BOT, feed.clone()));

        let mut executor = MockActionExecutor::new();
        let posting = Arc::clone(&ledger);
        executor.expect_unban().returning(move |_, _| {
            posting.push(4242, LOGS, Some(case(7, &subject(), CaseAction::Unban)));
            Ok(())
        });

        let engine = setup(executor, feed).await;
        let correlation = engine
            .await_case(GUILD, &subject(), CaseAction::Unban, None)
            .await
            .unwrap();
        assert_eq!(correlation.into_single().unwrap().entry.author_id, 4242);
    }

    #[tokio::test]
    async fn test_softban_needs_both_legs_in_any_order() {
        let feed = LedgerFeed::new();
        let ledger = Arc::new(MemoryLedger::new(BOT, feed.clone()));

        let mut executor = MockActionExecutor::new();
        let posting = Arc::clone(&ledger);
        executor.expect_softban().times(1).returning(move |_, subject, _| {
            posting.push(BOT, LOGS, Some(case(8, subject, CaseAction::Unban)));
            posting.push(BOT, LOGS, Some(case(9, subject, CaseAction::Unban)));
            posting.push(BOT, LOGS, Some(case(10, subject, CaseAction::Ban)));
            Ok(())
        });

        let engine = setup(executor, feed).await;
        let correlation = engine
            .await_case(GUILD, &subject(), CaseAction::Softban, Some("purge"))
            .await
            .unwrap();

        assert!(correlation.is_complete());
        assert_eq!(correlation.legs.len(), 2);
        assert_eq!(correlation.leg(CaseAction::Unban).unwrap().record.case_number, 8);
        assert_eq!(correlation.leg(CaseAction::Ban).unwrap().record.case_number, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_softban_timeout_returns_partial() {
        let feed = LedgerFeed::new();
        let ledger = Arc::new(MemoryLedger::new(BOT, feed.clone()));

        let mut executor = MockActionExecutor::new();
        let posting = Arc::clone(&ledger);
        executor.expect_softban().returning(move |_, subject, _| {
            posting.push(BOT, LOGS, Some(case(4, subject, CaseAction::Ban)));
            Ok(())
        });

        let engine = setup(executor, feed.clone()).await;
        let started = Instant::now();
        let correlation = engine
            .await_case(GUILD, &subject(), CaseAction::Softban, None)
            .await
            .unwrap();

        assert!(!correlation.is_complete());
        assert_eq!(correlation.legs.len(), 1);
        assert!(correlation.leg(CaseAction::Ban).is_some());
        assert!(started.elapsed() >= CORRELATION_WINDOW);
        assert_eq!(feed.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_with_nothing_logged() {
        let feed = LedgerFeed::new();
        let mut executor = MockActionExecutor::new();
        executor.expect_mute().returning(|_, _| Ok(()));

        let engine = setup(executor, feed.clone()).await;
        let found = engine.await_mute_case(GUILD, &subject()).await.unwrap();
        assert!(found.is_none());
        assert_eq!(feed.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_executor_failure_propagates_without_waiting() {
        let feed = LedgerFeed::new();
        let mut executor = MockActionExecutor::new();
        executor
            .expect_ban()
            .returning(|_, _, _| Err(ModLogError::Executor("Missing permissions".to_string())));

        let engine = setup(executor, feed.clone()).await;
        let started = Instant::now();
        let result = engine.await_case(GUILD, &subject(), CaseAction::Ban, None).await;

        assert!(matches!(result, Err(ModLogError::Executor(_))));
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(feed.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfigured_log_channel_does_not_wait() {
        let feed = LedgerFeed::new();
        let mut executor = MockActionExecutor::new();
        executor.expect_ban().times(1).returning(|_, _, _| Ok(()));

        let engine = CorrelationEngine::new(Arc::new(executor), Arc::new(SettingsStore::new()), feed);
        let started = Instant::now();
        let correlation = engine
            .await_case(GUILD, &subject(), CaseAction::Ban, None)
            .await
            .unwrap();

        assert!(correlation.legs.is_empty());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_window() {
        let feed = LedgerFeed::new();
        let mut executor = MockActionExecutor::new();
        executor.expect_unban().returning(|_, _| Ok(()));

        let engine = setup(executor, feed).await.with_window(Duration::from_secs(5));
        let started = Instant::now();
        let correlation = engine
            .await_case(GUILD, &subject(), CaseAction::Unban, None)
            .await
            .unwrap();

        assert!(correlation.legs.is_empty());
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(5) && waited < CORRELATION_WINDOW);
    }
}
