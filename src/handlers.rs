use crate::modlog::{
    CaseAction, CaseManager, LoggedCase, ModLogResult, Subject, entry_from_message,
};
use crate::{Data, EVENT_TARGET};
use poise::serenity_prelude::{
    self as serenity, Context, EventHandler, GuildId, GuildMemberUpdateEvent, Member, Message,
    Ready, Timestamp, User,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Logs gateway-reported actions as cases credited to the bot.
///
/// Each gateway event runs on its own task without a subject lock, and a
/// softban delivers its ban and unban events back to back. Cases are logged
/// one at a time so those two never read the same counter value.
pub struct GatewayLogger {
    cases: Arc<CaseManager>,
    logging: Mutex<()>,
}

impl GatewayLogger {
    #[must_use]
    pub fn new(cases: Arc<CaseManager>) -> Self {
        Self {
            cases,
            logging: Mutex::new(()),
        }
    }

    /// Log a case with no reason, credited to the bot
    ///
    /// # Errors
    /// Returns an error if the counter or the ledger cannot be updated
    pub async fn log(
        &self,
        guild_id: u64,
        subject: &Subject,
        action: CaseAction,
    ) -> ModLogResult<Option<LoggedCase>> {
        let _logging = self.logging.lock().await;
        let system = self.cases.system();
        self.cases
            .log_case(guild_id, subject, action, None, system, None)
            .await
    }
}

/// Gateway event handler.
///
/// Publishes new messages in log channels to the ledger feed and logs a case
/// for every ban, unban and new timeout the gateway reports. Cases logged
/// here are credited to the bot until a command claims them.
///
/// Commands update the counter outside [`GatewayLogger`], so a command
/// merging a softban can still race with a gateway case for another member.
pub struct Handler {
    pub data: Data,
    gateway: GatewayLogger,
}

impl Handler {
    #[must_use]
    pub fn new(data: Data) -> Self {
        let gateway = GatewayLogger::new(Arc::clone(&data.cases));
        Self { data, gateway }
    }

    async fn log_gateway_case(&self, guild_id: GuildId, user: &User, action: CaseAction) {
        let subject = Subject::new(user.id.get(), user.tag());
        let result = self.gateway.log(guild_id.get(), &subject, action).await;

        match result {
            Ok(Some(case)) => debug!(
                target: EVENT_TARGET,
                guild_id = %guild_id,
                case_number = case.record.case_number,
                "Logged {action} of {}",
                subject.name
            ),
            Ok(None) => {}
            Err(e) => error!(
                target: EVENT_TARGET,
                guild_id = %guild_id,
                subject_id = %subject.id,
                error = %e,
                "Failed to log {action} case"
            ),
        }
    }
}

/// Whether a member update puts the member in a timeout they were not
/// already in
fn is_new_timeout(old: Option<Timestamp>, new: Option<Timestamp>, now: Timestamp) -> bool {
    match new {
        Some(until) if until.unix_timestamp() > now.unix_timestamp() => old != new,
        _ => false,
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.tag();
        let shard_id = ctx.shard_id;
        info!("Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!("Cache ready! The bot is in {guild_count} guild(s)");
    }

    async fn message(&self, _ctx: Context, new_message: Message) {
        let Some(guild_id) = new_message.guild_id else {
            return;
        };
        if new_message.embeds.is_empty()
            || !self.data.is_log_channel(guild_id, new_message.channel_id.get())
        {
            return;
        }
        self.data.feed.publish(entry_from_message(&new_message));
    }

    async fn guild_ban_addition(&self, _ctx: Context, guild_id: GuildId, banned_user: User) {
        self.log_gateway_case(guild_id, &banned_user, CaseAction::Ban)
            .await;
    }

    async fn guild_ban_removal(&self, _ctx: Context, guild_id: GuildId, unbanned_user: User) {
        self.log_gateway_case(guild_id, &unbanned_user, CaseAction::Unban)
            .await;
    }

    async fn guild_member_update(
        &self,
        _ctx: Context,
        old_if_available: Option<Member>,
        _new: Option<Member>,
        event: GuildMemberUpdateEvent,
    ) {
        let old = old_if_available.and_then(|member| member.communication_disabled_until);
        if is_new_timeout(old, event.communication_disabled_until, Timestamp::now()) {
            self.log_gateway_case(event.guild_id, &event.user, CaseAction::Mute)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modlog::executor::MockPermissionChecker;
    use crate::modlog::memory::MemoryLedger;
    use crate::modlog::{CASE_COUNTER_KEY, CounterStore, Issuer, LedgerFeed, SettingsStore};
    use async_trait::async_trait;

    /// Counter that yields between reading and returning, so concurrent
    /// read-increment-write cycles interleave unless serialized
    struct YieldingCounter(SettingsStore);

    #[async_trait]
    impl CounterStore for YieldingCounter {
        async fn get(&self, guild_id: u64, key: &str) -> ModLogResult<u64> {
            let value = self.0.get(guild_id, key).await;
            tokio::task::yield_now().await;
            value
        }

        async fn set(&self, guild_id: u64, key: &str, value: u64) -> ModLogResult<()> {
            self.0.set(guild_id, key, value).await
        }
    }

    #[tokio::test]
    async fn test_gateway_cases_are_numbered_in_turn() {
        let settings = SettingsStore::new();
        settings.set_log_channel(1, Some(10)).await.unwrap();
        let ledger = Arc::new(MemoryLedger::new(99, LedgerFeed::new()));
        let cases = CaseManager::new(
            ledger.clone(),
            Arc::new(YieldingCounter(settings.clone())),
            Arc::new(settings.clone()),
            Arc::new(MockPermissionChecker::new()),
            Issuer::new(99, "casebot#0000", None),
        );
        let gateway = GatewayLogger::new(Arc::new(cases));
        let subject = Subject::new(500, "offender#0001");

        let (ban, unban) = tokio::join!(
            gateway.log(1, &subject, CaseAction::Ban),
            gateway.log(1, &subject, CaseAction::Unban)
        );
        let ban = ban.unwrap().unwrap();
        let unban = unban.unwrap().unwrap();

        let mut numbers = vec![ban.record.case_number, unban.record.case_number];
        numbers.sort_unstable();
        assert_eq!(numbers, [1, 2]);
        assert_eq!(settings.get(1, CASE_COUNTER_KEY).await.unwrap(), 2);
        assert_eq!(ban.record.issuer.name, "casebot#0000");
        assert!(ban.record.reason.is_none());
        assert_eq!(ledger.entries(10).len(), 2);
    }

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_unix_timestamp(secs).unwrap()
    }

    #[test]
    fn test_handler_implements_event_handler() {
        fn assert_impl<T: EventHandler>() {}
        assert_impl::<Handler>();
    }

    #[test]
    fn test_new_timeout_detection() {
        let now = at(1_700_000_000);
        let later = at(1_700_086_400);

        assert!(is_new_timeout(None, Some(later), now));
        assert!(is_new_timeout(Some(at(1_600_000_000)), Some(later), now));

        // Unchanged, lifted or already expired
        assert!(!is_new_timeout(Some(later), Some(later), now));
        assert!(!is_new_timeout(Some(later), None, now));
        assert!(!is_new_timeout(None, Some(at(1_600_000_000)), now));
        assert!(!is_new_timeout(None, None, now));
    }
}
