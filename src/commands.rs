use crate::modlog::{CaseAction, Issuer, LoggedCase, ModLogError, Subject};
use crate::{Context, Error};
use poise::CreateReply;
use poise::command;
use poise::serenity_prelude::{GuildChannel, User};
use tracing::info;

const BUSY: &str = "That user is currently being moderated by someone else";

/// Display name and avatar of the moderator running a command
fn issuer_of(user: &User) -> Issuer {
    Issuer::new(user.id.get(), user.tag(), user.avatar_url())
}

fn subject_of(user: &User) -> Subject {
    Subject::new(user.id.get(), user.tag())
}

/// Progress and completion wording for an action
fn verbs(action: CaseAction) -> (&'static str, &'static str) {
    match action {
        CaseAction::Ban => ("Banning", "banned"),
        CaseAction::Unban => ("Unbanning", "unbanned"),
        CaseAction::Softban => ("Softbanning", "softbanned"),
        CaseAction::Mute => ("Muting", "muted"),
    }
}

/// Reply once an action went through, depending on whether its case showed up
fn outcome_message(
    action: CaseAction,
    subject: &str,
    case_number: Option<u64>,
    log_configured: bool,
) -> String {
    let (_, done) = verbs(action);
    match case_number {
        Some(number) => format!("Successfully {done} {subject} (case {number})"),
        None if !log_configured => format!("Successfully {done} {subject}. No log channel is set, so no case was logged."),
        None => format!("Successfully {done} {subject}, but the case did not show up in the log channel"),
    }
}

/// Refuse targets no moderator should act on. Returns `false` after replying.
async fn check_target(ctx: Context<'_>, user: &User) -> Result<bool, Error> {
    if user.id == ctx.author().id {
        ctx.say("I don't think you want to do that to yourself.").await?;
        return Ok(false);
    }

    let owner_id = ctx.guild().map(|guild| guild.owner_id);
    if user.bot || owner_id == Some(user.id) {
        ctx.say("You may not use this command on that user.").await?;
        return Ok(false);
    }
    Ok(true)
}

/// Run a single-leg action against a user and claim the resulting case
async fn enforce(
    ctx: Context<'_>,
    user: &User,
    action: CaseAction,
    reason: Option<&str>,
    duration: Option<&str>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let data = ctx.data();
    let Some(_lock) = data.locks.try_lock(guild_id.get(), user.id.get()) else {
        ctx.say(BUSY).await?;
        return Ok(());
    };

    let subject = subject_of(user);
    let (doing, _) = verbs(action);
    let reply = ctx.say(format!("{doing} {}...", subject.name)).await?;

    let correlation = match data
        .correlation
        .await_case(guild_id.get(), &subject, action, reason)
        .await
    {
        Ok(correlation) => correlation,
        Err(e) => {
            reply
                .edit(ctx, CreateReply::default().content(format!("Error while {}: {e}", doing.to_lowercase())))
                .await?;
            return Ok(());
        }
    };

    let issuer = issuer_of(ctx.author());
    let mut case_number = None;
    if let Some(case) = correlation.into_single() {
        case_number = Some(case.record.case_number);
        let claimed = data
            .cases
            .edit_case(guild_id.get(), case, &issuer, reason, duration)
            .await?;
        if claimed.is_none() {
            info!(
                guild_id = %guild_id,
                case_number = ?case_number,
                "Case left to its original author"
            );
        }
    }

    let message = outcome_message(
        action,
        &subject.name,
        case_number,
        data.log_channel(guild_id).is_some(),
    );
    reply.edit(ctx, CreateReply::default().content(message)).await?;
    Ok(())
}

/// Ban a user and log the case under your name
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS",
    default_member_permissions = "BAN_MEMBERS"
)]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "User to ban"] user: User,
    #[description = "Reason for the ban"]
    #[rest]
    reason: String,
) -> Result<(), Error> {
    if !check_target(ctx, &user).await? {
        return Ok(());
    }
    enforce(ctx, &user, CaseAction::Ban, Some(&reason), None).await
}

/// Unban a user and log the case under your name
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS",
    default_member_permissions = "BAN_MEMBERS"
)]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "User to unban"] user: User,
    #[description = "Reason for the unban"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    enforce(ctx, &user, CaseAction::Unban, reason.as_deref(), None).await
}

/// Time a user out and log the case with its length
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS",
    default_member_permissions = "MODERATE_MEMBERS"
)]
pub async fn mute(
    ctx: Context<'_>,
    #[description = "User to mute"] user: User,
    #[description = "Length of the mute, as shown in the case"] duration: String,
    #[description = "Reason for the mute"]
    #[rest]
    reason: String,
) -> Result<(), Error> {
    if !check_target(ctx, &user).await? {
        return Ok(());
    }
    enforce(ctx, &user, CaseAction::Mute, Some(&reason), Some(&duration)).await
}

/// Ban and immediately unban a user to clear their messages
///
/// The ban and unban cases are merged into a single softban case.
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS",
    default_member_permissions = "BAN_MEMBERS"
)]
pub async fn softban(
    ctx: Context<'_>,
    #[description = "User to softban"] user: User,
    #[description = "Reason for the softban"]
    #[rest]
    reason: String,
) -> Result<(), Error> {
    if !check_target(ctx, &user).await? {
        return Ok(());
    }
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let data = ctx.data();
    let Some(_lock) = data.locks.try_lock(guild_id.get(), user.id.get()) else {
        ctx.say(BUSY).await?;
        return Ok(());
    };

    let subject = subject_of(&user);
    let reply = ctx
        .say(format!("Softbanning {}... *(Waiting for unban)*", subject.name))
        .await?;

    let correlation = match data
        .correlation
        .await_case(guild_id.get(), &subject, CaseAction::Softban, Some(&reason))
        .await
    {
        Ok(correlation) => correlation,
        Err(e) => {
            reply
                .edit(ctx, CreateReply::default().content(format!("Error while softbanning: {e}")))
                .await?;
            return Ok(());
        }
    };

    let legs: Option<(LoggedCase, LoggedCase)> = correlation
        .leg(CaseAction::Ban)
        .cloned()
        .zip(correlation.leg(CaseAction::Unban).cloned());
    let Some((ban_case, unban_case)) = legs else {
        let message = if data.log_channel(guild_id).is_some() {
            format!(
                "Failed to softban {}: its ban and unban cases did not both show up in the log channel",
                subject.name
            )
        } else {
            outcome_message(CaseAction::Softban, &subject.name, None, false)
        };
        reply.edit(ctx, CreateReply::default().content(message)).await?;
        return Ok(());
    };

    let issuer = issuer_of(ctx.author());
    let merged = data
        .cases
        .merge_softban(guild_id.get(), ban_case, unban_case, &issuer, &reason)
        .await?;

    let message = match merged {
        Some(case) => outcome_message(
            CaseAction::Softban,
            &subject.name,
            Some(case.record.case_number),
            true,
        ),
        None => format!(
            "Softbanned {}, but its ban and unban cases could not be merged",
            subject.name
        ),
    };
    reply.edit(ctx, CreateReply::default().content(message)).await?;
    Ok(())
}

/// Set the reason of a case
#[command(prefix_command, slash_command, guild_only)]
pub async fn reason(
    ctx: Context<'_>,
    #[description = "Case number"] case: u64,
    #[description = "New reason"]
    #[rest]
    reason: String,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let issuer = issuer_of(ctx.author());
    let edited = ctx
        .data()
        .cases
        .edit_case(guild_id.get(), case, &issuer, Some(&reason), None)
        .await?;

    match edited {
        Some(_) => ctx.say(format!("Set the reason for case {case}")).await?,
        None => {
            ctx.say(format!("Could not find case {case}, or you may not edit it"))
                .await?
        }
    };
    Ok(())
}

/// Renumber every case after the given one so numbers run on without gaps
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    default_member_permissions = "MANAGE_GUILD"
)]
pub async fn fixcases(
    ctx: Context<'_>,
    #[description = "Last case with a correct number"] case: u64,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let data = ctx.data();
    let Some(start) = data.cases.find_case(guild_id.get(), case).await? else {
        ctx.say(format!("Could not find case {case}")).await?;
        return Ok(());
    };

    let reply = ctx.say(format!("Renumbering cases after case {case}...")).await?;
    let message = match data.cases.fix_cases(guild_id.get(), &start.entry).await {
        Ok(true) => format!("Renumbered every case after case {case}"),
        Ok(false) => format!("Case {case} is not in the log channel"),
        Err(ModLogError::ForeignEntry { entry_id }) => format!(
            "Stopped at message {entry_id}, which I did not post. Cases before it were already renumbered."
        ),
        Err(e) => return Err(e.into()),
    };
    reply.edit(ctx, CreateReply::default().content(message)).await?;
    Ok(())
}

/// Set the channel cases are logged to, or turn case logging off
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    default_member_permissions = "MANAGE_GUILD"
)]
pub async fn setlogs(
    ctx: Context<'_>,
    #[description = "Log channel, leave empty to stop logging"] channel: Option<GuildChannel>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let channel_id = channel.as_ref().map(|channel| channel.id.get());
    ctx.data()
        .settings
        .set_log_channel(guild_id.get(), channel_id)
        .await?;

    match channel {
        Some(channel) => ctx.say(format!("Cases will be logged in <#{}>", channel.id)).await?,
        None => ctx.say("Case logging is now off").await?,
    };
    Ok(())
}

/// Every command the bot registers
#[must_use]
pub fn all() -> Vec<poise::Command<crate::Data, Error>> {
    vec![ban(), unban(), softban(), mute(), reason(), fixcases(), setlogs()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use poise::serenity_prelude::Permissions;

    #[test]
    fn test_commands_are_guild_only() {
        for cmd in all() {
            assert!(cmd.guild_only, "{} should be guild only", cmd.name);
            assert!(cmd.create_as_slash_command().is_some());
        }
    }

    #[test]
    fn test_command_names() {
        let names: Vec<String> = all().into_iter().map(|cmd| cmd.name).collect();
        assert_eq!(
            names,
            ["ban", "unban", "softban", "mute", "reason", "fixcases", "setlogs"]
        );
    }

    #[test]
    fn test_command_permissions() {
        assert!(ban().required_permissions.contains(Permissions::BAN_MEMBERS));
        assert!(softban().required_permissions.contains(Permissions::BAN_MEMBERS));
        assert!(mute().required_permissions.contains(Permissions::MODERATE_MEMBERS));
        assert!(fixcases().required_permissions.contains(Permissions::MANAGE_GUILD));
        assert!(setlogs().required_permissions.contains(Permissions::MANAGE_GUILD));
        // Authorization happens per case
        assert!(reason().required_permissions.is_empty());
    }

    #[test]
    fn test_mute_parameters() {
        let cmd = mute();
        let params: Vec<&str> = cmd.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(params, ["user", "duration", "reason"]);
    }

    #[test]
    fn test_outcome_message() {
        assert_eq!(
            outcome_message(CaseAction::Ban, "offender#0001", Some(6), true),
            "Successfully banned offender#0001 (case 6)"
        );
        assert!(
            outcome_message(CaseAction::Mute, "offender#0001", None, false)
                .contains("No log channel is set")
        );
        assert!(
            outcome_message(CaseAction::Softban, "offender#0001", None, true)
                .contains("did not show up")
        );
    }
}
