use crate::{COMMAND_TARGET, CONSOLE_TARGET, Context, Data, ERROR_TARGET, Error, LEDGER_TARGET};
use poise::FrameworkError;
use poise::serenity_prelude::GuildId;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// Command log file name
pub const COMMAND_LOG_FILE: &str = "commands";
/// Case ledger audit log file name
pub const LEDGER_LOG_FILE: &str = "ledger";

/// Default filter when `RUST_LOG` is unset. Serenity heartbeats are noisy.
const DEFAULT_FILTER: &str = "info,serenity=error";

/// Initialize the logging system with console and file outputs
pub fn init() -> Result<(), Error> {
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    let command_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, COMMAND_LOG_FILE);
    let ledger_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, LEDGER_LOG_FILE);

    // Human-readable console output
    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    // Everything, as JSON
    let command_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(command_file);

    // Case ledger events only, as JSON
    let ledger_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(ledger_file)
        .with_filter(filter_fn(|metadata| metadata.target() == LEDGER_TARGET));

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(command_layer)
        .with(ledger_layer)
        .try_init()?;

    info!("Logging system initialized");
    Ok(())
}

// Store command start time in the context data
thread_local! {
    static COMMAND_START_TIME: std::cell::RefCell<Option<Instant>> = const { std::cell::RefCell::new(None) };
}

fn guild_label(guild_id: Option<GuildId>) -> String {
    guild_id.map_or_else(|| "DM".to_string(), |id| id.get().to_string())
}

/// Log the start of a command execution (pre-command hook)
pub fn log_command_start(ctx: Context<'_>) {
    COMMAND_START_TIME.with(|cell| {
        *cell.borrow_mut() = Some(Instant::now());
    });

    let args = if ctx.command().parameters.is_empty() {
        String::new()
    } else {
        format!("{:?}", ctx.invocation_string())
    };

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx.guild_id()),
        user_id = %ctx.author().id,
        arguments = %args,
        event = "start",
        "Command execution started"
    );
}

/// Log the end of a command execution (post-command hook)
pub fn log_command_end(ctx: Context<'_>) {
    let duration =
        COMMAND_START_TIME.with(|cell| cell.borrow_mut().take().map(|start| start.elapsed()));
    let duration_ms = u64::try_from(duration.map_or(0, |d| d.as_millis())).unwrap_or_default();

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx.guild_id()),
        user_id = %ctx.author().id,
        duration_ms = duration_ms,
        event = "end",
        "Command execution completed"
    );
}

/// Log errors that occur during command execution
pub fn log_command_error(error: &FrameworkError<'_, Data, Error>) {
    match error {
        FrameworkError::Command { error, ctx, .. } => {
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(ctx.guild_id()),
                user_id = %ctx.author().id,
                error = %error,
                "Command error"
            );
        }
        FrameworkError::CommandCheckFailed { error, ctx, .. } => {
            let error_msg = error
                .as_ref()
                .map_or_else(|| "Check failed".to_string(), ToString::to_string);

            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(ctx.guild_id()),
                user_id = %ctx.author().id,
                error = %error_msg,
                "Command check failed"
            );
        }
        FrameworkError::MissingUserPermissions {
            missing_permissions,
            ctx,
            ..
        } => {
            info!(
                target: COMMAND_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(ctx.guild_id()),
                user_id = %ctx.author().id,
                missing = ?missing_permissions,
                "Command refused, missing permissions"
            );
        }
        err => {
            error!(
                target: ERROR_TARGET,
                error = ?err,
                "Other framework error"
            );
        }
    }
}

pub fn log_console(message: &str) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guild_label() {
        assert_eq!(guild_label(None), "DM");
        assert_eq!(guild_label(Some(GuildId::new(1234))), "1234");
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
