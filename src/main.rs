use std::{env, sync::Arc};

use case_ledger::modlog::{Issuer, SETTINGS_FILE, SettingsStore};
use case_ledger::{Data, Error, commands, handlers, logging};
use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tracing::{error, info};

/// Prefix for text commands
const PREFIX: &str = "-";

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    logging::init()?;

    let token = env::var("DISCORD_TOKEN").map_err(|_| "DISCORD_TOKEN must be set")?;

    // The bot's own identity is needed before the gateway connects, since
    // cases it logs are credited to it
    let http = Arc::new(serenity::Http::new(&token));
    let me = http.get_current_user().await?;
    let system = Issuer::new(me.id.get(), me.tag(), me.avatar_url());
    info!("Logging cases as {}", system.name);

    let settings = Arc::new(SettingsStore::load(SETTINGS_FILE).await);
    let data = Data::new(http, settings, system);

    let framework_data = data.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(PREFIX.to_string()),
                ..Default::default()
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    logging::log_command_error(&error);
                    if let Err(e) = poise::builtins::on_error(error).await {
                        error!("Failed to report command error: {e}");
                    }
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console("Registering commands");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(framework_data)
            })
        })
        .build();

    // Ban events come with GUILD_MODERATION, timeouts with GUILD_MEMBERS
    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(handlers::Handler::new(data))
        .framework(framework)
        .await?;

    info!("Starting bot...");
    client.start().await?;
    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error building the runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
