use ::serenity::all::ClientBuilder;
use dotenv::dotenv;
use poise::serenity_prelude as serenity;
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use groove::commands::general::{botinfo::*, diagnose::*, invite::*, ownerinfo::*, ping::*};
use groove::commands::music::{
    audio_sources::{QueryResolver, spotify::SpotifyApi, youtube::YoutubeApi},
    loop_mode::*,
    pause::*,
    play::*,
    queue::*,
    remove::*,
    skip::*,
    stop::*,
    utils::{
        audio_acquirer::AudioAcquirer,
        music_manager::{PlaybackOrchestrator, QueueRegistry},
        notifier::SerenityNotifier,
        voice_transport::SongbirdTransport,
        ytdlp_binary::{YtDlpBinary, report_availability},
    },
};
use groove::events::Handler;
use groove::utils::config::BotConfig;
use groove::utils::database::{DataStore, STAT_COMMANDS_EXECUTED};
use groove::{CommandResult, Context, Data, Error, HTTP_CLIENT};

#[poise::command(slash_command, prefix_command, category = "General")]
async fn help(
    ctx: Context<'_>,
    #[description = "Specific command to show help about"]
    #[autocomplete = "poise::builtins::autocomplete_command"]
    command: Option<String>,
) -> CommandResult {
    poise::builtins::help(
        ctx,
        command.as_deref(),
        poise::builtins::HelpConfiguration {
            show_context_menu_commands: true,
            ..Default::default()
        },
    )
    .await
    .map_err(|e| e.into())
}

#[poise::command(prefix_command, hide_in_help)]
async fn register(ctx: Context<'_>) -> Result<(), Error> {
    poise::builtins::register_application_commands_buttons(ctx)
        .await
        .map_err(|e| e.into())
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Error in command '{}': {}", ctx.command().name, error);
            let reply = groove::commands::music::utils::embedded_messages::error_reply(
                &ctx.data().config.theme,
                "Error",
                format!("Something went wrong: {}", error),
            );
            if let Err(e) = ctx.send(reply).await {
                error!("Failed to report command error: {}", e);
            }
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize logging with debug level for our crate
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("groove=debug,warn")),
        )
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_target(true)
        .with_ansi(true)
        .pretty()
        .init();

    dotenv().ok();

    let config = BotConfig::from_env()?;
    let store = Arc::new(DataStore::open(&config.database_path)?);
    info!("Database ready at {}", config.database_path.display());

    let ytdlp = Arc::new(YtDlpBinary::new(
        config.ytdlp_cache_dir.clone(),
        config.ytdlp_download_url.clone(),
    )?);
    report_availability(&ytdlp);

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_VOICE_STATES
        | serenity::GatewayIntents::DIRECT_MESSAGES;

    let commands = vec![
        // Default commands
        register(),
        help(),
        // General commands
        ping(),
        botinfo(),
        diagnose(),
        invite(),
        ownerinfo(),
        // Music commands
        play(),
        pause(),
        resume(),
        skip(),
        stop(),
        disconnect(),
        loop_mode(),
        queue(),
        nowplaying(),
        shuffle(),
        remove(),
    ];

    let manager = Songbird::serenity();
    let token = config.token.clone();
    let handler = Handler::new(Arc::clone(&store), config.prefix.clone());

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands,
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(config.prefix.clone()),
                ..Default::default()
            },
            post_command: |ctx| {
                Box::pin(async move {
                    if let Err(e) = ctx.data().store.update_stat(STAT_COMMANDS_EXECUTED, 1) {
                        error!("Failed to count command: {}", e);
                    }
                })
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup({
            let manager = Arc::clone(&manager);
            move |ctx, _ready, framework| {
                Box::pin(async move {
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                    let acquirer = Arc::new(AudioAcquirer::new(
                        config.acquirer_settings(),
                        Arc::clone(&ytdlp),
                    )?);
                    let orchestrator = PlaybackOrchestrator::start(
                        Arc::new(QueueRegistry::new()),
                        Arc::new(SongbirdTransport::new(manager, HTTP_CLIENT.clone())),
                        acquirer,
                        Arc::new(SerenityNotifier::new(
                            Arc::clone(&ctx.http),
                            config.theme.clone(),
                        )),
                        config.timings,
                    );

                    let youtube = YoutubeApi::new(Arc::clone(&ytdlp));
                    let spotify = config
                        .spotify
                        .clone()
                        .map(|credentials| SpotifyApi::new(HTTP_CLIENT.clone(), credentials));

                    Ok(Data {
                        config,
                        orchestrator,
                        resolver: Arc::new(QueryResolver::new(youtube, spotify)),
                        store,
                        ytdlp,
                        started_at: Instant::now(),
                    })
                })
            }
        });

    let mut client = ClientBuilder::new(token, intents)
        .framework(framework.build())
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            shard_manager.shutdown_all().await;
        }
    });

    client.start().await.map_err(Into::into)
}
