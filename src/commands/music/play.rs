use super::*;
use crate::commands::music::audio_sources::TrackResolver;
use crate::commands::music::utils::embedded_messages::{added_to_queue, reply, tracks_added};
use std::sync::Arc;
use tracing::{error, info};

/// Play a song or playlist from YouTube, Spotify or a direct URL
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    category = "Music",
    aliases("p")
)]
pub async fn play(
    ctx: Context<'_>,
    #[description = "Song name or URL"]
    #[rest]
    query: String,
) -> CommandResult {
    info!("Received play command with query: {}", query);
    let Some((guild_id, voice_channel)) = require_voice(&ctx).await? else {
        return Ok(());
    };

    // Resolving and joining can take a while
    ctx.defer().await?;

    let data = ctx.data();
    let theme = &data.config.theme;

    let resolved = match data.resolver.resolve(&query, ctx.author().id).await {
        Ok(resolved) => resolved,
        Err(err) => {
            error!("Failed to resolve '{}': {}", query, err);
            ctx.send(music_error(theme, &err)).await?;
            return Ok(());
        }
    };

    if let Err(err) = data
        .orchestrator
        .create_connection(guild_id, voice_channel, ctx.channel_id())
        .await
    {
        ctx.send(music_error(theme, &err)).await?;
        return Ok(());
    }

    let first = resolved.tracks.first().cloned();
    let outcome = data.orchestrator.enqueue(guild_id, resolved.tracks).await;

    let embed = match (outcome.added, first) {
        (1, Some(track)) => added_to_queue(theme, &track, outcome.position),
        (count, _) => tracks_added(theme, count, resolved.collection.as_deref(), outcome.position),
    };
    ctx.send(reply(embed)).await?;

    if outcome.should_start {
        let orchestrator = Arc::clone(&data.orchestrator);
        tokio::spawn(async move { orchestrator.play(guild_id).await });
    }

    Ok(())
}
