use super::*;
use crate::commands::music::utils::embedded_messages::{music_queue, now_playing, reply, with_loop_mode};
use crate::commands::music::utils::guild_queue::PlaybackPhase;

/// Show the current queue
#[poise::command(slash_command, prefix_command, guild_only, category = "Music", aliases("q"))]
pub async fn queue(ctx: Context<'_>) -> CommandResult {
    let guild_id = guild_id(&ctx)?;
    let data = ctx.data();

    match data.orchestrator.snapshot(guild_id).await {
        Some(snapshot) if snapshot.current.is_some() => {
            ctx.send(reply(music_queue(&data.config.theme, &snapshot)))
                .await?;
            Ok(())
        }
        _ => reply_error(&ctx, "Empty Queue", "There is nothing playing right now.").await,
    }
}

/// Show the song that is playing now
#[poise::command(slash_command, prefix_command, guild_only, category = "Music", aliases("np"))]
pub async fn nowplaying(ctx: Context<'_>) -> CommandResult {
    let guild_id = guild_id(&ctx)?;
    let data = ctx.data();

    let playing = data
        .orchestrator
        .snapshot(guild_id)
        .await
        .filter(|snapshot| snapshot.phase == PlaybackPhase::Playing);

    match playing.and_then(|snapshot| snapshot.current.map(|track| (track, snapshot.loop_mode))) {
        Some((track, loop_mode)) => {
            let embed = with_loop_mode(now_playing(&data.config.theme, &track), loop_mode);
            ctx.send(reply(embed)).await?;
            Ok(())
        }
        None => reply_error(&ctx, "Nothing Playing", "There is nothing playing right now.").await,
    }
}

/// Shuffle the upcoming songs
#[poise::command(slash_command, prefix_command, guild_only, category = "Music")]
pub async fn shuffle(ctx: Context<'_>) -> CommandResult {
    let Some((guild_id, _)) = require_voice(&ctx).await? else {
        return Ok(());
    };

    if ctx.data().orchestrator.shuffle(guild_id).await {
        reply_success(&ctx, "Shuffled", "🔀 Shuffled the queue.").await
    } else {
        reply_error(&ctx, "Error", "There need to be at least two songs in the queue to shuffle.").await
    }
}
