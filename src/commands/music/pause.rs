use super::*;
use crate::commands::music::utils::guild_queue::PlaybackPhase;

/// Pause the current track
#[poise::command(slash_command, prefix_command, guild_only, category = "Music")]
pub async fn pause(ctx: Context<'_>) -> CommandResult {
    let Some((guild_id, _)) = require_voice(&ctx).await? else {
        return Ok(());
    };
    let orchestrator = &ctx.data().orchestrator;

    if orchestrator.phase(guild_id).await != PlaybackPhase::Playing {
        return reply_error(&ctx, "Nothing Playing", "There is nothing playing right now.").await;
    }

    if orchestrator.pause(guild_id).await {
        reply_success(&ctx, "Paused", "⏸️ Paused the music.").await
    } else {
        reply_error(&ctx, "Error", "Could not pause the music.").await
    }
}

/// Resume a paused track
#[poise::command(slash_command, prefix_command, guild_only, category = "Music")]
pub async fn resume(ctx: Context<'_>) -> CommandResult {
    let Some((guild_id, _)) = require_voice(&ctx).await? else {
        return Ok(());
    };
    let orchestrator = &ctx.data().orchestrator;

    if orchestrator.phase(guild_id).await == PlaybackPhase::Disconnected {
        return reply_error(&ctx, "Nothing Playing", "There is nothing to resume.").await;
    }

    if orchestrator.resume(guild_id).await {
        reply_success(&ctx, "Resumed", "▶️ Resumed the music.").await
    } else {
        reply_error(&ctx, "Error", "Could not resume the music.").await
    }
}
