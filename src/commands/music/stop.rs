use super::*;

/// Stop the music, clear the queue and leave the channel
#[poise::command(slash_command, prefix_command, guild_only, category = "Music")]
pub async fn stop(ctx: Context<'_>) -> CommandResult {
    let Some((guild_id, _)) = require_voice(&ctx).await? else {
        return Ok(());
    };

    if ctx.data().orchestrator.stop(guild_id).await {
        reply_success(&ctx, "Stopped", "⏹️ Stopped the music and cleared the queue.").await
    } else {
        reply_error(&ctx, "Error", "There is no active music session.").await
    }
}

/// Leave the voice channel
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    category = "Music",
    aliases("dc", "leave")
)]
pub async fn disconnect(ctx: Context<'_>) -> CommandResult {
    let Some((guild_id, _)) = require_voice(&ctx).await? else {
        return Ok(());
    };

    if ctx.data().orchestrator.disconnect(guild_id).await {
        reply_success(&ctx, "Disconnected", "👋 Disconnected from the voice channel.").await
    } else {
        reply_error(&ctx, "Error", "I am not connected to a voice channel.").await
    }
}
