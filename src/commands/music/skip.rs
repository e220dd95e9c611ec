use super::*;

/// Skip the currently playing song
#[poise::command(slash_command, prefix_command, guild_only, category = "Music", aliases("s"))]
pub async fn skip(ctx: Context<'_>) -> CommandResult {
    let Some((guild_id, _)) = require_voice(&ctx).await? else {
        return Ok(());
    };

    if ctx.data().orchestrator.skip(guild_id).await {
        reply_success(&ctx, "Skipped", "⏭️ Skipped the current song.").await
    } else {
        reply_error(&ctx, "Nothing Playing", "There is nothing playing to skip.").await
    }
}
