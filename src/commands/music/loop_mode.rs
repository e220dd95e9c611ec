use super::*;
use crate::commands::music::utils::guild_queue::LoopMode;

/// Set the loop mode: off, track or queue
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "loop",
    category = "Music",
    aliases("repeat")
)]
pub async fn loop_mode(
    ctx: Context<'_>,
    #[description = "off, track or queue"] mode: String,
) -> CommandResult {
    let Some((guild_id, _)) = require_voice(&ctx).await? else {
        return Ok(());
    };

    match ctx.data().orchestrator.set_loop(guild_id, &mode).await {
        Ok(mode) => {
            let text = match mode {
                LoopMode::Off => "🔁 Loop disabled",
                LoopMode::Track => "🔂 Looping current track",
                LoopMode::Queue => "🔁 Looping queue",
            };
            reply_success(&ctx, "Loop Mode Updated", text).await
        }
        Err(err) => {
            ctx.send(music_error(&ctx.data().config.theme, &err)).await?;
            Ok(())
        }
    }
}
