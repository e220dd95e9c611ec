use super::*;

/// Remove a song from the queue by its position
#[poise::command(slash_command, prefix_command, guild_only, category = "Music", aliases("rm"))]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Position in the queue (1 is the next song)"]
    #[min = 1]
    position: usize,
) -> CommandResult {
    let Some((guild_id, _)) = require_voice(&ctx).await? else {
        return Ok(());
    };
    let orchestrator = &ctx.data().orchestrator;

    let removed = match position.checked_sub(1) {
        Some(index) => orchestrator.remove(guild_id, index).await,
        None => None,
    };

    match removed {
        Some(track) => {
            let description = format!(
                "🗑️ Removed [{}]({}) from position #{}",
                track.title, track.source_url, position
            );
            reply_success(&ctx, "Track Removed", &description).await
        }
        None => {
            let length = orchestrator
                .snapshot(guild_id)
                .await
                .map_or(0, |snapshot| snapshot.upcoming.len());
            let description = format!("Invalid position. The queue has {} tracks", length);
            reply_error(&ctx, "Error", &description).await
        }
    }
}
