pub mod loop_mode;
pub mod pause;
pub mod play;
pub mod queue;
pub mod remove;
pub mod skip;
pub mod stop;

pub mod audio_sources;
pub mod utils;

use poise::serenity_prelude as serenity;
use serenity::all::{ChannelId, GuildId};

use crate::{CommandResult, Context, Error};
use utils::embedded_messages::{self, music_error};
use utils::music_manager::{MusicError, user_voice_channel};

fn guild_id(ctx: &Context<'_>) -> Result<GuildId, Error> {
    ctx.guild_id().ok_or_else(|| Box::new(MusicError::NotInGuild) as Error)
}

/// Returns the guild and the author's voice channel. Replies with an error
/// and returns `None` when the author is not in voice.
async fn require_voice(ctx: &Context<'_>) -> Result<Option<(GuildId, ChannelId)>, Error> {
    let guild_id = guild_id(ctx)?;
    match user_voice_channel(ctx.serenity_context(), guild_id, ctx.author().id) {
        Ok(channel_id) => Ok(Some((guild_id, channel_id))),
        Err(err) => {
            ctx.send(music_error(&ctx.data().config.theme, &err)).await?;
            Ok(None)
        }
    }
}

async fn reply_success(ctx: &Context<'_>, title: &str, description: &str) -> CommandResult {
    let theme = &ctx.data().config.theme;
    ctx.send(embedded_messages::reply(embedded_messages::success(theme, title, description)))
        .await?;
    Ok(())
}

async fn reply_error(ctx: &Context<'_>, title: &str, description: &str) -> CommandResult {
    let theme = &ctx.data().config.theme;
    ctx.send(embedded_messages::error_reply(theme, title, description))
        .await?;
    Ok(())
}
