use poise::{CreateReply, serenity_prelude as serenity};
use serenity::all::{Permissions, UserId};

use crate::{CommandResult, Context};

/// Permissions the bot needs to chat and play music.
pub fn required_permissions() -> Permissions {
    Permissions::VIEW_CHANNEL
        | Permissions::SEND_MESSAGES
        | Permissions::EMBED_LINKS
        | Permissions::ATTACH_FILES
        | Permissions::READ_MESSAGE_HISTORY
        | Permissions::CONNECT
        | Permissions::SPEAK
        | Permissions::USE_VAD
}

pub fn invite_url(bot_id: UserId, permissions: Permissions) -> String {
    format!(
        "https://discord.com/api/oauth2/authorize?client_id={}&permissions={}&scope=bot%20applications.commands",
        bot_id,
        permissions.bits()
    )
}

/// Get the bot invite link
#[poise::command(slash_command, prefix_command, category = "General", aliases("inv"))]
pub async fn invite(ctx: Context<'_>) -> CommandResult {
    let theme = &ctx.data().config.theme;
    let (bot_id, avatar) = {
        let bot = ctx.cache().current_user();
        (bot.id, bot.face())
    };

    let embed = serenity::CreateEmbed::new()
        .title("📨 Invite Me!")
        .color(theme.color)
        .description(format!(
            "[Click here to invite me to your server!]({})",
            invite_url(bot_id, required_permissions())
        ))
        .field("🎵 Features", "Music playback, Queue management, Loop modes", false)
        .field("🔗 Supported Platforms", "YouTube, Spotify, direct audio links", false)
        .thumbnail(avatar)
        .footer(serenity::CreateEmbedFooter::new(&theme.footer));

    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}
