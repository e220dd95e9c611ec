use poise::{CreateReply, serenity_prelude as serenity};
use tracing::warn;

use crate::commands::music::utils::embedded_messages;
use crate::{CommandResult, Context};

/// Display bot owner information
#[poise::command(slash_command, prefix_command, category = "General", aliases("owner"))]
pub async fn ownerinfo(ctx: Context<'_>) -> CommandResult {
    let theme = &ctx.data().config.theme;

    let owner = match ctx.data().config.owner_id {
        Some(owner_id) => owner_id
            .to_user(ctx)
            .await
            .inspect_err(|e| warn!("Could not fetch owner {}: {}", owner_id, e))
            .ok(),
        None => None,
    };

    let Some(owner) = owner else {
        ctx.send(embedded_messages::error_reply(
            theme,
            "Error",
            "Could not fetch owner information.",
        ))
        .await?;
        return Ok(());
    };

    let embed = serenity::CreateEmbed::new()
        .title("👑 Bot Owner Information")
        .color(theme.color)
        .thumbnail(owner.face())
        .field("📛 Username", &owner.name, true)
        .field("🆔 User ID", owner.id.to_string(), true)
        .field(
            "📅 Account Created",
            format!("<t:{}:R>", owner.id.created_at().unix_timestamp()),
            false,
        )
        .footer(serenity::CreateEmbedFooter::new(&theme.footer));

    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}
