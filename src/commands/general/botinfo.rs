use poise::{CreateReply, serenity_prelude as serenity};
use std::time::Duration;
use thousands::Separable;

use crate::utils::database::STAT_COMMANDS_EXECUTED;
use crate::{CommandResult, Context};

/// Display information about the bot
#[poise::command(slash_command, prefix_command, category = "General", aliases("info", "bi"))]
pub async fn botinfo(ctx: Context<'_>) -> CommandResult {
    let data = ctx.data();
    let commands_executed = data.store.stat(STAT_COMMANDS_EXECUTED)?;

    let (name, id, avatar) = {
        let bot = ctx.cache().current_user();
        (bot.name.clone(), bot.id, bot.face())
    };
    let servers = ctx.cache().guild_count();
    let users = ctx.cache().user_count();

    let embed = serenity::CreateEmbed::new()
        .title("🤖 Bot Information")
        .color(data.config.theme.color)
        .thumbnail(avatar)
        .field("📛 Bot Name", name, true)
        .field("🆔 Bot ID", id.to_string(), true)
        .field("📊 Servers", servers.separate_with_commas(), true)
        .field("👥 Users", users.separate_with_commas(), true)
        .field("📝 Commands Executed", commands_executed.separate_with_commas(), true)
        .field("⏰ Uptime", format_uptime(data.started_at.elapsed()), true)
        .field("📦 Version", format!("v{}", env!("CARGO_PKG_VERSION")), true)
        .field("🎛️ Active Players", data.orchestrator.registry().len().to_string(), true)
        .footer(serenity::CreateEmbedFooter::new(&data.config.theme.footer))
        .timestamp(serenity::Timestamp::now());

    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Formats an uptime as "1d 2h 3m 4s".
pub fn format_uptime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    let days = total / 86_400;
    let hours = (total / 3600) % 24;
    let minutes = (total / 60) % 60;
    let seconds = total % 60;
    format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
}
