use poise::{CreateReply, serenity_prelude as serenity};
use std::time::{Duration, Instant};

use crate::{CommandResult, Context};

/// Ping the bot to check its latency
#[poise::command(slash_command, prefix_command, category = "General")]
pub async fn ping(ctx: Context<'_>) -> CommandResult {
    let started = Instant::now();
    let theme = &ctx.data().config.theme;

    let handle = ctx
        .send(CreateReply::default().content("🏓 Pinging..."))
        .await?;
    let roundtrip = started.elapsed().as_millis();

    let api_latency = match get_shard_latency(&ctx).await {
        Some(latency) => format!("{} ms", latency.as_millis()),
        None => "unknown".to_string(),
    };

    let embed = serenity::CreateEmbed::new()
        .title("🏓 Pong!")
        .color(theme.color)
        .field("Bot Latency", format!("{} ms", roundtrip), true)
        .field("API Latency", api_latency, true)
        .footer(serenity::CreateEmbedFooter::new(&theme.footer));

    handle
        .edit(ctx, CreateReply::default().content("").embed(embed))
        .await?;

    Ok(())
}

async fn get_shard_latency(ctx: &Context<'_>) -> Option<Duration> {
    // The shard manager is an interface for mutating, stopping, restarting, and
    // retrieving information about shards.
    let shard_manager = ctx.framework().shard_manager();
    let runners = shard_manager.runners.lock().await;

    // Shards are backed by a "shard runner" responsible for processing events
    // over the shard, so we'll get the information about the shard runner for
    // the shard this command was sent over.
    let runner = runners.get(&serenity::ShardId(ctx.serenity_context().shard_id.0))?;

    runner.latency
}
