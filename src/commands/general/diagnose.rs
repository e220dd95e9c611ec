use poise::{CreateReply, serenity_prelude as serenity};
use serenity::all::Permissions;

use crate::commands::music::utils::embedded_messages;
use crate::commands::music::utils::guild_queue::PlaybackPhase;
use crate::commands::music::utils::music_manager::{MusicError, user_voice_channel};
use crate::commands::music::utils::ytdlp_binary::BINARY_NAME;
use crate::{CommandResult, Context, Error};

fn check(ok: bool, good: impl Into<String>, bad: impl Into<String>) -> String {
    if ok {
        format!("✅ {}", good.into())
    } else {
        format!("❌ {}", bad.into())
    }
}

/// Lines describing the bot's permissions in a voice channel.
pub fn permission_report(permissions: Permissions) -> Vec<String> {
    vec![
        check(
            permissions.contains(Permissions::CONNECT),
            "Bot has CONNECT permission",
            "Bot lacks CONNECT permission",
        ),
        check(
            permissions.contains(Permissions::SPEAK),
            "Bot has SPEAK permission",
            "Bot lacks SPEAK permission",
        ),
    ]
}

/// Run diagnostics on voice permissions and the audio toolchain
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    category = "General",
    aliases("diag")
)]
pub async fn diagnose(ctx: Context<'_>) -> CommandResult {
    let data = ctx.data();
    let theme = &data.config.theme;
    let guild_id = ctx
        .guild_id()
        .ok_or_else(|| Box::new(MusicError::NotInGuild) as Error)?;

    let voice_channel = match user_voice_channel(ctx.serenity_context(), guild_id, ctx.author().id) {
        Ok(channel) => channel,
        Err(_) => {
            ctx.send(embedded_messages::error_reply(
                theme,
                "Not in Voice Channel",
                "You must be in a voice channel to run diagnostics.",
            ))
            .await?;
            return Ok(());
        }
    };

    ctx.defer().await?;

    let mut lines = Vec::new();

    let bot_id = ctx.cache().current_user().id;
    let member = guild_id.member(ctx, bot_id).await?;
    let permissions = {
        let guild = ctx.guild().ok_or(MusicError::NotInGuild)?;
        guild
            .channels
            .get(&voice_channel)
            .map(|channel| guild.user_permissions_in(channel, &member))
    };
    match permissions {
        Some(permissions) => lines.extend(permission_report(permissions)),
        None => lines.push("⚠️ Voice channel not found in cache".to_string()),
    }

    lines.push(check(
        songbird::get(ctx.serenity_context()).await.is_some(),
        "Voice manager registered",
        "Voice manager NOT registered",
    ));

    let extractor = data
        .ytdlp
        .find_tool(BINARY_NAME)
        .or_else(|| Some(data.ytdlp.cached_path()).filter(|path| path.is_file()));
    lines.push(match extractor {
        Some(path) => format!("✅ yt-dlp available at {}", path.display()),
        None => "⚠️ yt-dlp not installed yet, it will be downloaded on first play".to_string(),
    });

    lines.push(check(
        data.ytdlp.find_tool("ffmpeg").is_some(),
        "ffmpeg found for transcoding",
        "ffmpeg NOT found, transcoding is unavailable",
    ));

    let phase = match data.orchestrator.phase(guild_id).await {
        PlaybackPhase::Disconnected => "not connected",
        PlaybackPhase::Connecting => "connecting",
        PlaybackPhase::Idle => "connected, idle",
        PlaybackPhase::Playing => "connected, playing",
    };
    lines.push(format!("ℹ️ Player state: {}", phase));
    lines.push("ℹ️ If voice connection fails, check your firewall allows UDP traffic to Discord.".to_string());

    let embed = embedded_messages::info(
        theme,
        "🎵 Voice Diagnostics",
        format!("```\n{}\n```", lines.join("\n")),
    );
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}
