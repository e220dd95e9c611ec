use poise::{CreateReply, serenity_prelude as serenity};
use serenity::all::{CreateEmbed, CreateEmbedFooter, Timestamp};

use super::format_duration;
use super::guild_queue::{LoopMode, Track};
use super::music_manager::{MusicError, QueueSnapshot};
use super::notifier::{Notification, NotificationKind};

const SUCCESS_COLOR: u32 = 0x00ff00;
const ERROR_COLOR: u32 = 0xff0000;

/// How many pending tracks the queue view lists.
pub const QUEUE_PAGE_SIZE: usize = 10;

/// Colour and footer shared by every embed the bot sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedTheme {
    pub color: u32,
    pub footer: String,
}

impl Default for EmbedTheme {
    fn default() -> Self {
        Self {
            color: 0x5865f2,
            footer: "Music Bot".to_string(),
        }
    }
}

impl EmbedTheme {
    fn base(&self, color: u32, title: impl Into<String>) -> CreateEmbed {
        CreateEmbed::new()
            .title(title)
            .color(color)
            .footer(CreateEmbedFooter::new(&self.footer))
            .timestamp(Timestamp::now())
    }
}

fn track_link(track: &Track) -> String {
    format!("[{}]({})", track.title, track.source_url)
}

pub fn success(theme: &EmbedTheme, title: &str, description: impl Into<String>) -> CreateEmbed {
    theme
        .base(SUCCESS_COLOR, format!("✅ {}", title))
        .description(description)
}

pub fn error(theme: &EmbedTheme, title: &str, description: impl Into<String>) -> CreateEmbed {
    theme
        .base(ERROR_COLOR, format!("❌ {}", title))
        .description(description)
}

pub fn info(theme: &EmbedTheme, title: &str, description: impl Into<String>) -> CreateEmbed {
    theme.base(theme.color, title).description(description)
}

/// Create an embed for the track that just started
pub fn now_playing(theme: &EmbedTheme, track: &Track) -> CreateEmbed {
    theme
        .base(theme.color, "🎶 Now Playing")
        .description(format!("**{}**", track_link(track)))
        .field("🎤 Artist", &track.author, true)
        .field("⏱️ Duration", format_duration(track.duration), true)
        .field("👤 Requested by", format!("<@{}>", track.requested_by), true)
        .thumbnail(&track.thumbnail_url)
}

/// Create an embed for a single track added to the queue
pub fn added_to_queue(theme: &EmbedTheme, track: &Track, position: usize) -> CreateEmbed {
    theme
        .base(theme.color, "🎵 Added to Queue")
        .description(format!("**{}**", track_link(track)))
        .field("⏱️ Duration", format_duration(track.duration), true)
        .field("Position", format!("`#{}`", position), true)
        .thumbnail(&track.thumbnail_url)
}

/// Create an embed for a playlist or album added to the queue
pub fn tracks_added(theme: &EmbedTheme, count: usize, collection: Option<&str>, position: usize) -> CreateEmbed {
    let description = match collection {
        Some(name) => format!("Added **{}** tracks from **{}** to the queue.", count, name),
        None => format!("Added **{}** tracks to the queue.", count),
    };
    theme
        .base(theme.color, "🎵 Playlist Added")
        .description(description)
        .field("Position", format!("`#{}`", position), true)
}

/// Adds a loop field unless looping is off.
pub fn with_loop_mode(embed: CreateEmbed, mode: LoopMode) -> CreateEmbed {
    let label = match mode {
        LoopMode::Off => return embed,
        LoopMode::Track => "Track Loop",
        LoopMode::Queue => "Queue Loop",
    };
    embed.field("🔁 Loop Mode", label, true)
}

/// Render a guild's queue. Only the first page of pending tracks is listed.
pub fn music_queue(theme: &EmbedTheme, snapshot: &QueueSnapshot) -> CreateEmbed {
    let mut description = String::new();

    match &snapshot.current {
        Some(track) => {
            description.push_str("**Now Playing:**\n");
            description.push_str(&format!("🎵 {}\n\n", track_link(track)));
        }
        None => description.push_str("**🔇 Nothing playing**\n\n"),
    }

    description.push_str("**Up Next:**\n");
    if snapshot.upcoming.is_empty() {
        description.push_str("No songs in queue");
    } else {
        let listed = snapshot
            .upcoming
            .iter()
            .take(QUEUE_PAGE_SIZE)
            .enumerate()
            .map(|(index, track)| {
                format!(
                    "{}. **{}** - {}",
                    index + 1,
                    track_link(track),
                    format_duration(track.duration)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        description.push_str(&listed);
    }

    let mut footer = theme.footer.clone();
    if snapshot.upcoming.len() > QUEUE_PAGE_SIZE {
        footer = format!(
            "And {} more... {}",
            snapshot.upcoming.len() - QUEUE_PAGE_SIZE,
            theme.footer
        );
    }

    let embed = theme
        .base(theme.color, "📜 Music Queue")
        .description(description)
        .footer(CreateEmbedFooter::new(footer));
    with_loop_mode(embed, snapshot.loop_mode)
}

/// Render a notification raised by the orchestrator.
pub fn notification(notification: &Notification, theme: &EmbedTheme) -> CreateEmbed {
    match (notification.kind, &notification.track) {
        (NotificationKind::NowPlaying, Some(track)) => now_playing(theme, track),
        (NotificationKind::Success, _) => success(theme, &notification.title, &notification.description),
        (NotificationKind::Error, _) => error(theme, &notification.title, &notification.description),
        _ => info(theme, &notification.title, &notification.description),
    }
}

/// Reply with an error embed visible only to the invoking user.
pub fn error_reply(theme: &EmbedTheme, title: &str, description: impl Into<String>) -> CreateReply {
    CreateReply::default()
        .embed(error(theme, title, description))
        .ephemeral(true)
}

pub fn reply(embed: CreateEmbed) -> CreateReply {
    CreateReply::default().embed(embed)
}

/// Create a reply for a failed music command
pub fn music_error(theme: &EmbedTheme, err: &MusicError) -> CreateReply {
    let title = match err {
        MusicError::UserNotInVoiceChannel => "Not in Voice",
        MusicError::NotConnected | MusicError::NothingPlaying => "Nothing Playing",
        MusicError::ConnectionFailure(_) => "Connection Error",
        MusicError::InvalidLoopMode(_) => "Invalid Mode",
        MusicError::AudioSourceError(_) | MusicError::InvalidTrack(_) => "No Results",
        _ => "Error",
    };
    error_reply(theme, title, err.to_string())
}
