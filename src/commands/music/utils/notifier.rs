//! Status messages the orchestrator sends back to a guild's text channel.

use serenity::all::{ChannelId, CreateMessage, Http};
use serenity::async_trait;
use std::sync::Arc;
use tracing::error;

use super::embedded_messages::{self, EmbedTheme};
use super::guild_queue::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
    Info,
    NowPlaying,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
    pub track: Option<Track>,
}

impl Notification {
    fn message(kind: NotificationKind, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            description: description.into(),
            track: None,
        }
    }

    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::message(NotificationKind::Success, title, description)
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::message(NotificationKind::Error, title, description)
    }

    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::message(NotificationKind::Info, title, description)
    }

    pub fn now_playing(track: Track) -> Self {
        Self {
            kind: NotificationKind::NowPlaying,
            title: "Now Playing".to_string(),
            description: track.title.clone(),
            track: Some(track),
        }
    }
}

/// Delivers notifications to a channel.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, channel: ChannelId, notification: Notification);
}

/// Renders notifications as embeds and posts them through the Discord API.
pub struct SerenityNotifier {
    http: Arc<Http>,
    theme: EmbedTheme,
}

impl SerenityNotifier {
    pub fn new(http: Arc<Http>, theme: EmbedTheme) -> Self {
        Self { http, theme }
    }
}

#[async_trait]
impl NotificationSink for SerenityNotifier {
    async fn notify(&self, channel: ChannelId, notification: Notification) {
        let embed = embedded_messages::notification(&notification, &self.theme);
        if let Err(e) = channel
            .send_message(self.http.as_ref(), CreateMessage::new().embed(embed))
            .await
        {
            error!("Failed to send '{}' to channel {}: {}", notification.title, channel, e);
        }
    }
}
