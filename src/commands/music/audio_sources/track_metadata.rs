//! Converts `yt-dlp -j` output into [`Track`]s.

use serde::Deserialize;
use serenity::all::UserId;
use std::time::Duration;

use crate::commands::music::utils::guild_queue::Track;
use crate::commands::music::utils::music_manager::{MusicError, MusicResult};

/// The subset of a yt-dlp info document the bot uses.
///
/// Flat playlist entries carry only `id`, `url` and `title`, so everything is
/// optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct YtDlpEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub webpage_url: Option<String>,
    pub url: Option<String>,
    pub duration: Option<f64>,
    pub is_live: Option<bool>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub thumbnails: Vec<Thumbnail>,
    pub uploader: Option<String>,
    pub channel: Option<String>,
    pub ie_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Thumbnail {
    pub url: String,
}

impl YtDlpEntry {
    /// The page a user would open, which is also what the acquirer is fed.
    fn page_url(&self) -> Option<String> {
        if let Some(url) = self.webpage_url.as_deref().filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }

        match (self.url.as_deref(), self.id.as_deref()) {
            (Some(url), _) if url.starts_with("http") => Some(url.to_string()),
            (_, Some(id)) if self.ie_key.as_deref().is_none_or(|key| key == "Youtube") => {
                Some(format!("https://www.youtube.com/watch?v={}", id))
            }
            _ => None,
        }
    }

    fn thumbnail_url(&self) -> Option<String> {
        self.thumbnail
            .clone()
            .or_else(|| self.thumbnails.last().map(|t| t.url.clone()))
    }

    /// Builds a track, or `None` when the entry has nothing playable.
    pub fn into_track(self, requested_by: UserId) -> Option<Track> {
        let source_url = self.page_url()?;
        let title = self
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Unknown Title".to_string());

        let mut track = Track::new(title, source_url, requested_by);

        if self.is_live != Some(true) {
            if let Some(secs) = self.duration.filter(|d| d.is_finite() && *d > 0.0) {
                track = track.with_duration(Duration::from_secs(secs.round() as u64));
            }
        }
        if let Some(thumbnail) = self.thumbnail_url() {
            track = track.with_thumbnail(thumbnail);
        }
        if let Some(author) = self.uploader.clone().or_else(|| self.channel.clone()) {
            track = track.with_author(author);
        }

        Some(track)
    }
}

/// Parses yt-dlp stdout: one JSON document per line.
///
/// Lines that do not describe a playable entry are skipped. An output with no
/// usable line at all is an error.
pub fn parse_entries(stdout: &str, requested_by: UserId) -> MusicResult<Vec<Track>> {
    let mut tracks = Vec::new();
    let mut last_error = None;

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<YtDlpEntry>(line) {
            Ok(entry) => tracks.extend(entry.into_track(requested_by)),
            Err(e) => last_error = Some(e),
        }
    }

    if tracks.is_empty() {
        return Err(MusicError::AudioSourceError(match last_error {
            Some(e) => format!("Failed to parse video metadata: {}", e),
            None => "No results found".to_string(),
        }));
    }
    Ok(tracks)
}
