//! YouTube lookups through `yt-dlp`, plus URL recognition shared with the
//! audio acquirer.

use regex::Regex;
use serenity::all::UserId;
use std::sync::{Arc, LazyLock};
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

use super::track_metadata::parse_entries;
use crate::commands::music::utils::guild_queue::Track;
use crate::commands::music::utils::music_manager::{MusicError, MusicResult};
use crate::commands::music::utils::ytdlp_binary::YtDlpBinary;

/// Playlists are cut to this many entries.
pub const PLAYLIST_LIMIT: usize = 50;

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid video id regex"));

fn is_youtube_host(host: &str) -> bool {
    matches!(
        host,
        "youtube.com" | "www.youtube.com" | "m.youtube.com" | "music.youtube.com"
    )
}

/// Extracts the video id from a YouTube video URL.
///
/// Accepts watch pages, shorts, embeds, live links and `youtu.be` short
/// links. Playlist pages are not videos and yield `None`.
pub fn video_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?;
    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());

    let candidate = if host == "youtu.be" {
        segments.next().map(str::to_string)
    } else if is_youtube_host(host) {
        match segments.next()? {
            "watch" => parsed
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            "shorts" | "embed" | "live" | "v" => segments.next().map(str::to_string),
            _ => None,
        }
    } else {
        None
    };

    candidate.filter(|id| VIDEO_ID.is_match(id))
}

/// Extracts the list id from a YouTube playlist page.
pub fn playlist_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    if !parsed.host_str().is_some_and(is_youtube_host) || parsed.path() != "/playlist" {
        return None;
    }
    parsed
        .query_pairs()
        .find(|(key, _)| key == "list")
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
}

pub fn is_youtube_url(url: &str) -> bool {
    video_id(url).is_some() || playlist_id(url).is_some()
}

/// Resolves YouTube URLs and search terms by asking yt-dlp for metadata.
pub struct YoutubeApi {
    binary: Arc<YtDlpBinary>,
}

impl YoutubeApi {
    pub fn new(binary: Arc<YtDlpBinary>) -> Self {
        Self { binary }
    }

    async fn dump_json(&self, args: &[&str]) -> MusicResult<String> {
        let program = self.binary.locate().await?;
        debug!("Running {} {}", program.display(), args.join(" "));

        let output = Command::new(&program)
            .args(["-j", "--no-warnings"])
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                MusicError::AudioSourceError(format!("Failed to get video metadata: {}", e))
            })?;

        if !output.status.success() && output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MusicError::AudioSourceError(
                stderr
                    .lines()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or("yt-dlp failed")
                    .to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Metadata for a single video or other page yt-dlp understands.
    pub async fn video(&self, url: &str, requested_by: UserId) -> MusicResult<Track> {
        info!("Fetching metadata for {}", url);
        let stdout = self.dump_json(&["--no-playlist", url]).await?;
        let mut tracks = parse_entries(&stdout, requested_by)?;
        Ok(tracks.remove(0))
    }

    /// The first entries of a playlist, without per-video metadata requests.
    pub async fn playlist(&self, url: &str, requested_by: UserId) -> MusicResult<Vec<Track>> {
        info!("Fetching playlist {}", url);
        let limit = PLAYLIST_LIMIT.to_string();
        let stdout = self
            .dump_json(&["--flat-playlist", "--playlist-end", &limit, url])
            .await?;
        let mut tracks = parse_entries(&stdout, requested_by)?;
        tracks.truncate(PLAYLIST_LIMIT);
        Ok(tracks)
    }

    /// The top search result for `query`.
    pub async fn search(&self, query: &str, requested_by: UserId) -> MusicResult<Track> {
        info!("Searching YouTube for: {}", query);
        let search = format!("ytsearch1:{}", query);
        let stdout = self.dump_json(&["--no-playlist", &search]).await?;
        let mut tracks = parse_entries(&stdout, requested_by)?;
        Ok(tracks.remove(0))
    }

    /// Tries each query in turn and returns the first hit.
    pub async fn search_variants(&self, queries: &[String], requested_by: UserId) -> MusicResult<Track> {
        let mut last_error = MusicError::AudioSourceError("No results found".to_string());
        for query in queries {
            match self.search(query, requested_by).await {
                Ok(track) => return Ok(track),
                Err(e) => {
                    debug!("Search '{}' found nothing usable: {}", query, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}
