//! Turns what a user typed into [`Track`]s.
//! YouTube URLs and free text go through yt-dlp, Spotify links are looked up
//! and matched to YouTube searches.

pub mod spotify;
pub mod track_metadata;
pub mod youtube;

use futures::stream::{self, StreamExt, TryStreamExt};
use serenity::all::UserId;
use serenity::async_trait;
use tracing::{info, warn};
use url::Url;

use crate::commands::music::utils::guild_queue::Track;
use crate::commands::music::utils::music_manager::{MusicError, MusicResult};
use spotify::{SpotifyApi, SpotifyLink, SpotifyTrack};
use youtube::YoutubeApi;

/// How many YouTube searches run at once when matching a Spotify collection.
const SEARCH_CONCURRENCY: usize = 4;

/// Tracks found for a query, and the playlist or album name if there was one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub tracks: Vec<Track>,
    pub collection: Option<String>,
}

impl Resolved {
    fn single(track: Track) -> Self {
        Self {
            tracks: vec![track],
            collection: None,
        }
    }
}

#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str, requested_by: UserId) -> MusicResult<Resolved>;
}

pub fn is_url(input: &str) -> bool {
    Url::parse(input)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Dispatches a query to YouTube or Spotify.
pub struct QueryResolver {
    youtube: YoutubeApi,
    spotify: Option<SpotifyApi>,
}

impl QueryResolver {
    pub fn new(youtube: YoutubeApi, spotify: Option<SpotifyApi>) -> Self {
        Self { youtube, spotify }
    }

    async fn resolve_spotify(&self, link: SpotifyLink, requested_by: UserId) -> MusicResult<Resolved> {
        let spotify = self.spotify.as_ref().ok_or_else(|| {
            MusicError::ConfigError("Spotify links need SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET".to_string())
        })?;

        match link {
            SpotifyLink::Track(id) => {
                let track = spotify.track(&id).await?;
                let found = self.match_on_youtube(&track, requested_by).await?;
                Ok(Resolved::single(found))
            }
            SpotifyLink::Album(id) => {
                let album = spotify.album(&id).await?;
                self.match_collection(album.name, album.tracks, requested_by).await
            }
            SpotifyLink::Playlist(id) => {
                let playlist = spotify.playlist(&id).await?;
                self.match_collection(playlist.name, playlist.tracks, requested_by)
                    .await
            }
        }
    }

    async fn match_on_youtube(&self, track: &SpotifyTrack, requested_by: UserId) -> MusicResult<Track> {
        let found = self
            .youtube
            .search_variants(&track.search_queries(), requested_by)
            .await?;

        // Keep the Spotify credit when YouTube has no uploader.
        if found.author == "Unknown" {
            if let Some(artist) = track.artists.first() {
                return Ok(found.with_author(artist.name.clone()));
            }
        }
        Ok(found)
    }

    async fn match_collection(
        &self,
        name: String,
        tracks: Vec<SpotifyTrack>,
        requested_by: UserId,
    ) -> MusicResult<Resolved> {
        if tracks.is_empty() {
            return Err(MusicError::AudioSourceError(format!("Spotify collection '{}' is empty", name)));
        }

        let matched: Vec<Option<Track>> = stream::iter(tracks)
            .map(|track| async move {
                match self.match_on_youtube(&track, requested_by).await {
                    Ok(found) => Ok::<_, MusicError>(Some(found)),
                    Err(e) => {
                        warn!("No YouTube match for '{}': {}", track.name, e);
                        Ok(None)
                    }
                }
            })
            .buffered(SEARCH_CONCURRENCY)
            .try_collect()
            .await?;

        let tracks: Vec<Track> = matched.into_iter().flatten().collect();
        if tracks.is_empty() {
            return Err(MusicError::AudioSourceError(
                "Could not find any valid tracks to play".to_string(),
            ));
        }

        info!("Matched {} tracks from '{}'", tracks.len(), name);
        Ok(Resolved {
            tracks,
            collection: Some(name),
        })
    }
}

#[async_trait]
impl TrackResolver for QueryResolver {
    async fn resolve(&self, query: &str, requested_by: UserId) -> MusicResult<Resolved> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MusicError::InvalidTrack("Please provide a song name or URL".to_string()));
        }

        if let Some(link) = SpotifyLink::parse(query) {
            return self.resolve_spotify(link, requested_by).await;
        }

        if youtube::playlist_id(query).is_some() {
            let tracks = self.youtube.playlist(query, requested_by).await?;
            return Ok(Resolved {
                tracks,
                collection: Some("YouTube playlist".to_string()),
            });
        }

        if youtube::video_id(query).is_some() {
            return self.youtube.video(query, requested_by).await.map(Resolved::single);
        }

        if is_url(query) {
            // A direct stream or a page yt-dlp may know; play the URL as is
            // when there is no metadata.
            let track = match self.youtube.video(query, requested_by).await {
                Ok(track) => track,
                Err(e) => {
                    info!("No metadata for {}, queueing it directly: {}", query, e);
                    Track::new(query, query, requested_by)
                }
            };
            return Ok(Resolved::single(track));
        }

        self.youtube
            .search(query, requested_by)
            .await
            .map(Resolved::single)
            .map_err(|e| MusicError::AudioSourceError(format!("No results found for your query: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::commands::music::utils::ytdlp_binary::YtDlpBinary;
    use std::sync::Arc;

    fn resolver_without_extractor() -> QueryResolver {
        let dir = std::env::temp_dir().join("groove-resolver-tests");
        let binary = YtDlpBinary::new(dir, "http://127.0.0.1:9/unused")
            .unwrap()
            .with_search_path("");
        QueryResolver::new(YoutubeApi::new(Arc::new(binary)), None)
    }

    #[test]
    fn urls_need_an_http_scheme() {
        assert!(is_url("https://radio.example/stream.mp3"));
        assert!(!is_url("ftp://example.com/file"));
        assert!(!is_url("never gonna give you up"));
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let result = resolver_without_extractor().resolve("   ", UserId::new(1)).await;
        assert_matches!(result, Err(MusicError::InvalidTrack(_)));
    }

    #[tokio::test]
    async fn spotify_without_credentials_is_a_config_error() {
        let result = resolver_without_extractor()
            .resolve("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC", UserId::new(1))
            .await;
        assert_matches!(result, Err(MusicError::ConfigError(_)));
    }

    #[tokio::test]
    async fn unknown_urls_are_queued_as_is_without_metadata() {
        let url = "https://radio.example/stream.mp3";

        let resolved = resolver_without_extractor().resolve(url, UserId::new(1)).await.unwrap();

        assert_eq!(resolved.collection, None);
        assert_eq!(resolved.tracks, vec![Track::new(url, url, UserId::new(1))]);
    }
}
