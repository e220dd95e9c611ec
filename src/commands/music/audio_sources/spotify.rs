//! Spotify track, album and playlist lookups.
//! Uses the client credentials flow; Spotify audio itself is never played,
//! each track is matched to a YouTube search instead.

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use regex::Regex;
use reqwest::header;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::commands::music::utils::music_manager::{MusicError, MusicResult};

pub const ACCOUNTS_URL: &str = "https://accounts.spotify.com";
pub const API_URL: &str = "https://api.spotify.com/v1";

/// Albums and playlists are cut to this many tracks.
pub const COLLECTION_LIMIT: usize = 50;

/// Suffixes tried after the bare "artists - title" query.
const SEARCH_VARIANTS: [&str; 3] = ["official audio", "audio", "lyrics"];

static SPOTIFY_LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?open\.spotify\.com/(?:intl-[a-z]+/)?(track|album|playlist)/([a-zA-Z0-9]+)(?:\?.*)?$")
        .expect("valid spotify link regex")
});

static SPOTIFY_URI_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^spotify:(track|album|playlist):([a-zA-Z0-9]+)$").expect("valid spotify uri regex")
});

/// What a Spotify URL points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpotifyLink {
    Track(String),
    Album(String),
    Playlist(String),
}

impl SpotifyLink {
    pub fn parse(url: &str) -> Option<Self> {
        let url = url.trim();
        let captures = SPOTIFY_LINK_REGEX
            .captures(url)
            .or_else(|| SPOTIFY_URI_REGEX.captures(url))?;
        let id = captures.get(2)?.as_str().to_string();

        match captures.get(1)?.as_str() {
            "track" => Some(Self::Track(id)),
            "album" => Some(Self::Album(id)),
            "playlist" => Some(Self::Playlist(id)),
            _ => None,
        }
    }
}

pub fn is_spotify_url(url: &str) -> bool {
    SpotifyLink::parse(url).is_some()
}

/// Basic track information retrieved from Spotify.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpotifyTrack {
    /// Missing for local files in playlists.
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpotifyArtist {
    pub name: String,
}

impl SpotifyTrack {
    /// YouTube queries to try for this track, best match first.
    pub fn search_queries(&self) -> Vec<String> {
        let artists = self
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let base = if artists.is_empty() {
            self.name.clone()
        } else {
            format!("{} - {}", artists, self.name)
        };

        let mut queries = vec![base.clone()];
        queries.extend(SEARCH_VARIANTS.iter().map(|suffix| format!("{} {}", base, suffix)));
        queries
    }
}

/// A resolved album or playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyCollection {
    pub name: String,
    pub tracks: Vec<SpotifyTrack>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct SpotifyToken {
    access_token: String,
    expires_at: Instant,
}

impl SpotifyToken {
    /// Considered expired 30 seconds early.
    fn is_expired(&self) -> bool {
        Instant::now() + Duration::from_secs(30) >= self.expires_at
    }
}

#[derive(Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

#[derive(Deserialize)]
struct NamedCollection {
    name: String,
}

pub struct SpotifyApi {
    http: reqwest::Client,
    credentials: SpotifyCredentials,
    accounts_url: String,
    api_url: String,
    token: Mutex<Option<SpotifyToken>>,
}

impl SpotifyApi {
    pub fn new(http: reqwest::Client, credentials: SpotifyCredentials) -> Self {
        Self {
            http,
            credentials,
            accounts_url: ACCOUNTS_URL.to_string(),
            api_url: API_URL.to_string(),
            token: Mutex::new(None),
        }
    }

    /// Points the client at other hosts.
    pub fn with_endpoints(mut self, accounts_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        self.accounts_url = accounts_url.into();
        self.api_url = api_url.into();
        self
    }

    async fn access_token(&self) -> MusicResult<String> {
        let mut token = self.token.lock().await;
        if let Some(current) = token.as_ref().filter(|t| !t.is_expired()) {
            return Ok(current.access_token.clone());
        }

        debug!("Requesting a new Spotify access token");
        let auth = BASE64_STANDARD.encode(format!(
            "{}:{}",
            self.credentials.client_id, self.credentials.client_secret
        ));

        let response = self
            .http
            .post(format!("{}/api/token", self.accounts_url))
            .header(header::AUTHORIZATION, format!("Basic {}", auth))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| MusicError::ExternalApiError(format!("Failed to request Spotify token: {}", e)))?;

        let response = check_status(response).await?;
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| MusicError::ExternalApiError(format!("Failed to parse Spotify token: {}", e)))?;

        let access_token = body.access_token.clone();
        *token = Some(SpotifyToken {
            access_token: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });
        Ok(access_token)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> MusicResult<T> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| MusicError::ExternalApiError(format!("Spotify request failed: {}", e)))?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| MusicError::ExternalApiError(format!("Failed to parse Spotify response: {}", e)))
    }

    pub async fn track(&self, id: &str) -> MusicResult<SpotifyTrack> {
        self.get(&format!("{}/tracks/{}", self.api_url, id)).await
    }

    pub async fn album(&self, id: &str) -> MusicResult<SpotifyCollection> {
        let album: NamedCollection = self.get(&format!("{}/albums/{}", self.api_url, id)).await?;
        let first = format!("{}/albums/{}/tracks?limit={}", self.api_url, id, COLLECTION_LIMIT);
        let tracks = self.collect_pages::<SpotifyTrack>(first, Some).await?;
        Ok(SpotifyCollection {
            name: album.name,
            tracks,
        })
    }

    pub async fn playlist(&self, id: &str) -> MusicResult<SpotifyCollection> {
        let playlist: NamedCollection = self
            .get(&format!("{}/playlists/{}?fields=name", self.api_url, id))
            .await?;
        let first = format!("{}/playlists/{}/tracks?limit={}", self.api_url, id, COLLECTION_LIMIT);
        let tracks = self
            .collect_pages::<PlaylistItem>(first, |item| item.track)
            .await?;
        Ok(SpotifyCollection {
            name: playlist.name,
            tracks,
        })
    }

    /// Follows `next` links until [`COLLECTION_LIMIT`] playable tracks are
    /// collected. Tracks without an id (local files) are skipped.
    async fn collect_pages<T: serde::de::DeserializeOwned>(
        &self,
        first: String,
        to_track: impl Fn(T) -> Option<SpotifyTrack>,
    ) -> MusicResult<Vec<SpotifyTrack>> {
        let mut tracks = Vec::new();
        let mut next = Some(first);

        while let Some(url) = next.take() {
            let page: Page<T> = self.get(&url).await?;
            tracks.extend(
                page.items
                    .into_iter()
                    .filter_map(&to_track)
                    .filter(|track| track.id.is_some()),
            );
            if tracks.len() >= COLLECTION_LIMIT {
                tracks.truncate(COLLECTION_LIMIT);
                break;
            }
            next = page.next;
        }

        info!("Fetched {} Spotify tracks", tracks.len());
        Ok(tracks)
    }
}

async fn check_status(response: reqwest::Response) -> MusicResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Cannot read response".to_string());
    Err(MusicError::ExternalApiError(format!(
        "Spotify API error: {} - {}",
        status, text
    )))
}
