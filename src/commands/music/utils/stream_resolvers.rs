//! HTTP-based extraction strategies. Both hand back a remote media URL that
//! songbird fetches itself, so no local process is involved.

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::{Deserialize, Deserializer};
use serenity::async_trait;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::audio_acquirer::{AcquiredAudio, ExtractionStrategy};
use super::extractor_process::ExtractionTicket;
use super::music_manager::{MusicError, MusicResult};
use crate::commands::music::audio_sources::youtube::video_id;

pub const DEFAULT_INVIDIOUS_INSTANCES: &[&str] = &[
    "https://inv.nadeko.net",
    "https://yewtu.be",
    "https://invidious.nerdvpn.de",
    "https://invidious.privacydev.net",
];

pub const INNERTUBE_PLAYER_ENDPOINT: &str = "https://www.youtube.com/youtubei/v1/player";

const ANDROID_CLIENT_VERSION: &str = "19.09.37";
const ANDROID_USER_AGENT: &str = "com.google.android.youtube/19.09.37 (Linux; U; Android 11) gzip";

const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".ogg", ".opus", ".flac", ".m4a", ".aac", ".webm"];

/// Which bitrate to pick among the audio formats a resolver finds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AudioQuality {
    #[default]
    Highest,
    Medium,
    Lowest,
}

impl FromStr for AudioQuality {
    type Err = MusicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "highest" | "high" => Ok(AudioQuality::Highest),
            "medium" => Ok(AudioQuality::Medium),
            "lowest" | "low" => Ok(AudioQuality::Lowest),
            other => Err(MusicError::ConfigError(format!("unknown audio quality '{}'", other))),
        }
    }
}

/// One audio-only format offered by a video page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFormat {
    pub url: String,
    pub mime_type: String,
    pub bitrate: u64,
}

/// Picks a format by quality tier. Non-audio entries are ignored.
pub fn select_audio_format(formats: &[AudioFormat], quality: AudioQuality) -> Option<&AudioFormat> {
    let mut audio: Vec<&AudioFormat> = formats
        .iter()
        .filter(|f| f.mime_type.starts_with("audio/"))
        .collect();
    audio.sort_by_key(|f| f.bitrate);

    match quality {
        AudioQuality::Highest => audio.last().copied(),
        AudioQuality::Medium => audio.get(audio.len() / 2).copied(),
        AudioQuality::Lowest => audio.first().copied(),
    }
}

/// Accepts bitrates serialized either as numbers or as numeric strings.
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    url: Option<String>,
    #[serde(alias = "type", alias = "mimeType", default)]
    mime_type: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    bitrate: Option<u64>,
}

fn usable_formats(raw: Vec<RawFormat>) -> Vec<AudioFormat> {
    raw.into_iter()
        .filter_map(|f| {
            Some(AudioFormat {
                url: f.url?,
                mime_type: f.mime_type,
                bitrate: f.bitrate.unwrap_or_default(),
            })
        })
        .collect()
}

fn failure(strategy: &'static str, reason: impl Into<String>) -> MusicError {
    MusicError::ExtractionFailure {
        strategy,
        reason: reason.into(),
    }
}

#[derive(Debug, Deserialize)]
struct InvidiousVideo {
    #[serde(rename = "adaptiveFormats", default)]
    adaptive_formats: Vec<RawFormat>,
}

/// Resolves a direct media URL without any external process.
///
/// YouTube videos go through the Invidious API, picking a format by quality
/// tier; anything else is checked over HTTP and accepted when it serves media.
pub struct DirectStreamResolver {
    http: reqwest::Client,
    instances: Vec<String>,
    quality: AudioQuality,
}

impl DirectStreamResolver {
    pub const NAME: &'static str = "direct stream";

    pub fn new(http: reqwest::Client, instances: Vec<String>, quality: AudioQuality) -> Self {
        Self {
            http,
            instances,
            quality,
        }
    }

    async fn resolve_youtube(&self, id: &str) -> MusicResult<AcquiredAudio> {
        let mut last_error = String::from("no Invidious instances configured");

        for instance in &self.instances {
            let url = format!(
                "{}/api/v1/videos/{}?fields=adaptiveFormats",
                instance.trim_end_matches('/'),
                id
            );
            debug!("Querying Invidious instance {}", instance);

            match self.query_instance(&url).await {
                Ok(formats) => match select_audio_format(&formats, self.quality) {
                    Some(format) => return Ok(AcquiredAudio::remote(format.url.clone(), Self::NAME)),
                    None => last_error = format!("{} offered no audio formats", instance),
                },
                Err(e) => last_error = format!("{}: {}", instance, e),
            }
        }

        Err(failure(Self::NAME, last_error))
    }

    async fn query_instance(&self, url: &str) -> Result<Vec<AudioFormat>, reqwest::Error> {
        let video: InvidiousVideo = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(usable_formats(video.adaptive_formats))
    }

    async fn sniff_media(&self, url: &str) -> MusicResult<AcquiredAudio> {
        let mut response = self
            .http
            .head(url)
            .send()
            .await
            .map_err(|e| failure(Self::NAME, e.to_string()))?;

        if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            response = self
                .http
                .get(url)
                .header(header::RANGE, "bytes=0-0")
                .send()
                .await
                .map_err(|e| failure(Self::NAME, e.to_string()))?;
        }

        if !response.status().is_success() {
            return Err(failure(Self::NAME, format!("server answered {}", response.status())));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if is_media_content_type(&content_type) || has_audio_extension(url) {
            Ok(AcquiredAudio::remote(url.to_string(), Self::NAME))
        } else {
            Err(failure(
                Self::NAME,
                format!("'{}' is not a media content type", content_type),
            ))
        }
    }
}

fn is_media_content_type(content_type: &str) -> bool {
    content_type.starts_with("audio/")
        || content_type.starts_with("video/")
        || content_type.starts_with("application/ogg")
        || content_type.starts_with("application/octet-stream")
        || content_type.contains("mpegurl")
}

fn has_audio_extension(url: &str) -> bool {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_default();
    AUDIO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[async_trait]
impl ExtractionStrategy for DirectStreamResolver {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn extract(&self, url: &str, _ticket: &ExtractionTicket) -> MusicResult<AcquiredAudio> {
        match video_id(url) {
            Some(id) => self.resolve_youtube(&id).await,
            None => self.sniff_media(url).await,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlayerResponse {
    #[serde(rename = "playabilityStatus")]
    playability: Option<Playability>,
    #[serde(rename = "streamingData")]
    streaming_data: Option<StreamingData>,
}

#[derive(Debug, Deserialize)]
struct Playability {
    status: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamingData {
    #[serde(rename = "adaptiveFormats", default)]
    adaptive_formats: Vec<RawFormat>,
}

/// Asks YouTube's player endpoint directly, posing as the Android client.
pub struct InnertubeResolver {
    http: reqwest::Client,
    endpoint: String,
}

impl InnertubeResolver {
    pub const NAME: &'static str = "innertube";

    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    fn request_body(id: &str) -> serde_json::Value {
        serde_json::json!({
            "videoId": id,
            "context": {
                "client": {
                    "clientName": "ANDROID",
                    "clientVersion": ANDROID_CLIENT_VERSION,
                    "androidSdkVersion": 30,
                    "hl": "en",
                    "gl": "US"
                }
            },
            "contentCheckOk": true,
            "racyCheckOk": true
        })
    }
}

#[async_trait]
impl ExtractionStrategy for InnertubeResolver {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn extract(&self, url: &str, _ticket: &ExtractionTicket) -> MusicResult<AcquiredAudio> {
        let id = video_id(url).ok_or_else(|| failure(Self::NAME, "not a YouTube video URL"))?;

        let response: PlayerResponse = self
            .http
            .post(format!("{}?prettyPrint=false", self.endpoint))
            .header(header::USER_AGENT, ANDROID_USER_AGENT)
            .json(&Self::request_body(&id))
            .timeout(Duration::from_secs(15))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| failure(Self::NAME, e.to_string()))?
            .json()
            .await
            .map_err(|e| failure(Self::NAME, format!("unreadable player response: {}", e)))?;

        if let Some(playability) = &response.playability {
            if playability.status != "OK" {
                return Err(failure(
                    Self::NAME,
                    format!(
                        "video not playable ({}): {}",
                        playability.status,
                        playability.reason.as_deref().unwrap_or("no reason given")
                    ),
                ));
            }
        }

        let formats = usable_formats(
            response
                .streaming_data
                .map(|d| d.adaptive_formats)
                .unwrap_or_default(),
        );
        let format = select_audio_format(&formats, AudioQuality::Highest)
            .ok_or_else(|| failure(Self::NAME, "no audio format with a plain URL"))?;

        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(ANDROID_USER_AGENT));

        Ok(AcquiredAudio::Remote {
            url: format.url.clone(),
            headers,
            source: Self::NAME,
        })
    }
}
