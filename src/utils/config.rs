//! Typed settings read from the environment (and `.env` via dotenv).

use serenity::all::UserId;
use std::path::PathBuf;
use thiserror::Error;

use crate::commands::music::audio_sources::spotify::SpotifyCredentials;
use crate::commands::music::utils::audio_acquirer::AcquirerSettings;
use crate::commands::music::utils::embedded_messages::EmbedTheme;
use crate::commands::music::utils::music_manager::PlaybackTimings;
use crate::commands::music::utils::stream_resolvers::{
    AudioQuality, DEFAULT_INVIDIOUS_INSTANCES, INNERTUBE_PLAYER_ENDPOINT,
};
use crate::commands::music::utils::ytdlp_binary::{DEFAULT_DOWNLOAD_URL, default_cache_dir};
use crate::utils::database::APPDATA_DB;

pub const DEFAULT_PREFIX: &str = "!";
pub const DEFAULT_EMBED_COLOR: u32 = 0xFF0080;
pub const DEFAULT_EMBED_FOOTER: &str = "🎵 Music Bot";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub prefix: String,
    pub owner_id: Option<UserId>,
    pub spotify: Option<SpotifyCredentials>,
    pub theme: EmbedTheme,
    pub database_path: PathBuf,
    pub ytdlp_cache_dir: PathBuf,
    pub ytdlp_download_url: String,
    pub prefer_transcode: bool,
    pub audio_quality: AudioQuality,
    pub invidious_instances: Vec<String>,
    pub timings: PlaybackTimings,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let token = get("DISCORD_TOKEN").ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let owner_id = get("OWNER_ID")
            .map(|value| match value.parse::<u64>() {
                Ok(id) if id != 0 => Ok(UserId::new(id)),
                _ => Err(invalid("OWNER_ID", &value, "expected a Discord user id")),
            })
            .transpose()?;

        let spotify = match (get("SPOTIFY_CLIENT_ID"), get("SPOTIFY_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(SpotifyCredentials {
                client_id,
                client_secret,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("SPOTIFY_CLIENT_SECRET")),
            (None, Some(_)) => return Err(ConfigError::Missing("SPOTIFY_CLIENT_ID")),
        };

        let color = get("EMBED_COLOR")
            .map(|value| {
                u32::from_str_radix(value.trim_start_matches('#'), 16)
                    .ok()
                    .filter(|c| *c <= 0xFFFFFF)
                    .ok_or_else(|| invalid("EMBED_COLOR", &value, "expected a hex colour like FF0080"))
            })
            .transpose()?
            .unwrap_or(DEFAULT_EMBED_COLOR);

        let prefer_transcode = get("PREFER_TRANSCODE")
            .map(|value| parse_bool(&value).ok_or_else(|| invalid("PREFER_TRANSCODE", &value, "expected true or false")))
            .transpose()?
            .unwrap_or(false);

        let audio_quality = get("AUDIO_QUALITY")
            .map(|value| {
                value
                    .parse::<AudioQuality>()
                    .map_err(|e| invalid("AUDIO_QUALITY", &value, &e.to_string()))
            })
            .transpose()?
            .unwrap_or_default();

        let invidious_instances = get("INVIDIOUS_INSTANCES")
            .map(|value| {
                value
                    .split(',')
                    .map(|s| s.trim().trim_end_matches('/').to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| DEFAULT_INVIDIOUS_INSTANCES.iter().map(|s| s.to_string()).collect());

        Ok(Self {
            token,
            prefix: get("PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            owner_id,
            spotify,
            theme: EmbedTheme {
                color,
                footer: get("EMBED_FOOTER").unwrap_or_else(|| DEFAULT_EMBED_FOOTER.to_string()),
            },
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(APPDATA_DB)),
            ytdlp_cache_dir: get("YTDLP_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_cache_dir),
            ytdlp_download_url: get("YTDLP_DOWNLOAD_URL")
                .unwrap_or_else(|| DEFAULT_DOWNLOAD_URL.to_string()),
            prefer_transcode,
            audio_quality,
            invidious_instances,
            timings: PlaybackTimings::default(),
        })
    }

    pub fn acquirer_settings(&self) -> AcquirerSettings {
        AcquirerSettings {
            prefer_transcode: self.prefer_transcode,
            quality: self.audio_quality,
            invidious_instances: self.invidious_instances.clone(),
            innertube_endpoint: INNERTUBE_PLAYER_ENDPOINT.to_string(),
            first_chunk_timeout: self.timings.first_chunk_timeout,
        }
    }
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
