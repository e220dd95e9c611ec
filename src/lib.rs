//! Groove: a Discord music bot built on poise, serenity and songbird.

use std::sync::{Arc, LazyLock};
use std::time::Instant;

pub mod commands;
pub mod events;
pub mod utils;

use commands::music::audio_sources::TrackResolver;
use commands::music::utils::music_manager::PlaybackOrchestrator;
use commands::music::utils::ytdlp_binary::YtDlpBinary;
use utils::config::BotConfig;
use utils::database::DataStore;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
pub type CommandResult = Result<(), Error>;

/// Shared HTTP client for Discord-independent API calls.
pub static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(reqwest::Client::new);

/// User data, which is stored and accessible in all command invocations
pub struct Data {
    pub config: BotConfig,
    pub orchestrator: Arc<PlaybackOrchestrator>,
    pub resolver: Arc<dyn TrackResolver>,
    pub store: Arc<DataStore>,
    pub ytdlp: Arc<YtDlpBinary>,
    pub started_at: Instant,
}
