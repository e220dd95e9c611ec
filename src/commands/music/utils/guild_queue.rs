//! Per-guild playback state: the pending track sequence, the current track,
//! the loop policy, and the handles the orchestrator parks between operations.

use rand::seq::SliceRandom;
use serenity::all::{ChannelId, UserId};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

use super::extractor_process::ExtractionSlot;
use super::music_manager::MusicError;
use super::voice_transport::VoiceConnection;

/// Thumbnail shown when a source does not provide one.
pub const PLACEHOLDER_THUMBNAIL: &str = "https://via.placeholder.com/120";

/// A playable item produced by the track resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub title: String,
    pub source_url: String,
    /// Zero means live or unknown.
    pub duration: Duration,
    pub thumbnail_url: String,
    pub author: String,
    pub requested_by: UserId,
}

impl Track {
    pub fn new(title: impl Into<String>, source_url: impl Into<String>, requested_by: UserId) -> Self {
        Self {
            title: title.into(),
            source_url: source_url.into(),
            duration: Duration::ZERO,
            thumbnail_url: PLACEHOLDER_THUMBNAIL.to_string(),
            author: "Unknown".to_string(),
            requested_by,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail_url: impl Into<String>) -> Self {
        self.thumbnail_url = thumbnail_url.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn is_live(&self) -> bool {
        self.duration.is_zero()
    }
}

/// How the queue behaves once a track finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LoopMode {
    /// Play each track once and drain the queue.
    #[default]
    Off,
    /// Repeat the current track indefinitely.
    Track,
    /// Cycle the whole queue indefinitely.
    Queue,
}

impl LoopMode {
    pub fn label(&self) -> &'static str {
        match self {
            LoopMode::Off => "off",
            LoopMode::Track => "track",
            LoopMode::Queue => "queue",
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LoopMode {
    type Err = MusicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(LoopMode::Off),
            "track" => Ok(LoopMode::Track),
            "queue" => Ok(LoopMode::Queue),
            other => Err(MusicError::InvalidLoopMode(other.to_string())),
        }
    }
}

/// Where a guild sits in the playback lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Disconnected,
    Connecting,
    Idle,
    Playing,
}

/// Queue and playback state for one guild.
///
/// The orchestrator only touches the `pub(crate)` handles while holding the
/// guild's lock in the registry.
pub struct GuildQueue {
    tracks: VecDeque<Track>,
    current_track: Option<Track>,
    loop_mode: LoopMode,
    is_playing: bool,
    pub(crate) connecting: bool,
    pub(crate) connection: Option<Arc<dyn VoiceConnection>>,
    pub(crate) text_channel: Option<ChannelId>,
    pub(crate) extraction: ExtractionSlot,
    /// Transport id of the track currently fed to the player.
    pub(crate) active_track: Option<u64>,
    /// Set by `enqueue` so only one caller kicks off playback.
    pub(crate) start_requested: bool,
    pub(crate) scheduled_play: Option<AbortHandle>,
    pub(crate) teardown: Option<AbortHandle>,
}

impl Default for GuildQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl GuildQueue {
    pub fn new() -> Self {
        Self {
            tracks: VecDeque::new(),
            current_track: None,
            loop_mode: LoopMode::Off,
            is_playing: false,
            connecting: false,
            connection: None,
            text_channel: None,
            extraction: ExtractionSlot::default(),
            active_track: None,
            start_requested: false,
            scheduled_play: None,
            teardown: None,
        }
    }

    pub fn add_track(&mut self, track: Track) {
        self.tracks.push_back(track);
    }

    pub fn add_tracks(&mut self, tracks: impl IntoIterator<Item = Track>) {
        self.tracks.extend(tracks);
    }

    /// Picks the track to play next and makes it the current track.
    ///
    /// Track mode replays the current track. Queue mode re-appends the
    /// outgoing current track so the queue cycles without shrinking.
    /// Returns `None` once an Off-mode queue is exhausted, leaving the
    /// current track untouched.
    pub fn get_next_track(&mut self) -> Option<Track> {
        if self.loop_mode == LoopMode::Track {
            if let Some(current) = &self.current_track {
                return Some(current.clone());
            }
        }

        let Some(next) = self.tracks.pop_front() else {
            if self.loop_mode == LoopMode::Queue {
                return self.current_track.clone();
            }
            return None;
        };

        let previous = self.current_track.replace(next.clone());
        if self.loop_mode == LoopMode::Queue {
            if let Some(previous) = previous {
                self.tracks.push_back(previous);
            }
        }

        Some(next)
    }

    /// Parses and applies a loop mode. Invalid input leaves the mode unchanged.
    pub fn set_loop(&mut self, mode: &str) -> Result<LoopMode, MusicError> {
        let mode = mode.parse::<LoopMode>()?;
        self.loop_mode = mode;
        Ok(mode)
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    /// Empties the pending tracks; the current track is kept.
    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// True when nothing is pending. The current track is not considered.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn shuffle(&mut self) {
        self.tracks.make_contiguous().shuffle(&mut rand::rng());
    }

    /// Removes the pending track at a 0-based position.
    pub fn remove(&mut self, index: usize) -> Option<Track> {
        self.tracks.remove(index)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_track.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Marks `track` as the one being fed to the transport.
    pub(crate) fn start_playing(&mut self, track: Track) {
        self.current_track = Some(track);
        self.is_playing = true;
    }

    /// Clears the current track and the playing flag together.
    pub(crate) fn stop_playing(&mut self) {
        self.current_track = None;
        self.is_playing = false;
        self.active_track = None;
    }

    /// Gives up on the current track after it could not be played.
    ///
    /// Track loop forgets it so it is not retried forever. Queue loop keeps it
    /// as the outgoing track, so the next `get_next_track` puts it back on the
    /// tail and the cycle does not shrink.
    pub(crate) fn fail_current(&mut self) {
        if self.loop_mode != LoopMode::Queue {
            self.current_track = None;
        }
        self.is_playing = false;
        self.active_track = None;
    }

    /// Whether a finished track should be followed by another `play`.
    pub(crate) fn should_continue(&self) -> bool {
        self.loop_mode == LoopMode::Track
            || self.loop_mode == LoopMode::Queue
            || !self.tracks.is_empty()
    }

    pub fn phase(&self) -> PlaybackPhase {
        if self.connecting {
            PlaybackPhase::Connecting
        } else if self.connection.is_none() {
            PlaybackPhase::Disconnected
        } else if self.is_playing {
            PlaybackPhase::Playing
        } else {
            PlaybackPhase::Idle
        }
    }

    /// Cancels everything in flight and hands back the connection, if any.
    pub(crate) fn shut_down(&mut self) -> Option<Arc<dyn VoiceConnection>> {
        self.extraction.cancel();
        self.cancel_scheduled_play();
        self.cancel_teardown();
        self.stop_playing();
        self.start_requested = false;
        self.connecting = false;
        self.connection.take()
    }

    /// Whether `connection_id` identifies the connection this queue holds.
    pub(crate) fn holds_connection(&self, connection_id: u64) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|connection| connection.id() == connection_id)
    }

    pub(crate) fn cancel_scheduled_play(&mut self) {
        if let Some(handle) = self.scheduled_play.take() {
            handle.abort();
        }
    }

    pub(crate) fn cancel_teardown(&mut self) {
        if let Some(handle) = self.teardown.take() {
            handle.abort();
        }
    }
}
