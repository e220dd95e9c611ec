//! The seam between the orchestrator and the voice gateway.
//!
//! The orchestrator only speaks to [`VoiceTransport`] and [`VoiceConnection`];
//! transport events flow back to it over an mpsc channel as
//! [`TransportEvent`] values. [`SongbirdTransport`] is the production
//! implementation.

use serenity::all::{ChannelId, GuildId};
use serenity::async_trait;
use songbird::input::{AudioStream, HttpRequest, Input, LiveInput};
use songbird::tracks::TrackHandle;
use songbird::{CoreEvent, Event, Songbird, TrackEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use symphonia::core::io::MediaSource;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::audio_acquirer::AcquiredAudio;
use super::event_handlers::{DriverDisconnectNotifier, TrackEventNotifier};
use super::music_manager::{MusicError, MusicResult};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_connection_id() -> u64 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

pub fn next_track_id() -> u64 {
    NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed)
}

/// Something the voice transport reports about a connection or its player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The player finished (or was stopped on) the given track.
    Idle {
        guild_id: GuildId,
        connection_id: u64,
        track_id: u64,
    },
    /// The player failed while playing the given track.
    PlayerError {
        guild_id: GuildId,
        connection_id: u64,
        track_id: u64,
        reason: String,
    },
    /// The voice connection dropped without being asked to.
    Disconnected {
        guild_id: GuildId,
        connection_id: u64,
    },
    /// A connection-level error that did not drop the connection.
    ConnectionError {
        guild_id: GuildId,
        connection_id: u64,
        reason: String,
    },
}

impl TransportEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            TransportEvent::Idle { guild_id, .. }
            | TransportEvent::PlayerError { guild_id, .. }
            | TransportEvent::Disconnected { guild_id, .. }
            | TransportEvent::ConnectionError { guild_id, .. } => *guild_id,
        }
    }

    pub fn connection_id(&self) -> u64 {
        match self {
            TransportEvent::Idle { connection_id, .. }
            | TransportEvent::PlayerError { connection_id, .. }
            | TransportEvent::Disconnected { connection_id, .. }
            | TransportEvent::ConnectionError { connection_id, .. } => *connection_id,
        }
    }
}

/// Opens voice connections.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Joins `channel_id`. Events for the new connection are sent on `events`.
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: UnboundedSender<TransportEvent>,
    ) -> MusicResult<Arc<dyn VoiceConnection>>;

    /// Tears down whatever a connect attempt that timed out left behind.
    async fn abandon(&self, guild_id: GuildId);
}

/// One live voice connection and its audio player.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn id(&self) -> u64;

    /// Starts feeding `audio`, replacing anything already playing.
    /// Returns the track id carried by this track's transport events.
    async fn play(&self, audio: AcquiredAudio) -> MusicResult<u64>;

    async fn pause(&self) -> MusicResult<()>;

    async fn resume(&self) -> MusicResult<()>;

    /// Stops the current track. The transport reports `Idle` afterwards.
    async fn stop(&self) -> MusicResult<()>;

    /// Re-signals the voice server after an unexpected disconnect.
    async fn recover(&self) -> MusicResult<()>;

    /// Leaves the channel for good.
    async fn destroy(&self);
}

/// Voice transport backed by songbird.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self { manager, http }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: UnboundedSender<TransportEvent>,
    ) -> MusicResult<Arc<dyn VoiceConnection>> {
        info!("Joining voice channel {} in guild {}", channel_id, guild_id);

        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| MusicError::ConnectionFailure(e.to_string()))?;

        let connection_id = next_connection_id();
        {
            let mut handler = call.lock().await;
            if let Err(e) = handler.deafen(true).await {
                warn!("Failed to self-deafen in guild {}: {}", guild_id, e);
            }
            handler.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DriverDisconnectNotifier {
                    guild_id,
                    connection_id,
                    events: events.clone(),
                },
            );
        }

        Ok(Arc::new(SongbirdConnection {
            id: connection_id,
            guild_id,
            channel_id,
            manager: self.manager.clone(),
            call,
            http: self.http.clone(),
            events,
            current: Mutex::new(None),
        }))
    }

    async fn abandon(&self, guild_id: GuildId) {
        if let Err(e) = self.manager.remove(guild_id).await {
            debug!("Nothing to abandon for guild {}: {}", guild_id, e);
        }
    }
}

struct SongbirdConnection {
    id: u64,
    guild_id: GuildId,
    channel_id: ChannelId,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<songbird::Call>>,
    http: reqwest::Client,
    events: UnboundedSender<TransportEvent>,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdConnection {
    fn current_track(&self) -> MusicResult<TrackHandle> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(MusicError::NothingPlaying)
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    fn id(&self) -> u64 {
        self.id
    }

    async fn play(&self, audio: AcquiredAudio) -> MusicResult<u64> {
        let input = into_input(audio, self.http.clone());
        let track_id = next_track_id();

        let handle = self.call.lock().await.play_only_input(input);

        for event in [TrackEvent::End, TrackEvent::Error] {
            let notifier = TrackEventNotifier {
                guild_id: self.guild_id,
                connection_id: self.id,
                track_id,
                events: self.events.clone(),
            };
            handle
                .add_event(Event::Track(event), notifier)
                .map_err(|e| MusicError::AudioSourceError(e.to_string()))?;
        }

        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(track_id)
    }

    async fn pause(&self) -> MusicResult<()> {
        self.current_track()?
            .pause()
            .map_err(|e| MusicError::AudioSourceError(e.to_string()))
    }

    async fn resume(&self) -> MusicResult<()> {
        self.current_track()?
            .play()
            .map_err(|e| MusicError::AudioSourceError(e.to_string()))
    }

    async fn stop(&self) -> MusicResult<()> {
        self.current_track()?
            .stop()
            .map_err(|e| MusicError::AudioSourceError(e.to_string()))
    }

    async fn recover(&self) -> MusicResult<()> {
        // The call lock must be released before the join completes.
        let join = {
            let mut call = self.call.lock().await;
            call.join(self.channel_id)
                .await
                .map_err(|e| MusicError::ReconnectFailure(e.to_string()))?
        };
        join.await
            .map_err(|e| MusicError::ReconnectFailure(e.to_string()))
    }

    async fn destroy(&self) {
        info!("Leaving voice channel in guild {}", self.guild_id);
        if let Err(e) = self.manager.remove(self.guild_id).await {
            debug!("Voice connection for guild {} already gone: {}", self.guild_id, e);
        }
    }
}

/// Converts acquired audio into a songbird input.
pub fn into_input(audio: AcquiredAudio, http: reqwest::Client) -> Input {
    match audio {
        AcquiredAudio::Piped(piped) => {
            let hint = piped.hint();
            let stream = AudioStream {
                input: Box::new(piped) as Box<dyn MediaSource>,
                hint: Some(hint),
            };
            Input::Live(LiveInput::Raw(stream), None)
        }
        AcquiredAudio::Remote { url, headers, .. } => {
            HttpRequest::new_with_headers(http, url, headers).into()
        }
    }
}
