use dashmap::DashMap;
use poise::serenity_prelude as serenity;
use serenity::client::Context;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use url::Url;

use super::audio_acquirer::{AudioAcquirer, FailedAttempt};
use super::guild_queue::{GuildQueue, LoopMode, PlaybackPhase, Track};
use super::notifier::{Notification, NotificationSink};
use super::voice_transport::{TransportEvent, VoiceConnection, VoiceTransport};

/// Errors that can occur during music operations
#[derive(Error, Debug)]
pub enum MusicError {
    #[error("Not in a guild")]
    NotInGuild,

    #[error("User is not in a voice channel")]
    UserNotInVoiceChannel,

    #[error("Not connected to a voice channel")]
    NotConnected,

    #[error("Nothing is playing")]
    NothingPlaying,

    #[error("Failed to get voice manager")]
    NoVoiceManager,

    #[error("Failed to join voice channel: {0}")]
    ConnectionFailure(String),

    #[error("Voice connection lost: {0}")]
    ReconnectFailure(String),

    #[error("{strategy} failed: {reason}")]
    ExtractionFailure {
        strategy: &'static str,
        reason: String,
    },

    #[error("Could not extract audio ({})", summarize(.attempts))]
    TotalExtractionFailure { attempts: Vec<FailedAttempt> },

    #[error("Extraction was superseded")]
    ExtractionCancelled,

    #[error("Invalid track: {0}")]
    InvalidTrack(String),

    #[error("Invalid loop mode '{0}' (use off, track or queue)")]
    InvalidLoopMode(String),

    #[error("yt-dlp unavailable: {0}")]
    ExtractorUnavailable(String),

    #[error("Audio source error: {0}")]
    AudioSourceError(String),

    #[error("External API error: {0}")]
    ExternalApiError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

fn summarize(attempts: &[FailedAttempt]) -> String {
    if attempts.is_empty() {
        return "no strategy applies".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for music operations
pub type MusicResult<T> = Result<T, MusicError>;

/// Finds the voice channel a user is sitting in, using the gateway cache.
pub fn user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: serenity::UserId,
) -> MusicResult<ChannelId> {
    let guild = ctx.cache.guild(guild_id).ok_or(MusicError::NotInGuild)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|state| state.channel_id)
        .ok_or(MusicError::UserNotInVoiceChannel)
}

/// Rejects tracks whose source URL can never be fetched.
pub fn validate_source(track: &Track) -> MusicResult<()> {
    let source = track.source_url.trim();
    if source.is_empty() {
        return Err(MusicError::InvalidTrack(format!(
            "'{}' has no source URL",
            track.title
        )));
    }

    match Url::parse(source) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        Ok(url) => Err(MusicError::InvalidTrack(format!(
            "unsupported scheme '{}'",
            url.scheme()
        ))),
        Err(e) => Err(MusicError::InvalidTrack(format!(
            "malformed source URL '{}': {}",
            source, e
        ))),
    }
}

pub type SharedQueue = Arc<Mutex<GuildQueue>>;

/// Every guild's queue, keyed by guild id.
///
/// Entries are created on first access and removed on stop, disconnect,
/// connection loss or idle teardown.
#[derive(Default)]
pub struct QueueRegistry {
    queues: DashMap<GuildId, SharedQueue>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SharedQueue> {
        self.queues.get(&guild_id).map(|entry| entry.value().clone())
    }

    pub fn get_or_create(&self, guild_id: GuildId) -> SharedQueue {
        self.queues
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(GuildQueue::new())))
            .value()
            .clone()
    }

    /// True if `queue` is still the registered queue for the guild.
    pub fn is_current(&self, guild_id: GuildId, queue: &SharedQueue) -> bool {
        self.queues
            .get(&guild_id)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), queue))
    }

    /// Removes the guild's entry only if it is still `queue`.
    pub fn evict_if_current(&self, guild_id: GuildId, queue: &SharedQueue) -> bool {
        let evicted = self
            .queues
            .remove_if(&guild_id, |_, registered| Arc::ptr_eq(registered, queue))
            .is_some();
        if evicted {
            debug!("Evicted queue for guild {}", guild_id);
        }
        evicted
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.queues.contains_key(&guild_id)
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

/// Timeouts and delays that shape playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackTimings {
    /// How long a new voice connection may take to become ready.
    pub connect_timeout: Duration,
    /// How long an unexpectedly dropped connection gets to recover.
    pub reconnect_window: Duration,
    /// How long an idle connection lingers after the queue ends.
    pub idle_grace: Duration,
    /// Delay between a track ending and the next `play`.
    pub advance_delay: Duration,
    /// How long the extractor subprocess gets to emit its first bytes.
    pub first_chunk_timeout: Duration,
}

impl Default for PlaybackTimings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            reconnect_window: Duration::from_secs(5),
            idle_grace: Duration::from_secs(60),
            advance_delay: Duration::from_millis(500),
            first_chunk_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of adding tracks to a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOutcome {
    /// 1-based position of the first added track among pending tracks.
    pub position: usize,
    pub added: usize,
    /// The caller must start playback with `play`.
    pub should_start: bool,
}

/// Read-only view of a guild's queue for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub current: Option<Track>,
    pub upcoming: Vec<Track>,
    pub loop_mode: LoopMode,
    pub phase: PlaybackPhase,
}

/// Drives playback for every guild.
///
/// Transport events arrive over an mpsc channel and are handled by a task
/// spawned in [`PlaybackOrchestrator::start`].
pub struct PlaybackOrchestrator {
    registry: Arc<QueueRegistry>,
    transport: Arc<dyn VoiceTransport>,
    acquirer: Arc<AudioAcquirer>,
    notifier: Arc<dyn NotificationSink>,
    timings: PlaybackTimings,
    events: UnboundedSender<TransportEvent>,
}

impl PlaybackOrchestrator {
    pub fn start(
        registry: Arc<QueueRegistry>,
        transport: Arc<dyn VoiceTransport>,
        acquirer: Arc<AudioAcquirer>,
        notifier: Arc<dyn NotificationSink>,
        timings: PlaybackTimings,
    ) -> Arc<Self> {
        let (events, receiver) = mpsc::unbounded_channel();
        let orchestrator = Arc::new(Self {
            registry,
            transport,
            acquirer,
            notifier,
            timings,
            events,
        });

        tokio::spawn(Self::run_event_loop(Arc::downgrade(&orchestrator), receiver));
        orchestrator
    }

    pub fn registry(&self) -> &Arc<QueueRegistry> {
        &self.registry
    }

    pub fn timings(&self) -> PlaybackTimings {
        self.timings
    }

    async fn run_event_loop(orchestrator: Weak<Self>, mut receiver: UnboundedReceiver<TransportEvent>) {
        while let Some(event) = receiver.recv().await {
            let Some(orchestrator) = orchestrator.upgrade() else {
                break;
            };

            if matches!(event, TransportEvent::Disconnected { .. }) {
                // Recovery waits on the network; keep other guilds moving.
                tokio::spawn(async move { orchestrator.handle_transport_event(event).await });
            } else {
                orchestrator.handle_transport_event(event).await;
            }
        }
        debug!("Transport event loop finished");
    }

    async fn handle_transport_event(self: &Arc<Self>, event: TransportEvent) {
        let guild_id = event.guild_id();
        let Some(queue) = self.registry.get(guild_id) else {
            debug!("Ignoring {:?}: guild {} has no queue", event, guild_id);
            return;
        };

        match event {
            TransportEvent::Idle {
                connection_id,
                track_id,
                ..
            } => {
                if self.claim_track(&queue, connection_id, track_id).await {
                    debug!("Track {} finished in guild {}", track_id, guild_id);
                    self.handle_track_end(guild_id).await;
                }
            }
            TransportEvent::PlayerError {
                connection_id,
                track_id,
                reason,
                ..
            } => {
                if self.claim_track(&queue, connection_id, track_id).await {
                    error!("Player error in guild {}: {}", guild_id, reason);
                    let channel = queue.lock().await.text_channel;
                    self.notify(
                        channel,
                        Notification::error("Playback Error", format!("The player stopped: {}", reason)),
                    )
                    .await;
                    self.handle_track_end(guild_id).await;
                }
            }
            TransportEvent::Disconnected { connection_id, .. } => {
                self.recover_connection(guild_id, &queue, connection_id).await;
            }
            TransportEvent::ConnectionError { reason, .. } => {
                if reason.to_ascii_lowercase().contains("socket closed") {
                    debug!("Ignoring closed socket in guild {}", guild_id);
                } else {
                    warn!("Voice connection error in guild {}: {}", guild_id, reason);
                }
            }
        }
    }

    /// Accepts a track event only for the track currently fed to the player.
    async fn claim_track(&self, queue: &SharedQueue, connection_id: u64, track_id: u64) -> bool {
        let mut queue = queue.lock().await;
        if queue.holds_connection(connection_id) && queue.active_track == Some(track_id) {
            queue.active_track = None;
            true
        } else {
            false
        }
    }

    /// Joins `voice_channel`, unless the guild already has a connection.
    ///
    /// Status messages for this guild go to `text_channel` from now on.
    pub async fn create_connection(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> MusicResult<()> {
        let queue = self.registry.get_or_create(guild_id);
        {
            let mut guard = queue.lock().await;
            guard.text_channel = Some(text_channel);
            if guard.connection.is_some() {
                return Ok(());
            }
            if guard.connecting {
                return Err(MusicError::ConnectionFailure(
                    "a connection attempt is already in progress".to_string(),
                ));
            }
            guard.connecting = true;
        }

        let attempt = timeout(
            self.timings.connect_timeout,
            self.transport
                .connect(guild_id, voice_channel, self.events.clone()),
        )
        .await;

        let mut guard = queue.lock().await;
        guard.connecting = false;

        let error = match attempt {
            Ok(Ok(connection)) => {
                if self.registry.is_current(guild_id, &queue) {
                    info!(
                        "Voice connection {} ready in guild {}",
                        connection.id(),
                        guild_id
                    );
                    guard.connection = Some(connection);
                    return Ok(());
                }
                drop(guard);
                connection.destroy().await;
                return Err(MusicError::ConnectionFailure(
                    "playback was stopped while connecting".to_string(),
                ));
            }
            Ok(Err(e)) => e,
            Err(_) => MusicError::ConnectionFailure(format!(
                "voice connection not ready within {:?}",
                self.timings.connect_timeout
            )),
        };
        drop(guard);

        error!("Could not connect in guild {}: {}", guild_id, error);
        self.transport.abandon(guild_id).await;
        self.registry.evict_if_current(guild_id, &queue);
        Err(error)
    }

    /// Appends tracks. Only one caller is told to start playback while the
    /// guild is idle.
    pub async fn enqueue(&self, guild_id: GuildId, tracks: Vec<Track>) -> EnqueueOutcome {
        let queue = self.registry.get_or_create(guild_id);
        let mut queue = queue.lock().await;

        let position = queue.len() + 1;
        let added = tracks.len();
        queue.add_tracks(tracks);

        let should_start = added > 0 && !queue.is_playing() && !queue.start_requested;
        if should_start {
            queue.start_requested = true;
            queue.cancel_teardown();
        }

        EnqueueOutcome {
            position,
            added,
            should_start,
        }
    }

    /// Plays the next track for the guild.
    ///
    /// A no-op without a voice connection. Any extraction still running for
    /// the guild is killed first; a `play` superseded by a newer one drops its
    /// result silently.
    pub async fn play(self: &Arc<Self>, guild_id: GuildId) {
        let Some(queue) = self.registry.get(guild_id) else {
            debug!("No queue for guild {}, nothing to play", guild_id);
            return;
        };

        let (ticket, track, connection, text_channel) = {
            let mut guard = queue.lock().await;
            guard.start_requested = false;

            let Some(connection) = guard.connection.clone() else {
                debug!("No voice connection in guild {}, not playing", guild_id);
                return;
            };

            let ticket = guard.extraction.begin();

            let Some(track) = guard.get_next_track() else {
                info!("Queue ended in guild {}", guild_id);
                guard.stop_playing();
                self.schedule_teardown(&mut guard, guild_id, &queue, connection.id());
                let channel = guard.text_channel;
                drop(guard);
                self.notify(
                    channel,
                    Notification::info("Queue Ended", "No more tracks in the queue."),
                )
                .await;
                return;
            };

            guard.start_playing(track.clone());
            guard.active_track = None;
            guard.cancel_teardown();
            (ticket, track, connection, guard.text_channel)
        };

        info!("Playing '{}' in guild {}", track.title, guild_id);

        if let Err(e) = validate_source(&track) {
            self.abandon_track(guild_id, &queue, text_channel, &track, e)
                .await;
            return;
        }

        let outcome = self.acquirer.acquire(&track.source_url, &ticket).await;

        if !ticket.is_current() || !self.registry.is_current(guild_id, &queue) {
            debug!("Play of '{}' in guild {} was superseded", track.title, guild_id);
            return;
        }

        let audio = match outcome {
            Ok(audio) => audio,
            Err(MusicError::ExtractionCancelled) => return,
            Err(e) => {
                self.abandon_track(guild_id, &queue, text_channel, &track, e)
                    .await;
                return;
            }
        };

        let started = connection.play(audio).await;

        let mut guard = queue.lock().await;
        if !ticket.is_current() || !self.registry.is_current(guild_id, &queue) {
            drop(guard);
            debug!("'{}' in guild {} was skipped while starting", track.title, guild_id);
            if started.is_ok() {
                if let Err(e) = connection.stop().await {
                    debug!("Could not stop skipped track in guild {}: {}", guild_id, e);
                }
            }
            return;
        }

        match started {
            Ok(track_id) => {
                guard.active_track = Some(track_id);
                drop(guard);
                self.notify(text_channel, Notification::now_playing(track))
                    .await;
            }
            Err(e) => {
                drop(guard);
                self.abandon_track(guild_id, &queue, text_channel, &track, e)
                    .await;
            }
        }
    }

    /// Reports a track that could not be played and moves on. The track is
    /// never retried straight away; under Queue loop it comes round again.
    async fn abandon_track(
        self: &Arc<Self>,
        guild_id: GuildId,
        queue: &SharedQueue,
        channel: Option<ChannelId>,
        track: &Track,
        error: MusicError,
    ) {
        error!(
            "Could not play '{}' in guild {}: {}",
            track.title, guild_id, error
        );
        queue.lock().await.fail_current();

        self.notify(
            channel,
            Notification::error(
                "Playback Error",
                format!("Could not play **{}**: {}", track.title, error),
            ),
        )
        .await;

        self.handle_track_end(guild_id).await;
    }

    /// Decides what happens after a track stops.
    ///
    /// Schedules the next `play` after the advance delay when there is
    /// anything left to play; otherwise the guild goes idle.
    pub async fn handle_track_end(self: &Arc<Self>, guild_id: GuildId) {
        let Some(queue) = self.registry.get(guild_id) else {
            return;
        };
        let mut guard = queue.lock().await;

        guard.extraction.cancel();
        guard.active_track = None;

        if !guard.should_continue() {
            debug!("Nothing left to play in guild {}", guild_id);
            guard.stop_playing();
            return;
        }

        guard.start_requested = true;
        let orchestrator = Arc::clone(self);
        let delay = self.timings.advance_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            orchestrator.play_boxed(guild_id).await;
        });
        guard.scheduled_play = Some(handle.abort_handle());
    }

    /// `play` behind a named `Send` future type, so the recursion through
    /// `handle_track_end` does not need the opaque future type to prove `Send`.
    fn play_boxed(
        self: Arc<Self>,
        guild_id: GuildId,
    ) -> futures::future::BoxFuture<'static, ()> {
        Box::pin(async move { self.play(guild_id).await })
    }

    fn schedule_teardown(
        self: &Arc<Self>,
        guard: &mut GuildQueue,
        guild_id: GuildId,
        queue: &SharedQueue,
        connection_id: u64,
    ) {
        guard.cancel_teardown();

        let orchestrator = Arc::clone(self);
        let queue = Arc::clone(queue);
        let grace = self.timings.idle_grace;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            orchestrator
                .teardown_if_idle(guild_id, &queue, connection_id)
                .await;
        });
        guard.teardown = Some(handle.abort_handle());
    }

    async fn teardown_if_idle(&self, guild_id: GuildId, queue: &SharedQueue, connection_id: u64) {
        let connection = {
            let mut guard = queue.lock().await;
            if !guard.holds_connection(connection_id) || guard.is_playing() {
                debug!("Guild {} is busy again, keeping the connection", guild_id);
                return;
            }
            guard.teardown = None;
            guard.shut_down()
        };

        self.registry.evict_if_current(guild_id, queue);
        if let Some(connection) = connection {
            info!("Leaving idle voice channel in guild {}", guild_id);
            connection.destroy().await;
        }
    }

    async fn recover_connection(&self, guild_id: GuildId, queue: &SharedQueue, connection_id: u64) {
        let connection = {
            let guard = queue.lock().await;
            match &guard.connection {
                Some(connection) if connection.id() == connection_id => Arc::clone(connection),
                _ => return,
            }
        };

        warn!("Voice connection lost in guild {}, trying to recover", guild_id);
        match timeout(self.timings.reconnect_window, connection.recover()).await {
            Ok(Ok(())) => {
                info!("Voice connection recovered in guild {}", guild_id);
                return;
            }
            Ok(Err(e)) => warn!("Recovery failed in guild {}: {}", guild_id, e),
            Err(_) => warn!(
                "Voice connection in guild {} did not recover within {:?}",
                guild_id, self.timings.reconnect_window
            ),
        }

        let channel = {
            let mut guard = queue.lock().await;
            if !guard.holds_connection(connection_id) {
                return;
            }
            guard.shut_down();
            guard.text_channel
        };

        self.registry.evict_if_current(guild_id, queue);
        connection.destroy().await;
        self.notify(
            channel,
            Notification::error(
                "Voice Connection Lost",
                "Disconnected from the voice channel. Use /play to start again.",
            ),
        )
        .await;
    }

    async fn connection(&self, guild_id: GuildId) -> Option<Arc<dyn VoiceConnection>> {
        let queue = self.registry.get(guild_id)?;
        let guard = queue.lock().await;
        guard.connection.clone()
    }

    pub async fn pause(&self, guild_id: GuildId) -> bool {
        let Some(connection) = self.connection(guild_id).await else {
            return false;
        };
        match connection.pause().await {
            Ok(()) => true,
            Err(e) => {
                debug!("Pause refused in guild {}: {}", guild_id, e);
                false
            }
        }
    }

    pub async fn resume(&self, guild_id: GuildId) -> bool {
        let Some(connection) = self.connection(guild_id).await else {
            return false;
        };
        match connection.resume().await {
            Ok(()) => true,
            Err(e) => {
                debug!("Resume refused in guild {}: {}", guild_id, e);
                false
            }
        }
    }

    /// Ends the current track. Returns false unless something is playing.
    pub async fn skip(self: &Arc<Self>, guild_id: GuildId) -> bool {
        let Some(queue) = self.registry.get(guild_id) else {
            return false;
        };

        let (connection, audible) = {
            let guard = queue.lock().await;
            let Some(connection) = guard.connection.clone() else {
                return false;
            };
            if !guard.is_playing() {
                return false;
            }
            guard.extraction.cancel();
            if guard.start_requested {
                // The next track is already on its way.
                return true;
            }
            (connection, guard.active_track.is_some())
        };

        if audible {
            if let Err(e) = connection.stop().await {
                warn!("Could not stop the player in guild {}: {}", guild_id, e);
                self.handle_track_end(guild_id).await;
            }
        } else {
            // Still resolving, so no Idle event will follow.
            self.handle_track_end(guild_id).await;
        }
        true
    }

    /// Stops playback, clears the queue and leaves the channel.
    pub async fn stop(&self, guild_id: GuildId) -> bool {
        let Some(queue) = self.registry.get(guild_id) else {
            return false;
        };

        let connection = {
            let mut guard = queue.lock().await;
            if guard.connection.is_none() {
                return false;
            }
            guard.clear();
            guard.shut_down()
        };

        self.registry.evict_if_current(guild_id, &queue);
        if let Some(connection) = connection {
            if let Err(e) = connection.stop().await {
                debug!("Player in guild {} was already stopped: {}", guild_id, e);
            }
            connection.destroy().await;
        }
        info!("Stopped playback in guild {}", guild_id);
        true
    }

    /// Leaves the channel and forgets the guild's queue.
    pub async fn disconnect(&self, guild_id: GuildId) -> bool {
        let Some(queue) = self.registry.get(guild_id) else {
            return false;
        };

        let connection = {
            let mut guard = queue.lock().await;
            guard.shut_down()
        };

        self.registry.evict_if_current(guild_id, &queue);
        match connection {
            Some(connection) => {
                connection.destroy().await;
                info!("Disconnected from voice in guild {}", guild_id);
                true
            }
            None => false,
        }
    }

    pub async fn set_loop(&self, guild_id: GuildId, mode: &str) -> MusicResult<LoopMode> {
        let queue = self.registry.get(guild_id).ok_or(MusicError::NotConnected)?;
        let mut guard = queue.lock().await;
        if guard.current_track().is_none() {
            return Err(MusicError::NothingPlaying);
        }
        guard.set_loop(mode)
    }

    pub async fn shuffle(&self, guild_id: GuildId) -> bool {
        let Some(queue) = self.registry.get(guild_id) else {
            return false;
        };
        let mut guard = queue.lock().await;
        if guard.len() < 2 {
            return false;
        }
        guard.shuffle();
        true
    }

    /// Removes the pending track at a 0-based index.
    pub async fn remove(&self, guild_id: GuildId, index: usize) -> Option<Track> {
        let queue = self.registry.get(guild_id)?;
        let mut guard = queue.lock().await;
        guard.remove(index)
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> Option<QueueSnapshot> {
        let queue = self.registry.get(guild_id)?;
        let guard = queue.lock().await;
        Some(QueueSnapshot {
            current: guard.current_track().cloned(),
            upcoming: guard.tracks().cloned().collect(),
            loop_mode: guard.loop_mode(),
            phase: guard.phase(),
        })
    }

    pub async fn phase(&self, guild_id: GuildId) -> PlaybackPhase {
        match self.registry.get(guild_id) {
            Some(queue) => queue.lock().await.phase(),
            None => PlaybackPhase::Disconnected,
        }
    }

    async fn notify(&self, channel: Option<ChannelId>, notification: Notification) {
        match channel {
            Some(channel) => self.notifier.notify(channel, notification).await,
            None => debug!("No text channel for '{}'", notification.title),
        }
    }
}
