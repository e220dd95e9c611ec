//! In-memory stand-ins for the voice transport, the notification sink and the
//! extraction strategies.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use groove::commands::music::utils::audio_acquirer::{AcquiredAudio, ExtractionStrategy};
use groove::commands::music::utils::extractor_process::{ExtractionTicket, SubprocessHandle};
use groove::commands::music::utils::music_manager::{MusicError, MusicResult};
use groove::commands::music::utils::notifier::{Notification, NotificationSink};
use groove::commands::music::utils::voice_transport::{
    TransportEvent, VoiceConnection, VoiceTransport, next_connection_id, next_track_id,
};
use serenity::all::{ChannelId, GuildId};
use tokio::sync::mpsc::UnboundedSender;

/// A voice transport that never touches the network.
#[derive(Default)]
pub struct FakeTransport {
    connect_delay: Option<Duration>,
    start_delay: Option<Duration>,
    refuse: bool,
    recover_fails: bool,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
    abandoned: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connect attempt takes `delay` before succeeding.
    pub fn slow(delay: Duration) -> Self {
        Self {
            connect_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Connections whose player takes `delay` to start each track.
    pub fn slow_start(delay: Duration) -> Self {
        Self {
            start_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// Connections that cannot be recovered after a disconnect.
    pub fn unrecoverable() -> Self {
        Self {
            recover_fails: true,
            ..Self::default()
        }
    }

    pub fn connections(&self) -> Vec<Arc<FakeConnection>> {
        self.connections.lock().unwrap().clone()
    }

    /// The most recently opened connection.
    pub fn last(&self) -> Arc<FakeConnection> {
        self.connections().pop().expect("no connection was opened")
    }

    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        _channel_id: ChannelId,
        events: UnboundedSender<TransportEvent>,
    ) -> MusicResult<Arc<dyn VoiceConnection>> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.refuse {
            return Err(MusicError::ConnectionFailure("refused".to_string()));
        }

        let connection = Arc::new(FakeConnection {
            id: next_connection_id(),
            guild_id,
            events,
            recover_fails: self.recover_fails,
            start_delay: self.start_delay,
            play_calls: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            played: Mutex::new(Vec::new()),
            current: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        });
        self.connections.lock().unwrap().push(Arc::clone(&connection));
        Ok(connection)
    }

    async fn abandon(&self, _guild_id: GuildId) {
        self.abandoned.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records what it was asked to play. `stop` reports `Idle` like a real player.
pub struct FakeConnection {
    id: u64,
    guild_id: GuildId,
    events: UnboundedSender<TransportEvent>,
    recover_fails: bool,
    start_delay: Option<Duration>,
    play_calls: AtomicUsize,
    stops: AtomicUsize,
    played: Mutex<Vec<String>>,
    current: Mutex<Option<u64>>,
    destroyed: AtomicBool,
}

impl FakeConnection {
    /// URLs handed to the player, in order.
    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    /// `play` calls received, including ones still starting.
    pub fn play_calls(&self) -> usize {
        self.play_calls.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn current_track_id(&self) -> Option<u64> {
        *self.current.lock().unwrap()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Lets the current track run to its end.
    pub fn finish_track(&self) {
        if let Some(track_id) = self.current.lock().unwrap().take() {
            self.emit_idle(track_id);
        }
    }

    /// Reports `Idle` for an arbitrary track id.
    pub fn emit_idle(&self, track_id: u64) {
        let _ = self.events.send(TransportEvent::Idle {
            guild_id: self.guild_id,
            connection_id: self.id,
            track_id,
        });
    }

    /// Fails the current track the way a crashed decoder would.
    pub fn emit_player_error(&self, reason: &str) {
        if let Some(track_id) = self.current.lock().unwrap().take() {
            let _ = self.events.send(TransportEvent::PlayerError {
                guild_id: self.guild_id,
                connection_id: self.id,
                track_id,
                reason: reason.to_string(),
            });
        }
    }

    pub fn emit_connection_error(&self, reason: &str) {
        let _ = self.events.send(TransportEvent::ConnectionError {
            guild_id: self.guild_id,
            connection_id: self.id,
            reason: reason.to_string(),
        });
    }

    pub fn drop_connection(&self) {
        let _ = self.events.send(TransportEvent::Disconnected {
            guild_id: self.guild_id,
            connection_id: self.id,
        });
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn id(&self) -> u64 {
        self.id
    }

    async fn play(&self, audio: AcquiredAudio) -> MusicResult<u64> {
        self.play_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        let url = match audio {
            AcquiredAudio::Remote { url, .. } => url,
            AcquiredAudio::Piped(_) => "piped".to_string(),
        };
        self.played.lock().unwrap().push(url);

        let track_id = next_track_id();
        *self.current.lock().unwrap() = Some(track_id);
        Ok(track_id)
    }

    async fn pause(&self) -> MusicResult<()> {
        Ok(())
    }

    async fn resume(&self) -> MusicResult<()> {
        Ok(())
    }

    async fn stop(&self) -> MusicResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.finish_track();
        Ok(())
    }

    async fn recover(&self) -> MusicResult<()> {
        if self.recover_fails {
            Err(MusicError::ReconnectFailure("voice server gone".to_string()))
        } else {
            Ok(())
        }
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Keeps every notification instead of posting it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(ChannelId, Notification)>>,
}

impl RecordingNotifier {
    pub fn titles(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, notification)| notification.title.clone())
            .collect()
    }

    pub fn sent(&self) -> Vec<(ChannelId, Notification)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, title: &str) -> usize {
        self.titles().iter().filter(|t| t.as_str() == title).count()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, channel: ChannelId, notification: Notification) {
        self.sent.lock().unwrap().push((channel, notification));
    }
}

/// Hands the page URL straight back as a remote stream.
pub struct EchoStrategy;

#[async_trait]
impl ExtractionStrategy for EchoStrategy {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn extract(&self, url: &str, _ticket: &ExtractionTicket) -> MusicResult<AcquiredAudio> {
        Ok(AcquiredAudio::remote(url, "echo"))
    }
}

/// Fails every URL.
pub struct BrokenStrategy(pub &'static str);

#[async_trait]
impl ExtractionStrategy for BrokenStrategy {
    fn name(&self) -> &'static str {
        self.0
    }

    async fn extract(&self, _url: &str, _ticket: &ExtractionTicket) -> MusicResult<AcquiredAudio> {
        Err(MusicError::ExtractionFailure {
            strategy: self.0,
            reason: "no formats found".to_string(),
        })
    }
}

/// Fails the first extraction of `url`, then echoes it like [`EchoStrategy`].
pub struct FailOnceStrategy {
    url: String,
    failed: AtomicBool,
}

impl FailOnceStrategy {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            failed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ExtractionStrategy for FailOnceStrategy {
    fn name(&self) -> &'static str {
        "fail-once"
    }

    async fn extract(&self, url: &str, _ticket: &ExtractionTicket) -> MusicResult<AcquiredAudio> {
        if url == self.url && !self.failed.swap(true, Ordering::SeqCst) {
            return Err(MusicError::ExtractionFailure {
                strategy: "fail-once",
                reason: "video unavailable".to_string(),
            });
        }
        Ok(AcquiredAudio::remote(url, "fail-once"))
    }
}

/// Counts live fake subprocesses and the most that were ever alive at once.
#[derive(Default)]
pub struct ProcessCounter {
    live: AtomicUsize,
    peak: AtomicUsize,
    spawned: AtomicUsize,
}

impl ProcessCounter {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

struct FakeProcess {
    counter: Arc<ProcessCounter>,
    alive: bool,
}

impl FakeProcess {
    fn spawn(counter: &Arc<ProcessCounter>) -> Self {
        counter.spawned.fetch_add(1, Ordering::SeqCst);
        let live = counter.live.fetch_add(1, Ordering::SeqCst) + 1;
        counter.peak.fetch_max(live, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
            alive: true,
        }
    }
}

impl SubprocessHandle for FakeProcess {
    fn terminate(&mut self) {
        if self.alive {
            self.alive = false;
            self.counter.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Parks a fake subprocess with the ticket, then takes `startup` to produce
/// audio, like a slow extractor.
pub struct SlowProcessStrategy {
    pub counter: Arc<ProcessCounter>,
    pub startup: Duration,
}

#[async_trait]
impl ExtractionStrategy for SlowProcessStrategy {
    fn name(&self) -> &'static str {
        "slow-process"
    }

    async fn extract(&self, url: &str, ticket: &ExtractionTicket) -> MusicResult<AcquiredAudio> {
        ticket.install(Box::new(FakeProcess::spawn(&self.counter)))?;
        tokio::time::sleep(self.startup).await;
        if !ticket.is_current() {
            return Err(MusicError::ExtractionCancelled);
        }
        Ok(AcquiredAudio::remote(url, "slow-process"))
    }
}
