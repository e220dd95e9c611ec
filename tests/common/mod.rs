//! Shared fakes and fixtures for the integration tests.
#![allow(dead_code)]

pub mod fixtures;
pub mod mocks;

use std::sync::{Arc, Once};
use std::time::Duration;

use groove::commands::music::utils::audio_acquirer::{AudioAcquirer, ExtractionStrategy};
use groove::commands::music::utils::music_manager::{
    PlaybackOrchestrator, PlaybackTimings, QueueRegistry,
};
use tracing::Level;

use mocks::{FakeTransport, RecordingNotifier};

static INIT: Once = Once::new();

/// Routes tracing output through the test harness.
pub fn init() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .init();
    });
}

/// An orchestrator wired to in-memory collaborators.
pub struct Harness {
    pub orchestrator: Arc<PlaybackOrchestrator>,
    pub transport: Arc<FakeTransport>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(transport: FakeTransport, strategies: Vec<Arc<dyn ExtractionStrategy>>) -> Self {
        Self::with_timings(transport, strategies, PlaybackTimings::default())
    }

    pub fn with_timings(
        transport: FakeTransport,
        strategies: Vec<Arc<dyn ExtractionStrategy>>,
        timings: PlaybackTimings,
    ) -> Self {
        init();
        let transport = Arc::new(transport);
        let notifier = Arc::new(RecordingNotifier::default());
        let acquirer = Arc::new(AudioAcquirer::with_strategies(
            strategies.clone(),
            strategies,
        ));
        let orchestrator = PlaybackOrchestrator::start(
            Arc::new(QueueRegistry::new()),
            transport.clone(),
            acquirer,
            notifier.clone(),
            timings,
        );
        Self {
            orchestrator,
            transport,
            notifier,
        }
    }
}

/// Polls `condition` until it holds, giving up after five minutes of (possibly
/// paused) tokio time.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(300);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
