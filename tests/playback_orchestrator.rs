mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use groove::commands::music::utils::audio_acquirer::ExtractionStrategy;
use groove::commands::music::utils::guild_queue::{LoopMode, PlaybackPhase, Track};
use groove::commands::music::utils::music_manager::MusicError;
use pretty_assertions::assert_eq;
use tokio_test::assert_ok;

use common::fixtures::{
    GUILD, REQUESTER, TEXT_CHANNEL, VOICE_CHANNEL, youtube_track, youtube_tracks,
};
use common::mocks::{
    BrokenStrategy, EchoStrategy, FailOnceStrategy, FakeTransport, ProcessCounter,
    SlowProcessStrategy,
};
use common::{Harness, eventually};

fn urls(tracks: &[Track]) -> Vec<String> {
    tracks.iter().map(|t| t.source_url.clone()).collect()
}

async fn connected(
    transport: FakeTransport,
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
) -> Harness {
    let harness = Harness::new(transport, strategies);
    assert_ok!(
        harness
            .orchestrator
            .create_connection(GUILD, VOICE_CHANNEL, TEXT_CHANNEL)
            .await
    );
    harness
}

fn echo() -> Vec<Arc<dyn ExtractionStrategy>> {
    vec![Arc::new(EchoStrategy)]
}

#[tokio::test(start_paused = true)]
async fn plays_queued_tracks_back_to_back() {
    let h = connected(FakeTransport::new(), echo()).await;
    let tracks = youtube_tracks(2);

    let outcome = h.orchestrator.enqueue(GUILD, tracks.clone()).await;
    assert_eq!((outcome.position, outcome.added, outcome.should_start), (1, 2, true));

    h.orchestrator.play(GUILD).await;
    let connection = h.transport.last();
    assert_eq!(connection.played(), urls(&tracks[..1]));
    assert_eq!(h.orchestrator.phase(GUILD).await, PlaybackPhase::Playing);

    connection.finish_track();
    assert!(eventually(|| connection.played().len() == 2).await);
    assert_eq!(connection.played(), urls(&tracks));
    assert_eq!(h.notifier.count("Now Playing"), 2);

    connection.finish_track();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let snapshot = h.orchestrator.snapshot(GUILD).await.unwrap();
    assert_eq!(snapshot.current, None);
    assert_eq!(snapshot.phase, PlaybackPhase::Idle);
    assert_eq!(connection.played().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn notifications_go_to_the_command_channel() {
    let h = connected(FakeTransport::new(), echo()).await;
    let track = youtube_track("ccccccccccc");
    h.orchestrator.enqueue(GUILD, vec![track.clone()]).await;

    h.orchestrator.play(GUILD).await;

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, TEXT_CHANNEL);
    assert_eq!(sent[0].1.track, Some(track));
}

#[tokio::test]
async fn only_the_first_enqueue_into_an_idle_guild_starts_playback() {
    let h = connected(FakeTransport::new(), echo()).await;

    let first = h.orchestrator.enqueue(GUILD, youtube_tracks(1)).await;
    let second = h.orchestrator.enqueue(GUILD, youtube_tracks(2)).await;

    assert!(first.should_start);
    assert!(!second.should_start);
    assert_eq!(second.position, 2);
    assert_eq!(second.added, 2);
}

#[tokio::test(start_paused = true)]
async fn track_end_on_an_empty_queue_goes_idle() {
    let h = connected(FakeTransport::new(), echo()).await;
    h.orchestrator.enqueue(GUILD, youtube_tracks(1)).await;
    h.orchestrator.play(GUILD).await;

    h.orchestrator.handle_track_end(GUILD).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(h.transport.last().played().len(), 1);
    assert_eq!(h.orchestrator.phase(GUILD).await, PlaybackPhase::Idle);
    assert_eq!(h.orchestrator.snapshot(GUILD).await.unwrap().current, None);
}

#[tokio::test]
async fn track_end_for_an_unknown_guild_is_a_no_op() {
    let h = Harness::new(FakeTransport::new(), echo());

    h.orchestrator.handle_track_end(GUILD).await;

    assert!(h.orchestrator.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn track_loop_replays_the_same_track() {
    let h = connected(FakeTransport::new(), echo()).await;
    let tracks = youtube_tracks(2);
    h.orchestrator.enqueue(GUILD, tracks.clone()).await;
    h.orchestrator.play(GUILD).await;

    let mode = h.orchestrator.set_loop(GUILD, "track").await.unwrap();
    assert_eq!(mode, LoopMode::Track);

    let connection = h.transport.last();
    connection.finish_track();
    assert!(eventually(|| connection.played().len() == 2).await);
    assert_eq!(connection.played(), vec![tracks[0].source_url.clone(); 2]);
}

#[tokio::test(start_paused = true)]
async fn queue_loop_keeps_cycling_after_pending_drains() {
    let h = connected(FakeTransport::new(), echo()).await;
    let tracks = youtube_tracks(2);
    h.orchestrator.enqueue(GUILD, tracks.clone()).await;
    h.orchestrator.play(GUILD).await;
    h.orchestrator.set_loop(GUILD, "queue").await.unwrap();

    let connection = h.transport.last();
    for played in 2..=4 {
        connection.finish_track();
        assert!(eventually(|| connection.played().len() == played).await);
    }

    let mut expected = urls(&tracks);
    expected.extend(urls(&tracks));
    assert_eq!(connection.played(), expected);
}

#[tokio::test(start_paused = true)]
async fn track_failing_under_queue_loop_comes_round_again() {
    let tracks = youtube_tracks(3);
    let flaky = tracks[1].source_url.clone();
    let strategies: Vec<Arc<dyn ExtractionStrategy>> =
        vec![Arc::new(FailOnceStrategy::new(flaky.clone()))];
    let h = connected(FakeTransport::new(), strategies).await;
    h.orchestrator.enqueue(GUILD, tracks.clone()).await;
    h.orchestrator.play(GUILD).await;
    h.orchestrator.set_loop(GUILD, "queue").await.unwrap();

    let connection = h.transport.last();
    connection.finish_track();
    assert!(eventually(|| connection.played().len() == 2).await);
    assert_eq!(h.notifier.count("Playback Error"), 1);

    for played in 3..=4 {
        connection.finish_track();
        assert!(eventually(|| connection.played().len() == played).await);
    }

    assert_eq!(
        connection.played(),
        vec![
            tracks[0].source_url.clone(),
            tracks[2].source_url.clone(),
            tracks[0].source_url.clone(),
            flaky,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn player_error_reports_and_moves_on() {
    let h = connected(FakeTransport::new(), echo()).await;
    let tracks = youtube_tracks(2);
    h.orchestrator.enqueue(GUILD, tracks.clone()).await;
    h.orchestrator.play(GUILD).await;
    let connection = h.transport.last();

    connection.emit_player_error("decoder crashed");

    assert!(eventually(|| connection.played().len() == 2).await);
    assert_eq!(connection.played(), urls(&tracks));
    assert_eq!(h.notifier.count("Playback Error"), 1);
    let (_, error) = h
        .notifier
        .sent()
        .into_iter()
        .find(|(_, n)| n.title == "Playback Error")
        .unwrap();
    assert!(
        error.description.contains("decoder crashed"),
        "unexpected description: {}",
        error.description
    );
}

#[tokio::test(start_paused = true)]
async fn connection_errors_leave_playback_alone() {
    let h = connected(FakeTransport::new(), echo()).await;
    h.orchestrator.enqueue(GUILD, youtube_tracks(2)).await;
    h.orchestrator.play(GUILD).await;
    let connection = h.transport.last();

    connection.emit_connection_error("Socket closed (code 4006)");
    connection.emit_connection_error("udp keepalive timed out");
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(h.orchestrator.registry().contains(GUILD));
    assert!(!connection.is_destroyed());
    assert_eq!(connection.played().len(), 1);
    assert_eq!(h.notifier.titles(), vec!["Now Playing".to_string()]);
    assert_eq!(h.orchestrator.phase(GUILD).await, PlaybackPhase::Playing);
}

#[tokio::test(start_paused = true)]
async fn skip_while_starting_does_not_announce_the_skipped_track() {
    let h = connected(FakeTransport::slow_start(Duration::from_secs(2)), echo()).await;
    let tracks = youtube_tracks(2);
    h.orchestrator.enqueue(GUILD, tracks.clone()).await;

    let orchestrator = Arc::clone(&h.orchestrator);
    tokio::spawn(async move { orchestrator.play(GUILD).await });
    let connection = h.transport.last();
    assert!(eventually(|| connection.play_calls() == 1).await);

    assert!(h.orchestrator.skip(GUILD).await);

    assert!(eventually(|| connection.played().len() == 2).await);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(connection.played(), urls(&tracks));
    assert!(connection.stops() >= 1);
    assert_eq!(h.notifier.count("Now Playing"), 1);
    let (_, announced) = h.notifier.sent().pop().unwrap();
    assert_eq!(announced.track, Some(tracks[1].clone()));

    let snapshot = h.orchestrator.snapshot(GUILD).await.unwrap();
    assert_eq!(snapshot.current, Some(tracks[1].clone()));
    assert_eq!(snapshot.phase, PlaybackPhase::Playing);
}

#[tokio::test(start_paused = true)]
async fn never_runs_two_extractor_processes_at_once() {
    let counter = Arc::new(ProcessCounter::default());
    let strategy = SlowProcessStrategy {
        counter: Arc::clone(&counter),
        startup: Duration::from_secs(10),
    };
    let h = connected(FakeTransport::new(), vec![Arc::new(strategy)]).await;
    let tracks = youtube_tracks(3);
    h.orchestrator.enqueue(GUILD, tracks.clone()).await;

    let orchestrator = Arc::clone(&h.orchestrator);
    tokio::spawn(async move { orchestrator.play(GUILD).await });

    assert!(eventually(|| counter.spawned() == 1).await);
    assert!(h.orchestrator.skip(GUILD).await);
    assert_eq!(counter.live(), 0);

    assert!(eventually(|| counter.spawned() == 2).await);
    assert!(h.orchestrator.skip(GUILD).await);

    assert!(eventually(|| counter.spawned() == 3).await);
    let connection = h.transport.last();
    assert!(eventually(|| connection.played().len() == 1).await);

    assert_eq!(connection.played(), urls(&tracks[2..]));
    assert_eq!(counter.peak(), 1);

    assert!(h.orchestrator.stop(GUILD).await);
    assert_eq!(counter.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn skip_while_resolving_moves_to_the_next_track() {
    let counter = Arc::new(ProcessCounter::default());
    let strategy = SlowProcessStrategy {
        counter: Arc::clone(&counter),
        startup: Duration::from_secs(10),
    };
    let h = connected(FakeTransport::new(), vec![Arc::new(strategy)]).await;
    let tracks = youtube_tracks(2);
    h.orchestrator.enqueue(GUILD, tracks.clone()).await;

    let orchestrator = Arc::clone(&h.orchestrator);
    tokio::spawn(async move { orchestrator.play(GUILD).await });
    assert!(eventually(|| counter.spawned() == 1).await);

    assert!(h.orchestrator.skip(GUILD).await);

    let connection = h.transport.last();
    assert!(eventually(|| connection.played().len() == 1).await);
    assert_eq!(connection.played(), urls(&tracks[1..]));
    assert_eq!(h.notifier.count("Now Playing"), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_the_scheduled_next_play() {
    let h = connected(FakeTransport::new(), echo()).await;
    h.orchestrator.enqueue(GUILD, youtube_tracks(2)).await;
    h.orchestrator.play(GUILD).await;
    let connection = h.transport.last();

    h.orchestrator.handle_track_end(GUILD).await;
    assert!(h.orchestrator.stop(GUILD).await);
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(connection.played().len(), 1);
    assert!(connection.is_destroyed());
    assert!(!h.orchestrator.registry().contains(GUILD));
    assert_eq!(h.orchestrator.phase(GUILD).await, PlaybackPhase::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn stale_idle_events_are_ignored() {
    let h = connected(FakeTransport::new(), echo()).await;
    let tracks = youtube_tracks(2);
    h.orchestrator.enqueue(GUILD, tracks.clone()).await;
    h.orchestrator.play(GUILD).await;
    let connection = h.transport.last();

    connection.emit_idle(u64::MAX);
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(connection.played().len(), 1);
    let snapshot = h.orchestrator.snapshot(GUILD).await.unwrap();
    assert_eq!(snapshot.current, Some(tracks[0].clone()));

    connection.finish_track();
    assert!(eventually(|| connection.played().len() == 2).await);
}

#[tokio::test(start_paused = true)]
async fn failed_extraction_reports_every_strategy_and_moves_on() {
    let strategies: Vec<Arc<dyn ExtractionStrategy>> = vec![
        Arc::new(BrokenStrategy("first")),
        Arc::new(BrokenStrategy("second")),
    ];
    let h = connected(FakeTransport::new(), strategies).await;
    h.orchestrator.enqueue(GUILD, youtube_tracks(2)).await;

    h.orchestrator.play(GUILD).await;
    assert!(eventually(|| h.notifier.count("Playback Error") == 2).await);

    let (_, first_error) = h.notifier.sent().remove(0);
    assert!(
        first_error
            .description
            .contains("first: no formats found; second: no formats found"),
        "unexpected description: {}",
        first_error.description
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.transport.last().played().is_empty());
    assert_eq!(h.orchestrator.phase(GUILD).await, PlaybackPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn tracks_without_an_http_source_are_skipped() {
    let h = connected(FakeTransport::new(), echo()).await;
    let good = youtube_track("bbbbbbbbbbb");
    let tracks = vec![
        Track::new("Broken", "ftp://example.com/song.mp3", REQUESTER),
        good.clone(),
    ];
    h.orchestrator.enqueue(GUILD, tracks).await;

    h.orchestrator.play(GUILD).await;

    let connection = h.transport.last();
    assert!(eventually(|| connection.played().len() == 1).await);
    assert_eq!(connection.played(), vec![good.source_url]);
    assert_eq!(h.notifier.count("Playback Error"), 1);
}

#[tokio::test(start_paused = true)]
async fn connect_gives_up_after_the_timeout() {
    let h = Harness::new(FakeTransport::slow(Duration::from_secs(45)), echo());

    let result = h
        .orchestrator
        .create_connection(GUILD, VOICE_CHANNEL, TEXT_CHANNEL)
        .await;

    assert_matches!(result, Err(MusicError::ConnectionFailure(_)));
    assert_eq!(h.transport.abandoned(), 1);
    assert!(!h.orchestrator.registry().contains(GUILD));
}

#[tokio::test]
async fn refused_connect_evicts_the_guild() {
    let h = Harness::new(FakeTransport::refusing(), echo());

    let result = h
        .orchestrator
        .create_connection(GUILD, VOICE_CHANNEL, TEXT_CHANNEL)
        .await;

    assert_matches!(result, Err(MusicError::ConnectionFailure(reason)) if reason == "refused");
    assert_eq!(h.transport.abandoned(), 1);
    assert!(h.orchestrator.registry().is_empty());
}

#[tokio::test]
async fn second_create_connection_reuses_the_connection() {
    let h = connected(FakeTransport::new(), echo()).await;

    assert_ok!(
        h.orchestrator
            .create_connection(GUILD, VOICE_CHANNEL, TEXT_CHANNEL)
            .await
    );

    assert_eq!(h.transport.connections().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unrecoverable_disconnect_evicts_and_notifies() {
    let h = connected(FakeTransport::unrecoverable(), echo()).await;
    h.orchestrator.enqueue(GUILD, youtube_tracks(2)).await;
    h.orchestrator.play(GUILD).await;
    let connection = h.transport.last();

    connection.drop_connection();

    assert!(eventually(|| !h.orchestrator.registry().contains(GUILD)).await);
    assert!(eventually(|| h.notifier.count("Voice Connection Lost") == 1).await);
    assert!(connection.is_destroyed());
    let (channel, _) = h.notifier.sent().pop().unwrap();
    assert_eq!(channel, TEXT_CHANNEL);
}

#[tokio::test(start_paused = true)]
async fn recovered_disconnect_keeps_the_session() {
    let h = connected(FakeTransport::new(), echo()).await;
    let connection = h.transport.last();

    connection.drop_connection();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(h.orchestrator.registry().contains(GUILD));
    assert!(!connection.is_destroyed());
    assert_eq!(h.notifier.count("Voice Connection Lost"), 0);
}

#[tokio::test(start_paused = true)]
async fn idle_connection_is_torn_down_after_the_grace_period() {
    let h = connected(FakeTransport::new(), echo()).await;
    let connection = h.transport.last();

    h.orchestrator.play(GUILD).await;
    assert_eq!(h.notifier.titles(), vec!["Queue Ended".to_string()]);

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(h.orchestrator.registry().contains(GUILD));
    assert!(!connection.is_destroyed());

    assert!(eventually(|| !h.orchestrator.registry().contains(GUILD)).await);
    assert!(connection.is_destroyed());
}

#[tokio::test(start_paused = true)]
async fn enqueue_during_the_grace_period_keeps_the_connection() {
    let h = connected(FakeTransport::new(), echo()).await;
    let connection = h.transport.last();
    h.orchestrator.play(GUILD).await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    let outcome = h.orchestrator.enqueue(GUILD, youtube_tracks(1)).await;
    assert!(outcome.should_start);
    h.orchestrator.play(GUILD).await;

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(h.orchestrator.registry().contains(GUILD));
    assert!(!connection.is_destroyed());
    assert_eq!(connection.played().len(), 1);
}

#[tokio::test]
async fn controls_without_a_connection_return_false() {
    let h = Harness::new(FakeTransport::new(), echo());

    assert!(!h.orchestrator.pause(GUILD).await);
    assert!(!h.orchestrator.resume(GUILD).await);
    assert!(!h.orchestrator.skip(GUILD).await);
    assert!(!h.orchestrator.stop(GUILD).await);
    assert!(!h.orchestrator.disconnect(GUILD).await);
    assert!(!h.orchestrator.shuffle(GUILD).await);
    assert_eq!(h.orchestrator.remove(GUILD, 0).await, None);
    assert_matches!(
        h.orchestrator.set_loop(GUILD, "queue").await,
        Err(MusicError::NotConnected)
    );
}

#[tokio::test]
async fn disconnect_leaves_and_forgets_the_queue() {
    let h = connected(FakeTransport::new(), echo()).await;
    h.orchestrator.enqueue(GUILD, youtube_tracks(3)).await;
    let connection = h.transport.last();

    assert!(h.orchestrator.disconnect(GUILD).await);

    assert!(connection.is_destroyed());
    assert!(h.orchestrator.snapshot(GUILD).await.is_none());
}
