use mediaflow::config::PlayerConfig;
use mediaflow::pipeline::backend::{SimMedia, SimStream};
use mediaflow::pipeline::error::BuildError;
use mediaflow::pipeline::types::TransportState;
use mediaflow::pipeline::{
    ClockTime, LifecycleState, PipelineError, PipelineEvent, Player, SimBackend,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const SYNC: Duration = Duration::from_secs(2);
const TEN_SECONDS: u64 = 10_000_000_000;

fn player_on(sim: &Arc<SimBackend>) -> Player {
    let mut player = Player::new(sim.clone(), PlayerConfig::default());
    player.initialize().unwrap();
    player.load_source("movie.ts").unwrap();
    player
}

#[test]
fn test_duration_then_end_of_stream() {
    let sim = Arc::new(SimBackend::new(SimMedia::file(ClockTime::from_nseconds(
        TEN_SECONDS,
    ))));
    let player = player_on(&sim);

    player.start().unwrap();
    assert!(sim.emit(PipelineEvent::DurationChanged));
    assert!(player.sync_events(SYNC));
    assert_eq!(player.duration().nseconds(), TEN_SECONDS);

    assert!(sim.emit(PipelineEvent::EndOfStream));
    assert!(player.sync_events(SYNC));
    assert!(!player.is_playing());
    assert_eq!(player.state(), LifecycleState::Stopped);
}

#[test]
fn test_zero_rate_rejected() {
    let sim = Arc::new(SimBackend::default());
    let player = player_on(&sim);
    player.start().unwrap();
    player.set_playback_rate(2.0).unwrap();

    let result = player.set_playback_rate(0.0);
    assert!(matches!(result, Err(PipelineError::InvalidParameter(_))));
    assert_eq!(player.playback_rate(), 2.0);
    assert_eq!(sim.transport_rate(), Some(2.0));
}

#[test]
fn test_error_wins_over_concurrent_pause() {
    let sim = Arc::new(SimBackend::default());
    let player = Arc::new(player_on(&sim));
    player.start().unwrap();
    assert!(player.sync_events(SYNC));

    let pauser = {
        let player = player.clone();
        thread::spawn(move || {
            for _ in 0..50 {
                let _ = player.pause();
                let _ = player.resume();
            }
        })
    };
    sim.emit(PipelineEvent::Error {
        source: "decoder".to_string(),
        message: "corrupt stream".to_string(),
        detail: Some("bad slice header".to_string()),
    });
    pauser.join().unwrap();
    assert!(player.sync_events(SYNC));
    assert_eq!(player.state(), LifecycleState::Failed);

    player.stop();
    player.stop();
    assert_eq!(player.state(), LifecycleState::Failed);
    assert_eq!(sim.transport_state(), Some(TransportState::Null));
    assert!(!player.is_playing());
}

#[test]
fn test_stop_is_idempotent() {
    let sim = Arc::new(SimBackend::default());
    let player = player_on(&sim);

    player.stop();
    assert_eq!(player.state(), LifecycleState::Stopped);

    player.start().unwrap();
    player.stop();
    player.stop();
    assert_eq!(player.state(), LifecycleState::Stopped);
    assert_eq!(player.position(), ClockTime::ZERO);

    // A stopped player can be started again
    player.start().unwrap();
    assert_eq!(player.state(), LifecycleState::Playing);
}

#[test]
fn test_duplicate_pad_links_once() {
    let sim = Arc::new(SimBackend::default());
    let player = player_on(&sim);
    player.start().unwrap();
    assert!(player.sync_events(SYNC));
    assert_eq!(sim.dynamic_link_count(), 1);

    assert!(sim.rediscover("demuxer", "video_0"));
    assert!(player.sync_events(SYNC));
    assert_eq!(sim.dynamic_link_count(), 1);
    assert_eq!(player.state(), LifecycleState::Playing);

    let health = player.health();
    assert_eq!(health.dynamic_links, 1);
    assert_eq!(health.duplicate_pads, 1);
    assert_eq!(health.ignored_pads, 1);
}

#[test]
fn test_seek_lands_within_one_key_unit() {
    let media = SimMedia::file(ClockTime::from_seconds(10))
        .with_key_unit_interval(ClockTime::from_nseconds(500_000_000));
    let sim = Arc::new(SimBackend::new(media));
    let player = player_on(&sim);
    player.start().unwrap();
    player.pause().unwrap();

    for target in [0u64, 1_250_000_000, 4_999_999_999, 9_900_000_000, TEN_SECONDS] {
        player.seek(target as i64).unwrap();
        let position = player.position().nseconds();
        assert!(position <= target, "{} landed after {}", position, target);
        assert!(target - position < 500_000_000, "{} too far from {}", position, target);
    }
}

#[test]
fn test_seek_clamps_outside_duration() {
    let sim = Arc::new(SimBackend::default());
    let player = player_on(&sim);
    player.start().unwrap();
    player.pause().unwrap();

    player.seek(-5).unwrap();
    assert_eq!(player.position(), ClockTime::ZERO);

    player.seek(60_000_000_000).unwrap();
    assert!(player.position() <= ClockTime::from_seconds(10));
}

#[test]
fn test_failed_build_leaves_nothing_behind() {
    let sim = Arc::new(SimBackend::default());
    let config = PlayerConfig::default();
    for kind in &config.decoders {
        sim.make_unavailable(kind);
    }
    let mut player = Player::new(sim.clone(), config);

    let result = player.initialize();
    assert!(matches!(
        result,
        Err(PipelineError::Build(BuildError::MissingStage { .. }))
    ));
    assert_eq!(player.state(), LifecycleState::Unbuilt);
    assert_eq!(sim.live_stages(), 0);
    assert_eq!(sim.live_graphs(), 0);
    assert!(matches!(player.start(), Err(PipelineError::NotBuilt)));
}

#[test]
fn test_audio_only_stream_is_not_linked() {
    let media = SimMedia::default().with_streams(vec![SimStream::new("audio_0", "audio/mpeg")]);
    let sim = Arc::new(SimBackend::new(media));
    let player = player_on(&sim);
    player.start().unwrap();
    assert!(player.sync_events(SYNC));

    assert_eq!(sim.dynamic_link_count(), 0);
    assert_eq!(player.state(), LifecycleState::Playing);
}

#[test]
fn test_reinitialize_recovers_from_failure() {
    let sim = Arc::new(SimBackend::default());
    let mut player = player_on(&sim);
    player.start().unwrap();
    sim.emit(PipelineEvent::Error {
        source: "sink".to_string(),
        message: "device lost".to_string(),
        detail: None,
    });
    assert!(player.sync_events(SYNC));
    assert_eq!(player.state(), LifecycleState::Failed);

    player.initialize().unwrap();
    assert_eq!(player.state(), LifecycleState::Built);
    assert_eq!(player.location(), Some("movie.ts"));
    assert_eq!(sim.live_graphs(), 1);
    player.start().unwrap();
}

#[test]
fn test_unknown_duration_passes_seeks_through() {
    let sim = Arc::new(SimBackend::new(SimMedia::live()));
    let player = player_on(&sim);
    player.start().unwrap();
    player.pause().unwrap();
    assert!(player.sync_events(SYNC));
    assert_eq!(player.duration(), ClockTime::ZERO);

    sim.set_duration(Some(ClockTime::from_seconds(10)));
    assert!(player.sync_events(SYNC));
    assert_eq!(player.duration(), ClockTime::from_seconds(10));
    player.seek(123_000_000_000).unwrap();
    assert!(player.position() <= ClockTime::from_seconds(10));

    sim.set_duration(None);
    assert!(player.sync_events(SYNC));
    assert_eq!(player.duration(), ClockTime::ZERO);
    player.seek(123_000_000_000).unwrap();
    assert_eq!(player.position(), ClockTime::from_seconds(123));
}

#[test]
fn test_incompatible_stream_fails_session() {
    let media =
        SimMedia::default().with_streams(vec![SimStream::new("video_0", "application/x-rtp")]);
    let sim = Arc::new(SimBackend::new(media));
    let player = player_on(&sim);
    player.start().unwrap();
    assert!(player.sync_events(SYNC));

    assert_eq!(player.state(), LifecycleState::Failed);
    assert!(!player.is_playing());
    let health = player.health();
    assert_eq!(health.errors, 1);
    assert_eq!(health.dynamic_links, 0);
    assert_eq!(sim.dynamic_link_count(), 0);

    player.stop();
    player.stop();
    assert_eq!(player.state(), LifecycleState::Failed);
    assert_eq!(sim.transport_state(), Some(TransportState::Null));
}

#[test]
fn test_async_start_waits_for_graph_state() {
    let sim = Arc::new(SimBackend::default());
    let player = player_on(&sim);
    sim.defer_next_state_change();

    player.start().unwrap();
    assert_eq!(player.state(), LifecycleState::Playing);
    assert!(!player.is_playing());
    assert!(player.sync_events(SYNC));
    assert!(!player.is_playing());

    assert!(sim.complete_state_change());
    assert!(player.sync_events(SYNC));
    assert!(player.is_playing());
    assert!(!sim.complete_state_change());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_volume_always_clamped(volume in proptest::num::f64::ANY) {
        let sim = Arc::new(SimBackend::default());
        let player = Player::new(sim, PlayerConfig::default());

        let applied = player.set_volume(volume);
        prop_assert!((0.0..=1.0).contains(&applied));
        prop_assert_eq!(player.volume(), applied);
        prop_assert_eq!(player.set_volume(applied), applied);
    }
}
