use std::time::Duration;

use rstest::rstest;
use segfeed::{EngineError, EngineEvent, EngineOptions, LifecycleState, Playback, play};
use segfeed_test_utils::{ContainerLayout, MemoryBackend, MemorySource, OpenMode};

use crate::common::{Harness, layout, tracing_setup, wait_for};

#[rstest]
#[tokio::test]
async fn unsupported_environment_fails_before_allocation(
    _tracing_setup: (),
    layout: ContainerLayout,
) {
    let source = MemorySource::new(layout.bytes());
    let mut harness = Harness::with(layout, source, MemoryBackend::unavailable());

    let result = play(harness.parts(), EngineOptions::default()).await;

    assert!(matches!(result, Err(EngineError::UnsupportedEnvironment)));
    assert_eq!(harness.backend.sessions_created(), 0);
    assert!(harness.source.calls().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn session_that_never_opens_times_out(_tracing_setup: (), layout: ContainerLayout) {
    let source = MemorySource::new(layout.bytes());
    let backend = MemoryBackend::default().with_open_mode(OpenMode::Never);
    let mut harness = Harness::with(layout, source, backend);

    let result = play(harness.parts(), EngineOptions::default()).await;

    assert!(matches!(
        result,
        Err(EngineError::SessionOpenTimeout(timeout)) if timeout == Duration::from_secs(10)
    ));
    assert!(harness.session().is_released());
    assert!(harness.source.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn open_does_not_fetch_until_started(_tracing_setup: (), layout: ContainerLayout) {
    let mut harness = Harness::new(layout);
    let playback = Playback::open(harness.parts(), EngineOptions::default())
        .await
        .unwrap();
    let mut events = playback.events();

    tokio::task::yield_now().await;
    assert!(harness.source.calls().is_empty());
    assert_eq!(playback.session().lifecycle(), LifecycleState::Opened);

    playback.start();
    wait_for(&mut events, |event| matches!(event, EngineEvent::Ready { .. })).await;
    assert_eq!(harness.source.ranges()[0], 0..999_999);
}

#[rstest]
#[tokio::test]
async fn ready_once_tracks_are_bound(_tracing_setup: (), layout: ContainerLayout) {
    let mut harness = Harness::new(layout);
    let playback = play(harness.parts(), EngineOptions::default())
        .await
        .unwrap();
    let mut events = playback.events();

    wait_for(&mut events, |event| matches!(event, EngineEvent::InitAppended { .. })).await;

    let lifecycle = playback.session().lifecycle();
    assert!(matches!(lifecycle, LifecycleState::Ready | LifecycleState::Ended));
    assert_eq!(playback.session().track_ids(), vec![1]);
}
