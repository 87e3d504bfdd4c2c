use std::time::Duration;

use rstest::rstest;
use segfeed::{EngineEvent, EngineOptions, play};
use segfeed_test_utils::ContainerLayout;

use crate::common::{Harness, drain, eventually, layout, tracing_setup, wait_for};

#[rstest]
#[tokio::test(start_paused = true)]
async fn stall_at_tail_restarts_loop(_tracing_setup: (), layout: ContainerLayout) {
    let mut harness = Harness::new(layout);
    harness.clock.set_looping(true);
    let playback = play(harness.parts(), EngineOptions::default())
        .await
        .unwrap();
    let mut events = playback.events();
    wait_for(&mut events, |event| matches!(event, EngineEvent::EndOfStream)).await;

    harness.clock.set_time(15.8);
    harness.clock.stall();

    wait_for(&mut events, |event| matches!(event, EngineEvent::LoopRestart)).await;
    assert_eq!(harness.clock.engine_seeks(), vec![0.0]);

    let issued = wait_for(&mut events, |event| {
        matches!(event, EngineEvent::SeekIssued { .. })
    })
    .await;
    assert!(matches!(
        issued,
        EngineEvent::SeekIssued { time, offset, .. }
            if time == 0.0 && offset == harness.layout.unit_offset(0)
    ));
    eventually(|| harness.clock.plays() == 1).await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn stall_without_loop_does_not_rewind(_tracing_setup: (), layout: ContainerLayout) {
    let mut harness = Harness::new(layout);
    let playback = play(harness.parts(), EngineOptions::default())
        .await
        .unwrap();
    let mut events = playback.events();
    wait_for(&mut events, |event| matches!(event, EngineEvent::EndOfStream)).await;

    harness.clock.set_time(15.8);
    harness.clock.stall();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(harness.clock.engine_seeks().is_empty());
    assert_eq!(harness.clock.plays(), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn buffered_loop_start_does_not_resume_later(_tracing_setup: (), layout: ContainerLayout) {
    let mut harness = Harness::new(layout);
    harness.clock.set_looping(true);
    let playback = play(harness.parts(), EngineOptions::default())
        .await
        .unwrap();
    let mut events = playback.events();
    wait_for(&mut events, |event| matches!(event, EngineEvent::EndOfStream)).await;

    harness.clock.set_buffered(vec![0.0..30.0]);
    harness.clock.set_time(15.8);
    harness.clock.stall();
    wait_for(&mut events, |event| matches!(event, EngineEvent::LoopRestart)).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(
        !drain(&mut events)
            .iter()
            .any(|event| matches!(event, EngineEvent::SeekIssued { .. }))
    );

    harness.clock.set_buffered(Vec::new());
    harness.clock.user_seek(10.0);
    wait_for(&mut events, |event| {
        matches!(event, EngineEvent::SegmentAppended { .. })
    })
    .await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(harness.clock.plays(), 0);
}
