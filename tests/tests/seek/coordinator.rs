use std::time::Duration;

use rstest::rstest;
use segfeed::{EngineEvent, EngineOptions, play};
use segfeed_test_utils::{ContainerLayout, MemoryBackend, MemorySource};

use crate::common::{Harness, drain, layout, tracing_setup, wait_for};

fn seeks_issued(events: &[EngineEvent]) -> Vec<(f64, u64)> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::SeekIssued { time, offset, .. } => Some((*time, *offset)),
            _ => None,
        })
        .collect()
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn seek_gesture_collapses_to_one_load(_tracing_setup: (), layout: ContainerLayout) {
    let mut harness = Harness::new(layout);
    let playback = play(harness.parts(), EngineOptions::default())
        .await
        .unwrap();
    let mut events = playback.events();
    wait_for(&mut events, |event| matches!(event, EngineEvent::EndOfStream)).await;

    harness.clock.user_seek(4.0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.clock.user_seek(10.0);

    let issued = wait_for(&mut events, |event| {
        matches!(event, EngineEvent::SeekIssued { .. })
    })
    .await;
    assert!(matches!(
        issued,
        EngineEvent::SeekIssued { time, offset, .. }
            if time == 10.0 && offset == harness.layout.unit_offset(5)
    ));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(seeks_issued(&drain(&mut events)).is_empty());
    assert_eq!(harness.probe().seeks, vec![(10.0, harness.layout.unit_offset(5))]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn seek_to_same_position_is_ignored(_tracing_setup: (), layout: ContainerLayout) {
    let mut harness = Harness::new(layout);
    let playback = play(harness.parts(), EngineOptions::default())
        .await
        .unwrap();
    let mut events = playback.events();
    wait_for(&mut events, |event| matches!(event, EngineEvent::EndOfStream)).await;

    harness.clock.user_seek(6.0);
    wait_for(&mut events, |event| {
        matches!(event, EngineEvent::SeekIssued { .. })
    })
    .await;
    let fetches = harness.source.calls().len();

    harness.clock.user_seek(6.0);
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(seeks_issued(&drain(&mut events)).is_empty());
    assert_eq!(harness.source.calls().len(), fetches);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn buffered_position_issues_no_load(_tracing_setup: (), layout: ContainerLayout) {
    let mut harness = Harness::new(layout);
    let playback = play(harness.parts(), EngineOptions::default())
        .await
        .unwrap();
    let mut events = playback.events();
    wait_for(&mut events, |event| matches!(event, EngineEvent::EndOfStream)).await;
    let fetches = harness.source.calls().len();

    harness.clock.set_buffered(vec![0.0..30.0]);
    harness.clock.user_seek(3.0);
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(seeks_issued(&drain(&mut events)).is_empty());
    assert_eq!(harness.source.calls().len(), fetches);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn time_advance_rechecks_past_threshold(_tracing_setup: (), layout: ContainerLayout) {
    let mut harness = Harness::new(layout);
    let playback = play(harness.parts(), EngineOptions::default())
        .await
        .unwrap();
    let mut events = playback.events();
    wait_for(&mut events, |event| matches!(event, EngineEvent::EndOfStream)).await;
    harness.clock.set_buffered(vec![0.0..12.0]);

    // First update at 1.0 is checked and found buffered; 5.0 is within the threshold.
    harness.clock.advance_to(1.0);
    tokio::time::sleep(Duration::from_millis(1)).await;
    harness.clock.advance_to(5.0);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(seeks_issued(&drain(&mut events)).is_empty());

    // 5.0 was not evaluated: dropping the buffer does not trigger a load until
    // the next update passes the threshold.
    harness.clock.set_buffered(Vec::new());
    harness.clock.advance_to(6.0);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(seeks_issued(&drain(&mut events)).is_empty());
    harness.clock.set_buffered(vec![0.0..12.0]);

    harness.clock.advance_to(11.5);
    let issued = wait_for(&mut events, |event| {
        matches!(event, EngineEvent::SeekIssued { .. })
    })
    .await;
    assert!(matches!(
        issued,
        EngineEvent::SeekIssued { time, offset, .. }
            if time == 11.5 && offset == harness.layout.unit_offset(5)
    ));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn no_load_before_metadata(_tracing_setup: (), layout: ContainerLayout) {
    let source = MemorySource::new(layout.bytes()).gated();
    let mut harness = Harness::with(layout, source, MemoryBackend::default());
    let playback = play(harness.parts(), EngineOptions::default())
        .await
        .unwrap();
    let mut events = playback.events();

    harness.clock.user_seek(5.0);
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(seeks_issued(&drain(&mut events)).is_empty());
    assert!(harness.probe().seeks.is_empty());
}
