use rstest::rstest;
use segfeed::{EngineEvent, EngineOptions, TrackInfo, play};
use segfeed_test_utils::{ContainerLayout, MemoryBackend, MemorySource, unit_index};

use crate::common::{Harness, av_layout, eventually, tracing_setup, wait_for};

#[rstest]
#[tokio::test]
async fn init_precedes_media_in_container_order(_tracing_setup: (), av_layout: ContainerLayout) {
    let mut harness = Harness::new(av_layout);
    let playback = play(harness.parts(), EngineOptions::default())
        .await
        .unwrap();
    let mut events = playback.events();

    wait_for(&mut events, |event| matches!(event, EngineEvent::EndOfStream)).await;

    let session = harness.session();
    let sinks = session.sinks();
    assert_eq!(sinks.len(), 2);
    for (track, sink) in [1u32, 2].into_iter().zip(&sinks) {
        let appends = sink.appends();
        assert_eq!(appends[0], format!("init-{track}").as_bytes());
        let units: Vec<u64> = appends[1..]
            .iter()
            .map(|payload| unit_index(payload).unwrap())
            .collect();
        let expected: Vec<u64> = (0..4).map(|n| n * 2 + u64::from(track - 1)).collect();
        assert_eq!(units, expected);
        assert_eq!(sink.overlaps(), 0);
    }
    assert_eq!(harness.probe().outstanding(), 0);
}

#[rstest]
#[tokio::test]
async fn segment_events_carry_running_index(_tracing_setup: (), av_layout: ContainerLayout) {
    let mut harness = Harness::new(av_layout);
    let playback = play(harness.parts(), EngineOptions::default())
        .await
        .unwrap();
    let mut events = playback.events();

    let mut indices = Vec::new();
    while indices.len() < 4 {
        if let EngineEvent::SegmentAppended {
            track: 1,
            segment_index,
            sample_count,
            ..
        } = wait_for(&mut events, |event| {
            matches!(event, EngineEvent::SegmentAppended { track: 1, .. })
        })
        .await
        {
            assert_eq!(sample_count, 10);
            indices.push(segment_index);
        }
    }
    assert_eq!(indices, vec![1, 2, 3, 4]);
}

#[rstest]
#[tokio::test]
async fn unsupported_codec_track_is_skipped(_tracing_setup: ()) {
    let layout = ContainerLayout::default()
        .with_tracks(vec![
            TrackInfo::new(1, "avc1.64001f"),
            TrackInfo::new(2, "ac-3"),
        ])
        .with_segments(2);
    let source = MemorySource::new(layout.bytes());
    let mut harness = Harness::with(layout, source, MemoryBackend::default().with_codecs(&["avc1"]));
    let playback = play(harness.parts(), EngineOptions::default())
        .await
        .unwrap();
    let mut events = playback.events();

    let ready = wait_for(&mut events, |event| matches!(event, EngineEvent::Ready { .. })).await;
    assert_eq!(
        ready,
        EngineEvent::Ready {
            duration: 4.0,
            tracks: vec![1],
        }
    );
    wait_for(&mut events, |event| matches!(event, EngineEvent::EndOfStream)).await;
    assert_eq!(harness.session().sinks().len(), 1);
    assert_eq!(harness.probe().configured, vec![(1, 10)]);
    assert_eq!(playback.session().track_ids(), vec![1]);
    assert_eq!(
        playback.session().codecs(),
        vec![(1, "avc1.64001f".to_owned())]
    );
}

#[rstest]
#[tokio::test]
async fn session_duration_is_set_from_metadata(_tracing_setup: (), av_layout: ContainerLayout) {
    let mut harness = Harness::new(av_layout);
    let playback = play(harness.parts(), EngineOptions::default())
        .await
        .unwrap();

    eventually(|| playback.session().duration().is_some()).await;

    assert_eq!(playback.session().duration(), Some(8.0));
    assert_eq!(harness.session().duration(), Some(8.0));
}
