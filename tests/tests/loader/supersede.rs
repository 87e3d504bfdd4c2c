use rstest::rstest;
use segfeed::{EngineOptions, LoadOutcome, Playback};
use segfeed_test_utils::{ContainerLayout, MemoryBackend, MemorySource};

use crate::common::{Harness, eventually, layout, tracing_setup};

fn gated(layout: ContainerLayout) -> Harness {
    let source = MemorySource::new(layout.bytes()).gated();
    Harness::with(layout, source, MemoryBackend::default())
}

#[rstest]
#[tokio::test]
async fn newer_request_aborts_fetch_in_flight(_tracing_setup: (), layout: ContainerLayout) {
    let mut harness = gated(layout);
    let playback = Playback::open(harness.parts(), EngineOptions::default())
        .await
        .unwrap();
    let loader = playback.loader();

    let first = tokio::spawn({
        let loader = loader.clone();
        async move { loader.load_segment(0..100, None, 0).await }
    });
    eventually(|| harness.source.calls().len() == 1).await;

    let second = loader.start(0..100).unwrap();

    assert_eq!(first.await.unwrap().unwrap(), LoadOutcome::Cancelled);
    assert!(harness.source.calls()[0].cancel.is_cancelled());
    eventually(|| harness.source.calls().len() == 2).await;
    assert!(!harness.source.calls()[1].cancel.is_cancelled());
    assert!(second.get() > 0);
}

#[rstest]
#[tokio::test]
async fn stale_request_id_never_fetches(_tracing_setup: (), layout: ContainerLayout) {
    let mut harness = gated(layout);
    let playback = Playback::open(harness.parts(), EngineOptions::default())
        .await
        .unwrap();
    let loader = playback.loader();

    let stale = loader.start(0..100);
    let current = loader.start(0..100);
    assert!(current > stale);

    let outcome = loader.load_segment(0..100, stale, 0).await.unwrap();

    assert_eq!(outcome, LoadOutcome::Cancelled);
    assert!(harness.source.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn superseded_chain_feeds_nothing(_tracing_setup: (), layout: ContainerLayout) {
    let mut harness = gated(layout);
    let playback = Playback::open(harness.parts(), EngineOptions::default())
        .await
        .unwrap();
    let loader = playback.loader();

    loader.start(0..100);
    eventually(|| harness.source.calls().len() == 1).await;
    loader.start(5_000..5_100);
    eventually(|| harness.source.calls().len() == 2).await;
    harness.source.open_gate(2);
    eventually(|| !harness.probe().feeds.is_empty()).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let feeds = harness.probe().feeds;
    assert!(feeds.iter().all(|feed| feed.offset == 5_000));
}
