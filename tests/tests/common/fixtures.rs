use rstest::*;
use segfeed::TrackInfo;
use segfeed_test_utils::ContainerLayout;

#[fixture]
pub fn tracing_setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::default()
                .add_directive("warn".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}

#[fixture]
pub fn debug_tracing_setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::default()
                .add_directive("segfeed=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}

/// One video track, eight 2s segments.
#[fixture]
pub fn layout() -> ContainerLayout {
    ContainerLayout::default()
}

/// Interleaved video and audio, four 2s segments each.
#[fixture]
pub fn av_layout() -> ContainerLayout {
    ContainerLayout::default()
        .with_tracks(vec![
            TrackInfo::new(1, "avc1.64001f"),
            TrackInfo::new(2, "mp4a.40.2"),
        ])
        .with_segments(4)
}
