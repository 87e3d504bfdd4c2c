#![forbid(unsafe_code)]

//! Contract of the container demuxer consumed by the engine.
//!
//! The demuxer is a push parser: the loader feeds it byte ranges tagged with
//! their absolute offset and then drains [`DemuxEvent`]s until none are left.
//! Events are pulled one at a time so that track setup triggered by
//! [`DemuxEvent::Ready`] happens before any segment of that track is produced.

use bytes::Bytes;

/// Elementary stream identifier assigned by the container.
pub type TrackId = u32;

/// Track metadata discovered in the container header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: TrackId,
    /// RFC 6381 codec string, e.g. `avc1.64001f`.
    pub codec: String,
}

impl TrackInfo {
    pub fn new(id: TrackId, codec: impl Into<String>) -> Self {
        Self {
            id,
            codec: codec.into(),
        }
    }

    /// MIME type used to probe and create the track's sink.
    pub fn mime(&self) -> String {
        format!("video/mp4; codecs=\"{}\"", self.codec)
    }
}

/// Container-level metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieInfo {
    /// Duration in `timescale` units.
    pub duration: u64,
    pub timescale: u32,
    /// Set for fragmented containers; takes precedence over `duration`.
    pub fragment_duration: Option<u64>,
    pub tracks: Vec<TrackInfo>,
}

impl MovieInfo {
    /// Presentation duration in seconds.
    pub fn presentation_duration(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        let units = self.fragment_duration.unwrap_or(self.duration);
        units as f64 / f64::from(self.timescale)
    }
}

/// A demuxed, independently appendable chunk of one track's media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub track: TrackId,
    pub payload: Bytes,
    /// Samples the demuxer retains until [`Demuxer::release_samples`].
    pub sample_count: u32,
    pub is_last: bool,
}

/// Per-track initialization payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitSegment {
    pub track: TrackId,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DemuxEvent {
    /// Container metadata parsed; tracks discovered.
    Ready(MovieInfo),
    Segment(Segment),
}

/// Stream-oriented container parser.
pub trait Demuxer: Send {
    /// Feed bytes starting at absolute `offset`.
    ///
    /// Returns the next byte offset the parser wants, or `None` when it has
    /// nothing further to request. An empty `data` with `is_final` signals end
    /// of input.
    fn feed(&mut self, data: Bytes, offset: u64, is_final: bool) -> Option<u64>;

    /// Next pending event produced by previous feeds.
    fn poll_event(&mut self) -> Option<DemuxEvent>;

    /// Enable segmentation for a track, grouping `samples_per_segment` samples.
    fn configure_track(&mut self, track: TrackId, samples_per_segment: u32);

    /// Initialization payloads for every configured track.
    fn initialization_segments(&mut self) -> Vec<InitSegment>;

    /// Give back samples of a consumed segment.
    fn release_samples(&mut self, track: TrackId, count: u32);

    /// Byte offset of the random access point at or before `time` (seconds).
    ///
    /// Repositions the parser; subsequent feeds are expected from that offset.
    fn resolve_seek_offset(&mut self, time: f64) -> u64;

    /// Drop all buffered state.
    fn discard(&mut self);
}
