//! `segfeed`
//!
//! Adaptive segment-streaming buffer engine.
//!
//! ## Design goals
//! - `SegmentLoader`: range-chained loading driven by demuxer offset requests
//! - buffer sinks fed one operation at a time per track, pruned behind playback
//! - `SeekCoordinator`: clock-driven loads for uncovered positions
//! - `Playback`: session lifecycle with idempotent teardown

#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod backoff;
mod buffer;
mod demux;
mod engine;
mod error;
mod events;
mod loader;
mod logger;
mod media;
mod options;
mod request;
mod seek;
mod session;
mod source;
mod track;

pub use backoff::QuotaBackoff;
pub use buffer::stale_range;
pub use demux::{DemuxEvent, Demuxer, InitSegment, MovieInfo, Segment, TrackId, TrackInfo};
pub use engine::{Playback, PlaybackParts, Teardown, play};
pub use error::{EngineError, EngineResult, FetchError, SessionError, SinkError};
pub use events::{EngineEvent, EventBus};
pub use loader::{LoadOutcome, SegmentLoader};
pub use logger::Logger;
pub use media::{
    BufferSink, ClockEvent, Completion, MediaBackend, MediaSession, PlaybackClock, ReadyState,
};
pub use options::{EndOfStreamFinalizer, EngineOptions};
pub use request::{LoadRequest, RequestId, RequestTracker};
pub use seek::{is_buffered_ahead, scaled_window};
pub use session::{LifecycleState, SessionHandle};
pub use source::{ByteSource, Chunk};
