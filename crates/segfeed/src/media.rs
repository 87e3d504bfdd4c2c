#![forbid(unsafe_code)]

//! Contracts of the runtime media layer: buffer sinks, the session that owns
//! them, and the playback clock.

use std::{ops::Range, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::broadcast;

use crate::error::{SessionError, SinkError};

/// Resolves when a started sink operation settles (the sink goes idle).
pub type Completion = BoxFuture<'static, Result<(), SinkError>>;

/// Append-only, evictable media buffer for one track.
///
/// Operations start synchronously: a capacity rejection is reported by
/// `append` itself, while the returned [`Completion`] reports the outcome of
/// the update once the sink is idle again.
pub trait BufferSink: Send + Sync {
    fn append(&self, data: Bytes) -> Result<Completion, SinkError>;

    /// Remove buffered media in `range` (seconds).
    fn remove(&self, range: Range<f64>) -> Result<Completion, SinkError>;

    /// Abort the update in progress, if any.
    fn abort(&self);

    fn is_updating(&self) -> bool;

    /// Buffered time ranges, ordered by start.
    fn buffered(&self) -> Vec<Range<f64>>;
}

/// Readiness of the container session as reported by the media layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Closed,
    Open,
    Ended,
}

/// Container session owned by the media layer.
#[async_trait]
pub trait MediaSession: Send + Sync {
    /// Resolves once the session is open.
    async fn opened(&self);

    fn ready_state(&self) -> ReadyState;

    fn set_duration(&self, seconds: f64);

    fn add_sink(&self, mime: &str) -> Result<Arc<dyn BufferSink>, SinkError>;

    fn remove_sink(&self, sink: &Arc<dyn BufferSink>);

    /// Seal the session: no more data follows.
    fn end_of_stream(&self) -> Result<(), SessionError>;

    /// Release the playback-source handle attached to the session.
    fn release(&self);
}

/// Factory for container sessions.
pub trait MediaBackend: Send + Sync {
    /// Whether sessions can be created at all in this environment.
    fn is_available(&self) -> bool;

    fn is_type_supported(&self, mime: &str) -> bool;

    fn create_session(&self) -> Result<Arc<dyn MediaSession>, SessionError>;
}

/// Notifications emitted by a [`PlaybackClock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    SeekStarted,
    SeekCompleted,
    TimeAdvanced,
    /// Playback stalled waiting for data.
    Waiting,
}

/// The playback element observing the sinks.
pub trait PlaybackClock: Send + Sync {
    /// Current playback position in seconds.
    fn current_time(&self) -> f64;

    fn playback_rate(&self) -> f64;

    fn is_looping(&self) -> bool;

    /// Buffered ranges across all sinks, in seconds.
    fn buffered(&self) -> Vec<Range<f64>>;

    fn seek(&self, time: f64);

    fn play(&self);

    fn subscribe(&self) -> broadcast::Receiver<ClockEvent>;
}
