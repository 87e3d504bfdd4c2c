#![forbid(unsafe_code)]

use std::{fmt, sync::Arc, time::Duration};

use crate::{logger::Logger, session::SessionHandle};

/// Called when the last segment of a track has been appended.
///
/// The finalizer decides whether to seal the session. A user may still seek
/// backwards after the end, so sealing is not done unconditionally.
pub type EndOfStreamFinalizer = Arc<dyn Fn(&SessionHandle) + Send + Sync>;

/// Engine configuration.
///
/// Time windows given "at rate 1" are scaled by the playback rate and rounded
/// up to whole seconds when evaluated.
#[derive(Clone)]
pub struct EngineOptions {
    /// Size of each follow-up range requested from the byte source.
    pub fetch_size: u64,
    /// End of the first range fetched from offset 0.
    pub initial_range_end: u64,
    /// Deepest follow-up step a single load chain may take.
    pub max_depth: u32,
    /// Samples grouped into one media segment by the demuxer.
    pub samples_per_segment: u32,
    /// Buffered media kept behind the playback position.
    pub retention_window: Duration,
    /// Buffered media required ahead of the playback position (at rate 1).
    pub lookahead_margin: Duration,
    /// Playback advance that triggers a buffering re-check (at rate 1).
    pub time_update_threshold: Duration,
    /// Window collapsing seek notifications of one gesture.
    pub seek_debounce: Duration,
    /// Delay before retrying an append rejected for capacity.
    pub quota_retry_delay: Duration,
    pub session_open_timeout: Duration,
    /// Distance from the end at which playback counts as finished for looping.
    pub tail_tolerance: Duration,
    pub events_channel_capacity: usize,
    pub end_of_stream: EndOfStreamFinalizer,
    pub logger: Logger,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            fetch_size: 1_000_000,
            initial_range_end: 999_999,
            max_depth: 64,
            samples_per_segment: 10,
            retention_window: Duration::from_secs(5),
            lookahead_margin: Duration::from_secs(11),
            time_update_threshold: Duration::from_secs(10),
            seek_debounce: Duration::from_millis(100),
            quota_retry_delay: Duration::from_secs(1),
            session_open_timeout: Duration::from_secs(10),
            tail_tolerance: Duration::from_millis(500),
            events_channel_capacity: 64,
            end_of_stream: Arc::new(|session: &SessionHandle| {
                let _ = session.seal();
            }),
            logger: Logger::default(),
        }
    }
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("fetch_size", &self.fetch_size)
            .field("initial_range_end", &self.initial_range_end)
            .field("max_depth", &self.max_depth)
            .field("samples_per_segment", &self.samples_per_segment)
            .field("retention_window", &self.retention_window)
            .field("lookahead_margin", &self.lookahead_margin)
            .field("time_update_threshold", &self.time_update_threshold)
            .field("seek_debounce", &self.seek_debounce)
            .field("quota_retry_delay", &self.quota_retry_delay)
            .field("session_open_timeout", &self.session_open_timeout)
            .field("tail_tolerance", &self.tail_tolerance)
            .field("events_channel_capacity", &self.events_channel_capacity)
            .field("end_of_stream", &"EndOfStreamFinalizer")
            .field("logger", &self.logger)
            .finish()
    }
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fetch_size(mut self, bytes: u64) -> Self {
        self.fetch_size = bytes;
        self
    }

    pub fn with_initial_range_end(mut self, end: u64) -> Self {
        self.initial_range_end = end;
        self
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_samples_per_segment(mut self, samples: u32) -> Self {
        self.samples_per_segment = samples;
        self
    }

    pub fn with_retention_window(mut self, window: Duration) -> Self {
        self.retention_window = window;
        self
    }

    pub fn with_lookahead_margin(mut self, margin: Duration) -> Self {
        self.lookahead_margin = margin;
        self
    }

    pub fn with_time_update_threshold(mut self, threshold: Duration) -> Self {
        self.time_update_threshold = threshold;
        self
    }

    pub fn with_seek_debounce(mut self, window: Duration) -> Self {
        self.seek_debounce = window;
        self
    }

    pub fn with_quota_retry_delay(mut self, delay: Duration) -> Self {
        self.quota_retry_delay = delay;
        self
    }

    pub fn with_session_open_timeout(mut self, timeout: Duration) -> Self {
        self.session_open_timeout = timeout;
        self
    }

    pub fn with_tail_tolerance(mut self, tolerance: Duration) -> Self {
        self.tail_tolerance = tolerance;
        self
    }

    pub fn with_events_channel_capacity(mut self, capacity: usize) -> Self {
        self.events_channel_capacity = capacity;
        self
    }

    /// Replace the default finalizer, which seals the session.
    pub fn with_end_of_stream(mut self, finalizer: EndOfStreamFinalizer) -> Self {
        self.end_of_stream = finalizer;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }
}
