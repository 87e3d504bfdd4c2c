//! In-memory [`MediaBackend`] and [`MediaSession`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use segfeed::{BufferSink, MediaBackend, MediaSession, ReadyState, SessionError, SinkError};

use crate::sink::{RecordingSink, SinkConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    #[default]
    Immediate,
    /// `opened` never resolves.
    Never,
}

pub struct MemoryBackend {
    available: bool,
    codecs: Vec<String>,
    open: OpenMode,
    sink: SinkConfig,
    sessions: Mutex<Vec<Arc<MemorySession>>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            available: true,
            codecs: vec!["avc1".into(), "mp4a".into()],
            open: OpenMode::Immediate,
            sink: SinkConfig::default(),
            sessions: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::default()
        }
    }

    /// Codec prefixes reported as playable.
    #[must_use]
    pub fn with_codecs(mut self, codecs: &[&str]) -> Self {
        self.codecs = codecs.iter().map(|codec| (*codec).to_owned()).collect();
        self
    }

    #[must_use]
    pub fn with_open_mode(mut self, open: OpenMode) -> Self {
        self.open = open;
        self
    }

    #[must_use]
    pub fn with_sinks(mut self, sink: SinkConfig) -> Self {
        self.sink = sink;
        self
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions.lock().len()
    }

    /// The most recently created session.
    pub fn session(&self) -> Option<Arc<MemorySession>> {
        self.sessions.lock().last().cloned()
    }
}

impl MediaBackend for MemoryBackend {
    fn is_available(&self) -> bool {
        self.available
    }

    fn is_type_supported(&self, mime: &str) -> bool {
        self.codecs
            .iter()
            .any(|codec| mime.contains(&format!("codecs=\"{codec}")))
    }

    fn create_session(&self) -> Result<Arc<dyn MediaSession>, SessionError> {
        let session = Arc::new(MemorySession::new(self.open, self.sink));
        self.sessions.lock().push(Arc::clone(&session));
        Ok(session)
    }
}

pub struct MemorySession {
    open: OpenMode,
    sink: SinkConfig,
    ready: Arc<Mutex<ReadyState>>,
    duration: Mutex<Option<f64>>,
    sinks: Mutex<Vec<(RecordingSink, Arc<dyn BufferSink>)>>,
    end_of_stream_calls: Mutex<u32>,
    released: Mutex<bool>,
}

impl MemorySession {
    fn new(open: OpenMode, sink: SinkConfig) -> Self {
        Self {
            open,
            sink,
            ready: Arc::new(Mutex::new(ReadyState::Closed)),
            duration: Mutex::new(None),
            sinks: Mutex::new(Vec::new()),
            end_of_stream_calls: Mutex::new(0),
            released: Mutex::new(false),
        }
    }

    pub fn sinks(&self) -> Vec<RecordingSink> {
        self.sinks.lock().iter().map(|(sink, _)| sink.clone()).collect()
    }

    pub fn sink(&self, index: usize) -> Option<RecordingSink> {
        self.sinks.lock().get(index).map(|(sink, _)| sink.clone())
    }

    pub fn duration(&self) -> Option<f64> {
        *self.duration.lock()
    }

    pub fn end_of_stream_calls(&self) -> u32 {
        *self.end_of_stream_calls.lock()
    }

    pub fn is_released(&self) -> bool {
        *self.released.lock()
    }

    fn mark_open(&self) {
        let mut ready = self.ready.lock();
        if *ready == ReadyState::Closed && !*self.released.lock() {
            *ready = ReadyState::Open;
        }
    }

    /// Total append/remove calls across every sink.
    pub fn sink_calls(&self) -> u32 {
        self.sinks.lock().iter().map(|(sink, _)| sink.calls()).sum()
    }
}

#[async_trait]
impl MediaSession for MemorySession {
    async fn opened(&self) {
        match self.open {
            OpenMode::Immediate => self.mark_open(),
            OpenMode::Never => std::future::pending::<()>().await,
        }
    }

    fn ready_state(&self) -> ReadyState {
        *self.ready.lock()
    }

    fn set_duration(&self, seconds: f64) {
        *self.duration.lock() = Some(seconds);
    }

    fn add_sink(&self, mime: &str) -> Result<Arc<dyn BufferSink>, SinkError> {
        if *self.ready.lock() != ReadyState::Open {
            return Err(SinkError::SessionClosed);
        }
        let sink = RecordingSink::new(mime, self.sink, Arc::clone(&self.ready));
        let handle: Arc<dyn BufferSink> = Arc::new(sink.clone());
        self.sinks.lock().push((sink, Arc::clone(&handle)));
        Ok(handle)
    }

    fn remove_sink(&self, sink: &Arc<dyn BufferSink>) {
        let target = Arc::as_ptr(sink).cast::<()>();
        let sinks = self.sinks.lock();
        if let Some((found, _)) = sinks
            .iter()
            .find(|(_, handle)| Arc::as_ptr(handle).cast::<()>() == target)
        {
            found.mark_removed();
        }
    }

    fn end_of_stream(&self) -> Result<(), SessionError> {
        if self.sinks.lock().iter().any(|(sink, _)| sink.is_updating()) {
            return Err(SessionError::InvalidState("sink updating".into()));
        }
        let mut ready = self.ready.lock();
        if *ready != ReadyState::Open {
            return Err(SessionError::InvalidState(format!("{:?}", *ready)));
        }
        *ready = ReadyState::Ended;
        *self.end_of_stream_calls.lock() += 1;
        Ok(())
    }

    fn release(&self) {
        *self.released.lock() = true;
        *self.ready.lock() = ReadyState::Closed;
    }
}
