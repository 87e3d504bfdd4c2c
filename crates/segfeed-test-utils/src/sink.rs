//! Recording [`BufferSink`].

use std::{ops::Range, sync::Arc};

use bytes::Bytes;
use futures::FutureExt;
use parking_lot::Mutex;
use segfeed::{BufferSink, Completion, ReadyState, SinkError};
use tokio::sync::oneshot;

/// Behaviour of sinks created by a [`MemorySession`](crate::MemorySession).
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkConfig {
    /// Complete operations only through [`RecordingSink::complete`].
    pub manual: bool,
    /// Reject this many appends with `QuotaExceeded` before accepting.
    pub quota_failures: u32,
}

#[derive(Default)]
struct SinkState {
    appends: Vec<Bytes>,
    removals: Vec<Range<f64>>,
    buffered: Vec<Range<f64>>,
    quota_failures: u32,
    updating: bool,
    waiter: Option<oneshot::Sender<Result<(), SinkError>>>,
    /// Operations started while another was in flight.
    overlaps: u32,
    /// Every append/remove call, accepted or not.
    calls: u32,
    aborts: u32,
    removed: bool,
}

#[derive(Clone)]
pub struct RecordingSink {
    mime: String,
    manual: bool,
    state: Arc<Mutex<SinkState>>,
    ready: Arc<Mutex<ReadyState>>,
}

impl RecordingSink {
    pub(crate) fn new(mime: &str, config: SinkConfig, ready: Arc<Mutex<ReadyState>>) -> Self {
        Self {
            mime: mime.to_owned(),
            manual: config.manual,
            state: Arc::new(Mutex::new(SinkState {
                quota_failures: config.quota_failures,
                ..SinkState::default()
            })),
            ready,
        }
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn appends(&self) -> Vec<Bytes> {
        self.state.lock().appends.clone()
    }

    pub fn removals(&self) -> Vec<Range<f64>> {
        self.state.lock().removals.clone()
    }

    pub fn set_buffered(&self, ranges: Vec<Range<f64>>) {
        self.state.lock().buffered = ranges;
    }

    pub fn fail_with_quota(&self, times: u32) {
        self.state.lock().quota_failures = times;
    }

    pub fn overlaps(&self) -> u32 {
        self.state.lock().overlaps
    }

    pub fn calls(&self) -> u32 {
        self.state.lock().calls
    }

    pub fn aborts(&self) -> u32 {
        self.state.lock().aborts
    }

    pub fn is_removed(&self) -> bool {
        self.state.lock().removed
    }

    pub(crate) fn mark_removed(&self) {
        self.state.lock().removed = true;
    }

    /// Settle the operation in flight (manual mode). Returns false when idle.
    pub fn complete(&self, result: Result<(), SinkError>) -> bool {
        let waiter = {
            let mut state = self.state.lock();
            state.updating = false;
            state.waiter.take()
        };
        match waiter {
            Some(waiter) => waiter.send(result).is_ok(),
            None => false,
        }
    }

    fn admit(&self, state: &mut SinkState) -> Result<(), SinkError> {
        state.calls += 1;
        {
            let mut ready = self.ready.lock();
            match *ready {
                ReadyState::Closed => return Err(SinkError::SessionClosed),
                ReadyState::Ended => *ready = ReadyState::Open,
                ReadyState::Open => {}
            }
        }
        if state.removed {
            return Err(SinkError::SessionClosed);
        }
        if state.updating {
            state.overlaps += 1;
            return Err(SinkError::Rejected("operation already in progress".into()));
        }
        Ok(())
    }

    fn start(&self, state: &mut SinkState) -> Completion {
        state.updating = true;
        if self.manual {
            let (tx, rx) = oneshot::channel();
            state.waiter = Some(tx);
            return async move { rx.await.unwrap_or(Err(SinkError::Aborted)) }.boxed();
        }
        let shared = Arc::clone(&self.state);
        async move {
            tokio::task::yield_now().await;
            shared.lock().updating = false;
            Ok(())
        }
        .boxed()
    }
}

impl BufferSink for RecordingSink {
    fn append(&self, data: Bytes) -> Result<Completion, SinkError> {
        let mut state = self.state.lock();
        self.admit(&mut state)?;
        if state.quota_failures > 0 {
            state.quota_failures -= 1;
            return Err(SinkError::QuotaExceeded);
        }
        state.appends.push(data);
        Ok(self.start(&mut state))
    }

    fn remove(&self, range: Range<f64>) -> Result<Completion, SinkError> {
        let mut state = self.state.lock();
        self.admit(&mut state)?;
        state
            .buffered
            .retain(|buffered| !(buffered.start >= range.start && buffered.end <= range.end));
        state.removals.push(range);
        Ok(self.start(&mut state))
    }

    fn abort(&self) {
        let waiter = {
            let mut state = self.state.lock();
            state.aborts += 1;
            state.updating = false;
            state.waiter.take()
        };
        if let Some(waiter) = waiter {
            let _ = waiter.send(Err(SinkError::Aborted));
        }
    }

    fn is_updating(&self) -> bool {
        self.state.lock().updating
    }

    fn buffered(&self) -> Vec<Range<f64>> {
        self.state.lock().buffered.clone()
    }
}
