//! In-memory [`ByteSource`].

use std::{ops::Range, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use segfeed::{ByteSource, Chunk, FetchError};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// One recorded `fetch` call.
#[derive(Debug, Clone)]
pub struct FetchCall {
    pub range: Range<u64>,
    pub cancel: CancellationToken,
}

/// Serves byte ranges from a buffer.
///
/// A gated source holds every fetch until [`MemorySource::open_gate`] hands
/// out permits, which lets a test observe the engine mid-fetch.
pub struct MemorySource {
    data: Bytes,
    latency: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    fail_from: Option<u64>,
    calls: Mutex<Vec<FetchCall>>,
}

impl MemorySource {
    #[must_use]
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            latency: None,
            gate: None,
            fail_from: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Hold fetches until permits are released.
    #[must_use]
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Fail every fetch starting at or after `offset`.
    #[must_use]
    pub fn failing_from(mut self, offset: u64) -> Self {
        self.fail_from = Some(offset);
        self
    }

    /// Let `fetches` held fetches through.
    pub fn open_gate(&self, fetches: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(fetches);
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().clone()
    }

    pub fn ranges(&self) -> Vec<Range<u64>> {
        self.calls.lock().iter().map(|call| call.range.clone()).collect()
    }

    fn slice(&self, range: &Range<u64>) -> Chunk {
        let len = self.len();
        if range.start >= len {
            return Chunk::last(Bytes::new());
        }
        let end = range.end.min(len);
        let data = self.data.slice(range.start as usize..end as usize);
        if end == len {
            Chunk::last(data)
        } else {
            Chunk::new(data)
        }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn fetch(
        &self,
        range: Range<u64>,
        cancel: CancellationToken,
    ) -> Result<Chunk, FetchError> {
        self.calls.lock().push(FetchCall {
            range: range.clone(),
            cancel: cancel.clone(),
        });

        if let Some(gate) = &self.gate {
            tokio::select! {
                () = cancel.cancelled() => return Err(FetchError::Aborted),
                permit = gate.acquire() => match permit {
                    Ok(permit) => permit.forget(),
                    Err(_) => return Err(FetchError::Aborted),
                },
            }
        }
        if let Some(latency) = self.latency {
            tokio::select! {
                () = cancel.cancelled() => return Err(FetchError::Aborted),
                () = tokio::time::sleep(latency) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(FetchError::Aborted);
        }
        if self.fail_from.is_some_and(|offset| range.start >= offset) {
            return Err(FetchError::Failed(format!("no data at {}", range.start)));
        }
        Ok(self.slice(&range))
    }
}
