#![forbid(unsafe_code)]

use std::time::Duration;

use tokio::sync::broadcast;

use crate::{demux::TrackId, loader::LoadOutcome, request::RequestId};

#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    SessionOpened,
    Ready {
        duration: f64,
        tracks: Vec<TrackId>,
    },
    LoadStarted {
        request: RequestId,
        start: u64,
        end: u64,
        depth: u32,
    },
    LoadFinished {
        request: RequestId,
        outcome: LoadOutcome,
    },
    InitAppended {
        track: TrackId,
    },
    SegmentAppended {
        track: TrackId,
        request: RequestId,
        segment_index: u64,
        bytes: usize,
        sample_count: u32,
    },
    /// A queued segment of a superseded request was discarded.
    SegmentDropped {
        track: TrackId,
        request: RequestId,
    },
    Evicted {
        track: TrackId,
        start: f64,
        end: f64,
    },
    QuotaExceeded {
        track: TrackId,
        attempt: u32,
        retry_in: Duration,
    },
    EndOfStream,
    SeekIssued {
        time: f64,
        offset: u64,
        request: RequestId,
    },
    LoopRestart,
    TornDown,
}

/// Broadcast bus for [`EngineEvent`]s.
///
/// Publishing is a sync call and never blocks; without subscribers events are
/// dropped. Slow subscribers observe `RecvError::Lagged`.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}
