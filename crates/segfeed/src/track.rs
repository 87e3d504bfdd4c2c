#![forbid(unsafe_code)]

//! Per-track sink state machine.
//!
//! A track is `Idle`, `Busy` with exactly one sink operation, or in `Backoff`
//! after a capacity rejection. Every transition happens through the methods
//! below; the sink handle itself is never annotated.

use std::{collections::VecDeque, ops::Range, sync::Arc};

use bytes::Bytes;

use crate::{
    demux::{Segment, TrackId},
    media::BufferSink,
    request::RequestId,
};

/// A queued append.
#[derive(Debug, Clone)]
pub(crate) enum Pending {
    Init(Bytes),
    Media {
        request: RequestId,
        index: u64,
        segment: Segment,
    },
}

impl Pending {
    pub(crate) fn payload(&self) -> Bytes {
        match self {
            Self::Init(payload) => payload.clone(),
            Self::Media { segment, .. } => segment.payload.clone(),
        }
    }

    /// Samples to hand back to the demuxer once this entry is consumed.
    pub(crate) fn sample_count(&self) -> Option<u32> {
        match self {
            Self::Init(_) => None,
            Self::Media { segment, .. } => Some(segment.sample_count),
        }
    }
}

/// The sink operation in progress.
#[derive(Debug, Clone)]
pub(crate) enum InFlight {
    Append(Pending),
    Removal(Range<f64>),
}

impl InFlight {
    pub(crate) fn is_init(&self) -> bool {
        matches!(self, Self::Append(Pending::Init(_)))
    }
}

#[derive(Debug)]
enum Phase {
    Idle,
    Busy { seq: u64, op: InFlight },
    Backoff,
}

pub(crate) struct Track {
    pub(crate) id: TrackId,
    pub(crate) codec: String,
    pub(crate) sink: Arc<dyn BufferSink>,
    queue: VecDeque<Pending>,
    phase: Phase,
    seq: u64,
    /// Media segments received so far.
    pub(crate) segment_index: u64,
    pub(crate) last_appended: bool,
    /// Consecutive capacity rejections.
    pub(crate) quota_attempts: u32,
}

impl Track {
    pub(crate) fn new(id: TrackId, codec: String, sink: Arc<dyn BufferSink>) -> Self {
        Self {
            id,
            codec,
            sink,
            queue: VecDeque::new(),
            phase: Phase::Idle,
            seq: 0,
            segment_index: 0,
            last_appended: false,
            quota_attempts: 0,
        }
    }

    pub(crate) fn push_init(&mut self, payload: Bytes) {
        self.queue.push_back(Pending::Init(payload));
    }

    pub(crate) fn push(&mut self, request: RequestId, segment: Segment) -> u64 {
        self.segment_index += 1;
        let index = self.segment_index;
        self.queue.push_back(Pending::Media {
            request,
            index,
            segment,
        });
        index
    }

    /// Put a rejected entry back at the head of the queue.
    pub(crate) fn push_front(&mut self, pending: Pending) {
        self.queue.push_front(pending);
    }

    pub(crate) fn pop(&mut self) -> Option<Pending> {
        self.queue.pop_front()
    }

    pub(crate) fn queued(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    pub(crate) fn in_backoff(&self) -> bool {
        matches!(self.phase, Phase::Backoff)
    }

    /// Idle -> Busy. Returns the sequence number the completion must present.
    pub(crate) fn begin(&mut self, op: InFlight) -> u64 {
        debug_assert!(self.is_idle(), "track {} already busy", self.id);
        self.seq += 1;
        self.phase = Phase::Busy { seq: self.seq, op };
        self.seq
    }

    /// Busy -> Idle for the operation identified by `seq`.
    ///
    /// Returns `None` for completions that no longer match (the operation was
    /// taken by teardown, or the track moved on).
    pub(crate) fn settle(&mut self, seq: u64) -> Option<InFlight> {
        match &self.phase {
            Phase::Busy { seq: current, .. } if *current == seq => {}
            _ => return None,
        }
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Busy { op, .. } => Some(op),
            _ => None,
        }
    }

    /// Idle -> Backoff.
    pub(crate) fn enter_backoff(&mut self) {
        self.quota_attempts += 1;
        self.phase = Phase::Backoff;
    }

    /// Backoff -> Idle. Returns false when the track was not backing off.
    pub(crate) fn leave_backoff(&mut self) -> bool {
        if !self.in_backoff() {
            return false;
        }
        self.phase = Phase::Idle;
        true
    }

    /// Take the in-flight operation regardless of its sequence (teardown).
    pub(crate) fn take_in_flight(&mut self) -> Option<InFlight> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Busy { op, .. } => Some(op),
            _ => None,
        }
    }
}
