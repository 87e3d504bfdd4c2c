#![forbid(unsafe_code)]

//! Per-track append queues feeding the buffer sinks.
//!
//! Each track has at most one sink operation in flight. Queued entries are
//! appended in FIFO order, init payloads first. When an operation settles the
//! track is, in order: pruned behind the retention window, credited with the
//! completed segment, and flushed.

use std::{ops::Range, sync::Arc, time::Duration};

use tracing::{debug, trace, warn};

use crate::{
    demux::{Segment, TrackId},
    engine::{Shared, State},
    error::SinkError,
    events::EngineEvent,
    media::{Completion, ReadyState},
    request::RequestId,
    session::LifecycleState,
    track::{InFlight, Pending},
};

/// First buffered range lying entirely more than `retention` behind `now`.
pub fn stale_range(buffered: &[Range<f64>], now: f64, retention: Duration) -> Option<Range<f64>> {
    let horizon = now - retention.as_secs_f64();
    buffered.iter().find(|range| range.end < horizon).cloned()
}

/// Work deferred until the state lock is released.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    pub(crate) end_of_stream: bool,
    pub(crate) resume: bool,
    pub(crate) retries: Vec<TrackId>,
}

impl Effects {
    pub(crate) fn apply(self, shared: &Arc<Shared>) {
        for track in self.retries {
            shared.schedule_retry(track);
        }
        if shared.is_torn_down() {
            return;
        }
        if self.resume {
            shared.clock.play();
        }
        if self.end_of_stream {
            shared.finalize_end_of_stream();
        }
    }
}

impl Shared {
    /// Queue a demuxed segment on its track and start it if the sink is idle.
    pub(crate) fn enqueue(
        self: &Arc<Self>,
        state: &mut State,
        request: RequestId,
        segment: Segment,
        fx: &mut Effects,
    ) {
        let track_id = segment.track;
        let Some(track) = state.session.tracks.get_mut(&track_id) else {
            trace!(track = track_id, "segment for track without sink");
            state
                .demuxer
                .release_samples(track_id, segment.sample_count);
            return;
        };
        let index = track.push(request, segment);
        trace!(track = track_id, index, queued = track.queued(), "segment queued");
        self.flush_when_idle(state, track_id, fx);
    }

    /// Start the next queued append if the track is idle.
    ///
    /// Segments of superseded requests are released and skipped.
    pub(crate) fn flush_when_idle(
        self: &Arc<Self>,
        state: &mut State,
        track_id: TrackId,
        fx: &mut Effects,
    ) {
        if self.is_torn_down() || !state.session.accepts_appends() {
            return;
        }
        let current = state.requests.current();
        let State {
            session,
            demuxer,
            lifecycle,
            ..
        } = state;
        let Some(track) = session.tracks.get_mut(&track_id) else {
            return;
        };
        if !track.is_idle() {
            return;
        }

        while let Some(pending) = track.pop() {
            if let Pending::Media {
                request, segment, ..
            } = &pending
            {
                if *request != current {
                    trace!(track = track_id, request = %request, "dropping stale segment");
                    demuxer.release_samples(track_id, segment.sample_count);
                    self.events.publish(EngineEvent::SegmentDropped {
                        track: track_id,
                        request: *request,
                    });
                    continue;
                }
            }

            match track.sink.append(pending.payload()) {
                Ok(completion) => {
                    if pending.sample_count().is_some() && *lifecycle == LifecycleState::Ended {
                        *lifecycle = LifecycleState::Ready;
                    }
                    let seq = track.begin(InFlight::Append(pending));
                    self.watch(track_id, seq, completion);
                    return;
                }
                Err(SinkError::QuotaExceeded) => {
                    track.push_front(pending);
                    track.enter_backoff();
                    fx.retries.push(track_id);
                    return;
                }
                Err(SinkError::SessionClosed) => {
                    if let Some(samples) = pending.sample_count() {
                        demuxer.release_samples(track_id, samples);
                    }
                    trace!(track = track_id, "session closed, append dropped");
                    return;
                }
                Err(error) => {
                    if let Some(samples) = pending.sample_count() {
                        demuxer.release_samples(track_id, samples);
                    }
                    warn!(track = track_id, %error, "append rejected, entry dropped");
                }
            }
        }
    }

    /// Start removing the first buffered range behind the retention window.
    ///
    /// Returns true when a removal was started.
    pub(crate) fn evict(self: &Arc<Self>, state: &mut State, track_id: TrackId, now: f64) -> bool {
        if state.session.ready_state() != ReadyState::Open {
            return false;
        }
        let Some(track) = state.session.tracks.get_mut(&track_id) else {
            return false;
        };
        if !track.is_idle() {
            return false;
        }
        let buffered = track.sink.buffered();
        let Some(range) = stale_range(&buffered, now, self.options.retention_window) else {
            return false;
        };
        match track.sink.remove(range.clone()) {
            Ok(completion) => {
                let seq = track.begin(InFlight::Removal(range.clone()));
                self.watch(track_id, seq, completion);
                debug!(track = track_id, start = range.start, end = range.end, now, "evicting");
                self.events.publish(EngineEvent::Evicted {
                    track: track_id,
                    start: range.start,
                    end: range.end,
                });
                true
            }
            Err(error) => {
                trace!(track = track_id, %error, "eviction not started");
                false
            }
        }
    }

    fn watch(self: &Arc<Self>, track: TrackId, seq: u64, completion: Completion) {
        let shared = Arc::clone(self);
        self.spawn(async move {
            let result = completion.await;
            shared.on_settled(track, seq, result);
        });
    }

    fn on_settled(self: &Arc<Self>, track_id: TrackId, seq: u64, result: Result<(), SinkError>) {
        let mut fx = Effects::default();
        {
            let mut state = self.state.lock();
            if self.is_torn_down() {
                return;
            }
            let state = &mut *state;
            let Some(track) = state.session.tracks.get_mut(&track_id) else {
                return;
            };
            let Some(op) = track.settle(seq) else {
                return;
            };
            match result {
                Ok(()) => self.on_idle(state, track_id, op, &mut fx),
                Err(SinkError::QuotaExceeded) => {
                    if let InFlight::Append(pending) = op {
                        track.push_front(pending);
                    }
                    track.enter_backoff();
                    fx.retries.push(track_id);
                }
                Err(error) => {
                    if let InFlight::Append(pending) = &op {
                        if let Some(samples) = pending.sample_count() {
                            state.demuxer.release_samples(track_id, samples);
                        }
                    }
                    match error {
                        SinkError::SessionClosed | SinkError::Aborted => {
                            trace!(track = track_id, %error, "sink operation ended");
                        }
                        _ => {
                            warn!(track = track_id, %error, "sink operation failed");
                            self.flush_when_idle(state, track_id, &mut fx);
                        }
                    }
                }
            }
        }
        fx.apply(self);
    }

    fn on_idle(self: &Arc<Self>, state: &mut State, track_id: TrackId, completed: InFlight, fx: &mut Effects) {
        if !completed.is_init() {
            let now = self.clock.current_time();
            self.evict(state, track_id, now);
        }

        match completed {
            InFlight::Append(Pending::Init(_)) => {
                debug!(track = track_id, "init segment appended");
                self.events
                    .publish(EngineEvent::InitAppended { track: track_id });
            }
            InFlight::Append(Pending::Media {
                request,
                index,
                segment,
            }) => {
                state
                    .demuxer
                    .release_samples(track_id, segment.sample_count);
                if let Some(track) = state.session.tracks.get_mut(&track_id) {
                    track.quota_attempts = 0;
                    track.last_appended = segment.is_last;
                }
                trace!(
                    track = track_id,
                    request = %request,
                    index,
                    bytes = segment.payload.len(),
                    "segment appended"
                );
                self.events.publish(EngineEvent::SegmentAppended {
                    track: track_id,
                    request,
                    segment_index: index,
                    bytes: segment.payload.len(),
                    sample_count: segment.sample_count,
                });

                if state.resume_on_append {
                    state.resume_on_append = false;
                    fx.resume = true;
                }
                if segment.is_last && state.session.tracks.values().all(|t| t.last_appended) {
                    debug!("last segment of every track appended");
                    self.events.publish(EngineEvent::EndOfStream);
                    fx.end_of_stream = true;
                }
            }
            InFlight::Removal(range) => {
                trace!(track = track_id, start = range.start, end = range.end, "removal done");
            }
        }

        self.flush_when_idle(state, track_id, fx);
    }
}
