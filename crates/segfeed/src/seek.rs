#![forbid(unsafe_code)]

//! Reacts to playback-clock activity by deciding whether data must be loaded
//! for the current position.

use std::{ops::Range, sync::Arc, time::Duration};

use tokio::{
    sync::broadcast::{self, error::RecvError},
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    engine::Shared,
    events::EngineEvent,
    loader::SegmentLoader,
    media::ClockEvent,
    request::RequestId,
};

/// Seconds of `window` at playback `rate`, rounded up.
pub fn scaled_window(window: Duration, rate: f64) -> f64 {
    (window.as_secs_f64() * rate.abs()).ceil()
}

/// Whether `time` lies in a buffered range that extends at least `margin`
/// seconds beyond it.
pub fn is_buffered_ahead(buffered: &[Range<f64>], time: f64, margin: f64) -> bool {
    buffered
        .iter()
        .any(|range| time >= range.start && time <= range.end - margin)
}

/// Whether the position moved far enough since the last check to warrant
/// another one. Any backwards jump counts.
pub(crate) fn needs_recheck(last: Option<f64>, now: f64, threshold: f64) -> bool {
    match last {
        None => true,
        Some(last) => now < last || now - last > threshold,
    }
}

pub(crate) fn at_tail(time: f64, duration: Option<f64>, tolerance: Duration) -> bool {
    duration.is_some_and(|duration| duration > 0.0 && time >= duration - tolerance.as_secs_f64())
}

#[derive(Debug, PartialEq, Eq)]
enum Check {
    NotStreaming,
    Buffered,
    Issued(RequestId),
}

pub(crate) struct SeekCoordinator {
    shared: Arc<Shared>,
    loader: SegmentLoader,
    last_seek_time: Option<f64>,
    last_check_time: Option<f64>,
    /// A loop restart is waiting for its seek to settle.
    restarting: bool,
    /// Trailing edge of the seek debounce window.
    deadline: Option<Instant>,
}

impl SeekCoordinator {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            loader: SegmentLoader::new(Arc::clone(&shared)),
            shared,
            last_seek_time: None,
            last_check_time: None,
            restarting: false,
            deadline: None,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut events: broadcast::Receiver<ClockEvent>,
        cancel: CancellationToken,
    ) {
        debug!("seek coordinator started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = until(self.deadline) => {
                    self.deadline = None;
                    self.on_settled_seek();
                }
                event = events.recv() => match event {
                    Ok(ClockEvent::SeekStarted | ClockEvent::SeekCompleted) => self.arm(),
                    Ok(ClockEvent::TimeAdvanced) => self.on_time_advanced(),
                    Ok(ClockEvent::Waiting) => self.on_waiting(),
                    Err(RecvError::Lagged(skipped)) => {
                        trace!(skipped, "clock events lagged");
                        self.arm();
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("seek coordinator stopped");
    }

    fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.shared.options.seek_debounce);
    }

    fn on_settled_seek(&mut self) {
        let restarting = std::mem::take(&mut self.restarting);
        let time = self.shared.clock.current_time();
        if self.last_seek_time == Some(time) {
            trace!(time, "seek to same position ignored");
            return;
        }
        if self.check(time) == Check::Buffered && restarting {
            // No append will follow to resume playback.
            self.shared.state.lock().resume_on_append = false;
            trace!(time, "loop start already buffered");
        }
    }

    fn on_time_advanced(&mut self) {
        let clock = &self.shared.clock;
        let time = clock.current_time();
        let threshold = scaled_window(self.shared.options.time_update_threshold, clock.playback_rate());
        if !needs_recheck(self.last_check_time, time, threshold) {
            return;
        }
        if self.check(time) != Check::NotStreaming {
            self.last_check_time = Some(time);
        }
    }

    fn on_waiting(&mut self) {
        let clock = &self.shared.clock;
        let time = clock.current_time();
        if clock.is_looping() {
            let restart = {
                let mut state = self.shared.state.lock();
                if self.shared.is_torn_down() {
                    return;
                }
                let restart = at_tail(time, state.session.duration, self.shared.options.tail_tolerance);
                if restart {
                    state.resume_on_append = true;
                }
                restart
            };
            if restart {
                debug!(time, "restarting loop");
                self.last_seek_time = None;
                self.last_check_time = None;
                self.restarting = true;
                self.shared.events.publish(EngineEvent::LoopRestart);
                clock.seek(0.0);
            }
        }
        self.arm();
    }

    /// Load from `time` unless enough is buffered ahead of it.
    fn check(&mut self, time: f64) -> Check {
        let shared = &self.shared;
        let buffered = shared.clock.buffered();
        let margin = scaled_window(shared.options.lookahead_margin, shared.clock.playback_rate());

        let (offset, request) = {
            let mut state = shared.state.lock();
            if shared.is_torn_down() || !state.lifecycle.is_streaming() {
                return Check::NotStreaming;
            }
            if is_buffered_ahead(&buffered, time, margin) {
                trace!(time, margin, "buffered ahead");
                return Check::Buffered;
            }
            let offset = state.demuxer.resolve_seek_offset(time);
            (offset, state.requests.issue().0)
        };

        debug!(time, offset, request = %request, "loading from position");
        self.last_seek_time = Some(time);
        self.loader
            .spawn_chain(offset..offset.saturating_add(shared.options.fetch_size), request);
        shared.events.publish(EngineEvent::SeekIssued {
            time,
            offset,
            request,
        });
        Check::Issued(request)
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
