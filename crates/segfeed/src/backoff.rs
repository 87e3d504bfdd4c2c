#![forbid(unsafe_code)]

use std::{sync::Arc, time::Duration};

use tracing::{debug, trace};

use crate::{
    buffer::Effects,
    demux::TrackId,
    engine::Shared,
    events::EngineEvent,
};

/// Retry policy for appends rejected because the sink is full.
///
/// Fixed delay, unlimited attempts. Eviction on the retry path is what frees
/// capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaBackoff {
    delay: Duration,
}

impl QuotaBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Delay before retry `attempt` (1-based).
    pub fn delay_for_attempt(&self, _attempt: u32) -> Duration {
        self.delay
    }

    pub fn should_retry(&self, _attempt: u32) -> bool {
        true
    }
}

impl Default for QuotaBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Shared {
    /// Re-drive a track that is backing off after `delay_for_attempt`.
    pub(crate) fn schedule_retry(self: &Arc<Self>, track_id: TrackId) {
        if self.is_torn_down() {
            return;
        }
        let attempt = self
            .state
            .lock()
            .session
            .tracks
            .get(&track_id)
            .map_or(0, |track| track.quota_attempts);
        if !self.backoff.should_retry(attempt) {
            return;
        }
        let delay = self.backoff.delay_for_attempt(attempt);
        debug!(track = track_id, attempt, ?delay, "sink full, retry scheduled");
        self.events.publish(EngineEvent::QuotaExceeded {
            track: track_id,
            attempt,
            retry_in: delay,
        });

        let shared = Arc::clone(self);
        let cancel = self.cancel.clone();
        self.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => shared.retry_idle(track_id),
            }
        });
    }

    /// Backoff elapsed: evict first, then resume the queue from its head.
    fn retry_idle(self: &Arc<Self>, track_id: TrackId) {
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
            if !track.leave_backoff() {
                return;
            }
            trace!(track = track_id, queued = track.queued(), "retrying append");
            let now = self.clock.current_time();
            self.evict(state, track_id, now);
            self.flush_when_idle(state, track_id, &mut fx);
        }
        fx.apply(self);
    }
}
