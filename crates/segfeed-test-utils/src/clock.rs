//! Hand-driven [`PlaybackClock`].

use std::ops::Range;

use parking_lot::Mutex;
use segfeed::{ClockEvent, PlaybackClock};
use tokio::sync::broadcast;

struct ClockState {
    time: f64,
    rate: f64,
    looping: bool,
    buffered: Vec<Range<f64>>,
    seeks: Vec<f64>,
    plays: u32,
}

pub struct ManualClock {
    state: Mutex<ClockState>,
    tx: broadcast::Sender<ClockEvent>,
}

impl Default for ManualClock {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(ClockState {
                time: 0.0,
                rate: 1.0,
                looping: false,
                buffered: Vec::new(),
                seeks: Vec::new(),
                plays: 0,
            }),
            tx,
        }
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the position without notifying anyone.
    pub fn set_time(&self, time: f64) {
        self.state.lock().time = time;
    }

    /// Playback progressed to `time`.
    pub fn advance_to(&self, time: f64) {
        self.set_time(time);
        self.emit(ClockEvent::TimeAdvanced);
    }

    /// A user seek to `time`: both seek notifications fire.
    pub fn user_seek(&self, time: f64) {
        self.set_time(time);
        self.emit(ClockEvent::SeekStarted);
        self.emit(ClockEvent::SeekCompleted);
    }

    /// Playback stalled at the current position.
    pub fn stall(&self) {
        self.emit(ClockEvent::Waiting);
    }

    pub fn set_rate(&self, rate: f64) {
        self.state.lock().rate = rate;
    }

    pub fn set_looping(&self, looping: bool) {
        self.state.lock().looping = looping;
    }

    pub fn set_buffered(&self, buffered: Vec<Range<f64>>) {
        self.state.lock().buffered = buffered;
    }

    /// Seeks requested by the engine.
    pub fn engine_seeks(&self) -> Vec<f64> {
        self.state.lock().seeks.clone()
    }

    pub fn plays(&self) -> u32 {
        self.state.lock().plays
    }

    fn emit(&self, event: ClockEvent) {
        let _ = self.tx.send(event);
    }
}

impl PlaybackClock for ManualClock {
    fn current_time(&self) -> f64 {
        self.state.lock().time
    }

    fn playback_rate(&self) -> f64 {
        self.state.lock().rate
    }

    fn is_looping(&self) -> bool {
        self.state.lock().looping
    }

    fn buffered(&self) -> Vec<Range<f64>> {
        self.state.lock().buffered.clone()
    }

    fn seek(&self, time: f64) {
        {
            let mut state = self.state.lock();
            state.time = time;
            state.seeks.push(time);
        }
        self.emit(ClockEvent::SeekStarted);
        self.emit(ClockEvent::SeekCompleted);
    }

    fn play(&self) {
        self.state.lock().plays += 1;
    }

    fn subscribe(&self) -> broadcast::Receiver<ClockEvent> {
        self.tx.subscribe()
    }
}
