#![forbid(unsafe_code)]

use std::{collections::BTreeMap, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    buffer::Effects,
    demux::{MovieInfo, TrackId},
    engine::{Shared, State},
    error::SessionError,
    events::EngineEvent,
    media::{MediaSession, ReadyState},
    track::Track,
};

/// Engine lifecycle.
///
/// `SessionOpening -> Opened -> Ready <-> Ended`, and any state `-> TornDown`,
/// which is terminal. Before [`Playback::open`](crate::Playback::open) there is
/// no engine and so no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    SessionOpening,
    Opened,
    /// Metadata parsed and at least one track has a sink.
    Ready,
    /// The session was sealed; a later append reopens it.
    Ended,
    TornDown,
}

impl LifecycleState {
    /// Whether playback-driven loads may be issued.
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::Ready | Self::Ended)
    }
}

/// The media-layer session plus the tracks bound to it.
pub(crate) struct ContainerSession {
    handle: Arc<dyn MediaSession>,
    pub(crate) duration: Option<f64>,
    pub(crate) tracks: BTreeMap<TrackId, Track>,
}

impl ContainerSession {
    pub(crate) fn new(handle: Arc<dyn MediaSession>) -> Self {
        Self {
            handle,
            duration: None,
            tracks: BTreeMap::new(),
        }
    }

    pub(crate) fn handle(&self) -> &Arc<dyn MediaSession> {
        &self.handle
    }

    pub(crate) fn ready_state(&self) -> ReadyState {
        self.handle.ready_state()
    }

    /// Sinks accept appends while open, and an ended session reopens on append.
    pub(crate) fn accepts_appends(&self) -> bool {
        matches!(self.ready_state(), ReadyState::Open | ReadyState::Ended)
    }

    pub(crate) fn take_tracks(&mut self) -> BTreeMap<TrackId, Track> {
        std::mem::take(&mut self.tracks)
    }
}

impl Shared {
    /// Bind sinks to the tracks the container announced.
    ///
    /// Tracks whose codec the backend cannot play are skipped. The engine
    /// becomes `Ready` once at least one track has a sink.
    pub(crate) fn on_metadata(self: &Arc<Self>, state: &mut State, info: MovieInfo, fx: &mut Effects) {
        let duration = info.presentation_duration();
        state.session.duration = Some(duration);
        state.session.handle().set_duration(duration);

        for track in &info.tracks {
            if state.session.tracks.contains_key(&track.id) {
                continue;
            }
            let mime = track.mime();
            if !self.backend.is_type_supported(&mime) {
                warn!(track = track.id, %mime, "unsupported codec, track skipped");
                continue;
            }
            match state.session.handle().add_sink(&mime) {
                Ok(sink) => {
                    state
                        .demuxer
                        .configure_track(track.id, self.options.samples_per_segment);
                    state
                        .session
                        .tracks
                        .insert(track.id, Track::new(track.id, track.codec.clone(), sink));
                    debug!(track = track.id, codec = %track.codec, "sink created");
                }
                Err(error) => warn!(track = track.id, %mime, %error, "failed to create sink"),
            }
        }

        if state.session.tracks.is_empty() {
            warn!("no playable tracks");
            return;
        }

        for init in state.demuxer.initialization_segments() {
            if let Some(track) = state.session.tracks.get_mut(&init.track) {
                track.push_init(init.payload);
            }
        }

        let tracks: Vec<TrackId> = state.session.tracks.keys().copied().collect();
        if state.lifecycle == LifecycleState::Opened {
            state.lifecycle = LifecycleState::Ready;
        }
        info!(duration, tracks = tracks.len(), "container ready");
        self.events.publish(EngineEvent::Ready {
            duration,
            tracks: tracks.clone(),
        });

        for track in tracks {
            self.flush_when_idle(state, track, fx);
        }
    }

    /// Every track has appended its last segment: hand over to the finalizer.
    pub(crate) fn finalize_end_of_stream(self: &Arc<Self>) {
        if self.is_torn_down() {
            return;
        }
        let session = SessionHandle::new(Arc::clone(self));
        self.logger
            .in_scope(|| (self.options.end_of_stream)(&session));
    }
}

/// Read access to the session plus the end-of-stream seal.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Presentation duration in seconds, once metadata is parsed.
    pub fn duration(&self) -> Option<f64> {
        self.shared.state.lock().session.duration
    }

    pub fn ready_state(&self) -> ReadyState {
        self.shared.state.lock().session.ready_state()
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.shared.state.lock().lifecycle
    }

    pub fn track_ids(&self) -> Vec<TrackId> {
        self.shared.state.lock().session.tracks.keys().copied().collect()
    }

    /// Codec string of each track with a sink.
    pub fn codecs(&self) -> Vec<(TrackId, String)> {
        self.shared
            .state
            .lock()
            .session
            .tracks
            .values()
            .map(|track| (track.id, track.codec.clone()))
            .collect()
    }

    /// Signal end of stream to the media layer.
    ///
    /// No-op once torn down or when the session is not open.
    pub fn seal(&self) -> Result<(), SessionError> {
        let mut state = self.shared.state.lock();
        if self.shared.is_torn_down() || state.session.ready_state() != ReadyState::Open {
            return Ok(());
        }
        state.session.handle().end_of_stream()?;
        state.lifecycle = LifecycleState::Ended;
        drop(state);
        self.shared
            .logger
            .in_scope(|| debug!("session sealed"));
        Ok(())
    }
}
