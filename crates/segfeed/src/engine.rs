#![forbid(unsafe_code)]

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    backoff::QuotaBackoff,
    demux::Demuxer,
    error::{EngineError, EngineResult},
    events::{EngineEvent, EventBus},
    loader::SegmentLoader,
    logger::Logger,
    media::{MediaBackend, PlaybackClock, ReadyState},
    options::EngineOptions,
    request::RequestTracker,
    seek::SeekCoordinator,
    session::{ContainerSession, LifecycleState, SessionHandle},
    source::ByteSource,
    track::InFlight,
};

/// Collaborators the engine is built from.
pub struct PlaybackParts {
    pub clock: Arc<dyn PlaybackClock>,
    pub source: Arc<dyn ByteSource>,
    pub demuxer: Box<dyn Demuxer>,
    pub backend: Arc<dyn MediaBackend>,
}

/// State mutated by the loader, the sink completions and the coordinator.
///
/// Guarded by one mutex that is never held across an `.await`.
pub(crate) struct State {
    pub(crate) lifecycle: LifecycleState,
    pub(crate) session: ContainerSession,
    pub(crate) demuxer: Box<dyn Demuxer>,
    pub(crate) requests: RequestTracker,
    /// Resume playback after the next media append (loop restart).
    pub(crate) resume_on_append: bool,
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<State>,
    torn_down: AtomicBool,
    pub(crate) clock: Arc<dyn PlaybackClock>,
    pub(crate) source: Arc<dyn ByteSource>,
    pub(crate) backend: Arc<dyn MediaBackend>,
    pub(crate) options: EngineOptions,
    pub(crate) backoff: QuotaBackoff,
    pub(crate) events: EventBus,
    pub(crate) logger: Logger,
    /// Root of every token the engine hands out.
    pub(crate) cancel: CancellationToken,
}

impl Shared {
    pub(crate) fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Spawn an engine task under the injected logger.
    pub(crate) fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(self.logger.attach(fut))
    }

    /// Release everything. Idempotent.
    ///
    /// After this returns no sink is mutated again: every later step checks
    /// the torn-down flag under the state lock.
    pub(crate) fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.logger.in_scope(|| {
            self.cancel.cancel();

            let mut state = self.state.lock();
            let state = &mut *state;
            let session = Arc::clone(state.session.handle());
            let open = session.ready_state() == ReadyState::Open;

            let tracks = state.session.take_tracks();
            let count = tracks.len();
            for (id, mut track) in tracks {
                let in_flight = track.take_in_flight();
                if in_flight.is_some() || track.sink.is_updating() {
                    track.sink.abort();
                }
                if let Some(InFlight::Append(pending)) = &in_flight {
                    if let Some(samples) = pending.sample_count() {
                        state.demuxer.release_samples(id, samples);
                    }
                }
                if open {
                    session.remove_sink(&track.sink);
                }
            }
            state.demuxer.discard();
            let from = std::mem::replace(&mut state.lifecycle, LifecycleState::TornDown);
            session.release();
            debug!(?from, tracks = count, "torn down");
        });
        self.events.publish(EngineEvent::TornDown);
    }
}

/// A running (or openable) playback pipeline.
///
/// Dropping it tears the pipeline down.
pub struct Playback {
    shared: Arc<Shared>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl Playback {
    /// Create and open the container session.
    ///
    /// Nothing is fetched until [`Playback::start`].
    pub async fn open(parts: PlaybackParts, options: EngineOptions) -> EngineResult<Self> {
        let PlaybackParts {
            clock,
            source,
            demuxer,
            backend,
        } = parts;

        if !backend.is_available() {
            options
                .logger
                .in_scope(|| warn!("media session support unavailable"));
            return Err(EngineError::UnsupportedEnvironment);
        }

        let handle = backend.create_session()?;
        let cancel = CancellationToken::new();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                lifecycle: LifecycleState::SessionOpening,
                session: ContainerSession::new(Arc::clone(&handle)),
                demuxer,
                requests: RequestTracker::new(cancel.clone()),
                resume_on_append: false,
            }),
            torn_down: AtomicBool::new(false),
            clock,
            source,
            backend,
            backoff: QuotaBackoff::new(options.quota_retry_delay),
            events: EventBus::new(options.events_channel_capacity),
            logger: options.logger.clone(),
            options,
            cancel,
        });

        let timeout = shared.options.session_open_timeout;
        shared.logger.in_scope(|| debug!(?timeout, "waiting for session to open"));
        if tokio::time::timeout(timeout, handle.opened()).await.is_err() {
            shared
                .logger
                .in_scope(|| warn!(?timeout, "session did not open"));
            shared.teardown();
            return Err(EngineError::SessionOpenTimeout(timeout));
        }

        shared.state.lock().lifecycle = LifecycleState::Opened;
        shared.events.publish(EngineEvent::SessionOpened);
        Ok(Self {
            shared,
            coordinator: Mutex::new(None),
        })
    }

    /// Start observing the clock and load from offset 0.
    pub fn start(&self) {
        let mut coordinator = self.coordinator.lock();
        if coordinator.is_some() || self.shared.is_torn_down() {
            return;
        }
        let events = self.shared.clock.subscribe();
        let seek = SeekCoordinator::new(Arc::clone(&self.shared));
        *coordinator = Some(
            self.shared
                .spawn(seek.run(events, self.shared.cancel.child_token())),
        );
        drop(coordinator);

        self.loader()
            .start(0..self.shared.options.initial_range_end);
    }

    pub fn loader(&self) -> SegmentLoader {
        SegmentLoader::new(Arc::clone(&self.shared))
    }

    pub fn session(&self) -> SessionHandle {
        SessionHandle::new(Arc::clone(&self.shared))
    }

    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }

    /// Cloneable teardown function for callers that do not own the playback.
    pub fn teardown_handle(&self) -> Teardown {
        Teardown {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn teardown(&self) {
        if let Some(task) = self.coordinator.lock().take() {
            task.abort();
        }
        self.shared.teardown();
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Detached teardown function of a [`Playback`].
#[derive(Clone)]
pub struct Teardown {
    shared: Arc<Shared>,
}

impl Teardown {
    pub fn run(&self) {
        self.shared.teardown();
    }
}

/// Open a session and start streaming.
///
/// Fails before anything is allocated when the environment has no media
/// session support, and after releasing the session when it does not open in
/// time.
pub async fn play(parts: PlaybackParts, options: EngineOptions) -> EngineResult<Playback> {
    let playback = Playback::open(parts, options).await?;
    playback.start();
    Ok(playback)
}
