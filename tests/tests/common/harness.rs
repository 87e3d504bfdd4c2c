use std::{sync::Arc, time::Duration};

use segfeed::{EngineEvent, PlaybackParts};
use segfeed_test_utils::{
    ContainerLayout, DemuxProbe, ManualClock, MemoryBackend, MemorySession, MemorySource,
    ProbeHandle, ScriptedDemuxer,
};
use tokio::sync::broadcast;

const WAIT: Duration = Duration::from_secs(5);

/// Collaborators for one playback, kept around for inspection.
pub struct Harness {
    pub layout: ContainerLayout,
    pub clock: Arc<ManualClock>,
    pub source: Arc<MemorySource>,
    pub backend: Arc<MemoryBackend>,
    pub probe: ProbeHandle,
    demuxer: Option<ScriptedDemuxer>,
}

impl Harness {
    pub fn new(layout: ContainerLayout) -> Self {
        let source = MemorySource::new(layout.bytes());
        Self::with(layout, source, MemoryBackend::default())
    }

    pub fn with(layout: ContainerLayout, source: MemorySource, backend: MemoryBackend) -> Self {
        let (demuxer, probe) = ScriptedDemuxer::new(layout.clone());
        Self {
            layout,
            clock: Arc::new(ManualClock::new()),
            source: Arc::new(source),
            backend: Arc::new(backend),
            probe,
            demuxer: Some(demuxer),
        }
    }

    /// Parts for the engine. Can be taken once.
    pub fn parts(&mut self) -> PlaybackParts {
        PlaybackParts {
            clock: self.clock.clone(),
            source: self.source.clone(),
            demuxer: Box::new(self.demuxer.take().expect("parts already taken")),
            backend: self.backend.clone(),
        }
    }

    pub fn session(&self) -> Arc<MemorySession> {
        self.backend.session().expect("no session created")
    }

    pub fn probe(&self) -> DemuxProbe {
        self.probe.snapshot()
    }
}

/// Receive events until one matches.
pub async fn wait_for(
    rx: &mut broadcast::Receiver<EngineEvent>,
    mut matches: impl FnMut(&EngineEvent) -> bool,
) -> EngineEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll `condition` until it holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached");
}

/// Events already published, without waiting.
pub fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => return events,
        }
    }
}
