#![forbid(unsafe_code)]

//! Range-chained loading of the container.
//!
//! A load chain fetches a byte range, feeds it to the demuxer and continues at
//! whatever offset the demuxer asks for next, until the input is exhausted, the
//! demuxer stops asking, the chain gets too deep, or a newer request supersedes
//! it.

use std::{ops::Range, sync::Arc};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::{
    buffer::Effects,
    demux::DemuxEvent,
    engine::{Shared, State},
    error::{EngineResult, FetchError},
    events::EngineEvent,
    request::{LoadRequest, RequestId},
    source::Chunk,
};

/// How a load chain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Input exhausted; the demuxer was told so.
    Eof,
    /// The demuxer asked for nothing further.
    NoFurtherOffset,
    /// Superseded by a newer request.
    Cancelled,
    /// Abandoned past the depth limit.
    DepthExceeded,
    /// The engine was torn down.
    Aborted,
}

enum Ingest {
    TornDown,
    Stale,
    EndOfInput,
    Next(Option<u64>),
}

#[derive(Clone)]
pub struct SegmentLoader {
    shared: Arc<Shared>,
}

impl SegmentLoader {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Supersede the current request and load `range` in the background.
    ///
    /// Returns `None` once torn down.
    pub fn start(&self, range: Range<u64>) -> Option<RequestId> {
        let request = {
            let mut state = self.shared.state.lock();
            if self.shared.is_torn_down() {
                return None;
            }
            state.requests.issue().0
        };
        self.spawn_chain(range, request);
        Some(request)
    }

    /// Run a load chain to completion.
    ///
    /// Without `request` a new one is issued, superseding the current chain.
    /// With a stale `request` the chain ends as [`LoadOutcome::Cancelled`].
    pub async fn load_segment(
        &self,
        range: Range<u64>,
        request: Option<RequestId>,
        depth: u32,
    ) -> EngineResult<LoadOutcome> {
        let request = match request {
            Some(request) => request,
            None => {
                let mut state = self.shared.state.lock();
                if self.shared.is_torn_down() {
                    return Ok(LoadOutcome::Aborted);
                }
                state.requests.issue().0
            }
        };
        self.shared
            .logger
            .attach(self.chain(range, request, depth))
            .await
    }

    pub(crate) fn spawn_chain(&self, range: Range<u64>, request: RequestId) {
        let loader = self.clone();
        self.shared.spawn(async move {
            match loader.chain(range, request, 0).await {
                Ok(outcome) => debug!(request = %request, ?outcome, "load chain finished"),
                Err(error) => warn!(request = %request, %error, "load chain failed"),
            }
        });
    }

    async fn chain(&self, range: Range<u64>, id: RequestId, depth: u32) -> EngineResult<LoadOutcome> {
        let result = self.run(range, id, depth).await;
        if let Ok(outcome) = result {
            self.shared.events.publish(EngineEvent::LoadFinished {
                request: id,
                outcome,
            });
        }
        result
    }

    async fn run(&self, range: Range<u64>, id: RequestId, depth: u32) -> EngineResult<LoadOutcome> {
        let shared = &self.shared;
        let mut request = LoadRequest {
            id,
            start: range.start,
            end: range.end,
            depth,
        };

        loop {
            if shared.is_torn_down() {
                return Ok(LoadOutcome::Aborted);
            }
            if request.depth > shared.options.max_depth {
                warn!(
                    request = %id,
                    depth = request.depth,
                    offset = request.start,
                    "load chain too deep, request abandoned"
                );
                return Ok(LoadOutcome::DepthExceeded);
            }
            let Some(token) = shared.state.lock().requests.token_for(id) else {
                trace!(request = %id, "superseded before fetch");
                return Ok(LoadOutcome::Cancelled);
            };

            trace!(
                request = %id,
                start = request.start,
                end = request.end,
                depth = request.depth,
                "fetching"
            );
            shared.events.publish(EngineEvent::LoadStarted {
                request: id,
                start: request.start,
                end: request.end,
                depth: request.depth,
            });

            let fetched = tokio::select! {
                biased;
                () = token.cancelled() => Err(FetchError::Aborted),
                result = shared.source.fetch(request.range(), token.clone()) => result,
            };
            if shared.is_torn_down() {
                return Ok(LoadOutcome::Aborted);
            }
            let chunk = match fetched {
                Ok(chunk) => chunk,
                Err(error) => {
                    if token.is_cancelled() || !shared.state.lock().requests.is_current(id) {
                        trace!(request = %id, %error, "fetch aborted by newer request");
                        return Ok(LoadOutcome::Cancelled);
                    }
                    return Err(error.into());
                }
            };

            let is_final = chunk.is_final;
            match self.ingest(&request, chunk) {
                Ingest::TornDown => return Ok(LoadOutcome::Aborted),
                Ingest::Stale => return Ok(LoadOutcome::Cancelled),
                Ingest::EndOfInput => return Ok(LoadOutcome::Eof),
                Ingest::Next(Some(offset)) => {
                    request = request.next(offset, shared.options.fetch_size);
                }
                Ingest::Next(None) if is_final => return Ok(LoadOutcome::Eof),
                Ingest::Next(None) => return Ok(LoadOutcome::NoFurtherOffset),
            }
        }
    }

    /// Feed one fetched chunk and route what the demuxer produced.
    fn ingest(&self, request: &LoadRequest, chunk: Chunk) -> Ingest {
        let shared = &self.shared;
        let mut fx = Effects::default();
        let ingest = {
            let mut state = shared.state.lock();
            if shared.is_torn_down() {
                return Ingest::TornDown;
            }
            if !state.requests.is_current(request.id) {
                trace!(request = %request.id, "superseded during fetch, chunk dropped");
                return Ingest::Stale;
            }
            let state = &mut *state;
            if chunk.is_empty() {
                debug!(request = %request.id, offset = request.start, "end of input");
                state.demuxer.feed(Bytes::new(), request.start, true);
                shared.drain_demuxer(state, request.id, &mut fx);
                Ingest::EndOfInput
            } else {
                trace!(
                    request = %request.id,
                    offset = request.start,
                    bytes = chunk.len(),
                    is_final = chunk.is_final,
                    "feeding demuxer"
                );
                let next = state
                    .demuxer
                    .feed(chunk.data, request.start, chunk.is_final);
                shared.drain_demuxer(state, request.id, &mut fx);
                Ingest::Next(next)
            }
        };
        fx.apply(shared);
        ingest
    }
}

impl Shared {
    fn drain_demuxer(self: &Arc<Self>, state: &mut State, request: RequestId, fx: &mut Effects) {
        while let Some(event) = state.demuxer.poll_event() {
            match event {
                DemuxEvent::Ready(info) => self.on_metadata(state, info, fx),
                DemuxEvent::Segment(segment) => self.enqueue(state, request, segment, fx),
            }
        }
    }
}
