#![forbid(unsafe_code)]

//! Logger handle injected into the engine.
//!
//! The engine never logs through whatever subscriber happens to be global at
//! the time a background task runs. Every task it spawns, and every sync entry
//! point that logs, runs under the [`Logger`] given in
//! [`EngineOptions`](crate::EngineOptions).

use std::future::Future;

use tracing::{
    Dispatch, Span, dispatcher,
    instrument::{Instrument, Instrumented, WithDispatch, WithSubscriber},
};

#[derive(Clone, Debug)]
pub struct Logger {
    dispatch: Option<Dispatch>,
    span: Span,
}

impl Logger {
    /// Log through `dispatch`.
    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            dispatch: Some(dispatch),
            span: Span::none(),
        }
    }

    /// Discard all engine logs.
    pub fn disabled() -> Self {
        Self {
            dispatch: Some(Dispatch::none()),
            span: Span::none(),
        }
    }

    /// Parent span for everything the engine logs.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub(crate) fn attach<F: Future>(&self, fut: F) -> WithDispatch<Instrumented<F>> {
        let dispatch = match &self.dispatch {
            Some(dispatch) => dispatch.clone(),
            None => dispatcher::get_default(Dispatch::clone),
        };
        fut.instrument(self.span.clone()).with_subscriber(dispatch)
    }

    pub(crate) fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.dispatch {
            Some(dispatch) => dispatcher::with_default(dispatch, || self.span.in_scope(f)),
            None => self.span.in_scope(f),
        }
    }
}

impl Default for Logger {
    /// Follows the subscriber current at each call site.
    fn default() -> Self {
        Self {
            dispatch: None,
            span: Span::none(),
        }
    }
}
