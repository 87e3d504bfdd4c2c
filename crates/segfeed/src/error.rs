#![forbid(unsafe_code)]

use std::time::Duration;

use thiserror::Error;

/// Errors reported by a [`ByteSource`](crate::ByteSource).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The abort token fired before the range was delivered.
    #[error("fetch aborted")]
    Aborted,

    #[error("fetch failed: {0}")]
    Failed(String),
}

/// Errors reported by a [`BufferSink`](crate::BufferSink).
///
/// `QuotaExceeded` is recoverable (the engine retries after a delay).
/// `SessionClosed` and `Aborted` are expected during teardown races and are
/// dropped silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("sink capacity exceeded")]
    QuotaExceeded,

    #[error("session is not open")]
    SessionClosed,

    #[error("sink operation aborted")]
    Aborted,

    #[error("sink rejected operation: {0}")]
    Rejected(String),
}

/// Errors reported by a [`MediaSession`](crate::MediaSession) or its backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session creation failed: {0}")]
    Create(String),

    #[error("invalid session state: {0}")]
    InvalidState(String),
}

/// Engine errors surfaced to the caller.
///
/// Only setup failures and byte-source failures reach the caller. Steady-state
/// sink failures are absorbed by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("media session support is not available")]
    UnsupportedEnvironment,

    #[error("session did not open within {0:?}")]
    SessionOpenTimeout(Duration),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

pub type EngineResult<T> = Result<T, EngineError>;
