#![forbid(unsafe_code)]

use std::{fmt, ops::Range};

use tokio_util::sync::CancellationToken;

/// Monotonic identity of a load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One step of a load chain: fetch `[start, end)` at recursion `depth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub id: RequestId,
    pub start: u64,
    pub end: u64,
    pub depth: u32,
}

impl LoadRequest {
    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }

    /// Follow-up step continuing at a demuxer-supplied offset.
    pub fn next(&self, offset: u64, fetch_size: u64) -> Self {
        Self {
            id: self.id,
            start: offset,
            end: offset.saturating_add(fetch_size),
            depth: self.depth + 1,
        }
    }
}

/// Issues request ids and owns the abort token of the current one.
///
/// Issuing a new id cancels the previous token, so any fetch still in flight
/// under a stale id is aborted. Tokens are children of `root`; cancelling the
/// root aborts everything.
#[derive(Debug)]
pub struct RequestTracker {
    current: RequestId,
    token: CancellationToken,
    root: CancellationToken,
}

impl RequestTracker {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            current: RequestId(0),
            token: root.child_token(),
            root,
        }
    }

    /// Supersede the current request.
    pub fn issue(&mut self) -> (RequestId, CancellationToken) {
        self.token.cancel();
        self.current = RequestId(self.current.0.wrapping_add(1));
        self.token = self.root.child_token();
        (self.current, self.token.clone())
    }

    pub fn current(&self) -> RequestId {
        self.current
    }

    pub fn is_current(&self, id: RequestId) -> bool {
        self.current == id
    }

    /// Abort token for `id`, or `None` once `id` has been superseded.
    pub fn token_for(&self, id: RequestId) -> Option<CancellationToken> {
        self.is_current(id).then(|| self.token.clone())
    }

    pub fn cancel_all(&self) {
        self.root.cancel();
    }
}
