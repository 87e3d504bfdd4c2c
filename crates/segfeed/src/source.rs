#![forbid(unsafe_code)]

use std::ops::Range;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

/// Bytes delivered by a [`ByteSource`] for one requested range.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Chunk {
    pub data: Bytes,
    /// The chunk reaches the end of the input.
    pub is_final: bool,
}

impl Chunk {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            is_final: false,
        }
    }

    /// Chunk that ends the input.
    pub fn last(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            is_final: true,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// An empty chunk denotes end of input.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Arbitrary-range byte fetcher (plain or decrypting).
///
/// Implementations must return promptly with [`FetchError::Aborted`] once
/// `cancel` fires. A range starting at or past the end of input yields an
/// empty chunk.
#[async_trait]
pub trait ByteSource: Send + Sync {
    async fn fetch(&self, range: Range<u64>, cancel: CancellationToken)
    -> Result<Chunk, FetchError>;
}
