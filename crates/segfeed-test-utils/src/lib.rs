#![forbid(unsafe_code)]

//! In-memory collaborators for driving the segfeed engine in tests.

pub mod backend;
pub mod clock;
pub mod demux;
pub mod sink;
pub mod source;

pub use backend::{MemoryBackend, MemorySession, OpenMode};
pub use clock::ManualClock;
pub use demux::{ContainerLayout, DemuxProbe, Feed, ProbeHandle, ScriptedDemuxer, unit_index};
pub use sink::{RecordingSink, SinkConfig};
pub use source::{FetchCall, MemorySource};
