//! Integration tests for segfeed
#![expect(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "integration test crate — unwraps are acceptable in test code"
)]

mod common;
mod loader;
