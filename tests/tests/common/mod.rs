// Common fixtures and utilities for integration tests

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::*;
