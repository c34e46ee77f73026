//! Common test utilities for integration tests.

pub mod fixtures;

pub use fixtures::*;
