//! Common test utilities for integration tests.

pub mod assertions;
pub mod fixtures;

// Re-export common types
pub use assertions::*;
pub use fixtures::*;
