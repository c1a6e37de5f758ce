//! Error types for the havoc chaos harness.
//!
//! This module provides a unified error type [`HavocError`] for all havoc operations,
//! along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Lifecycle**: a loop was started twice or stopped while idle
//! - **Probe**: the target's health check timed out or could not be reached
//! - **Executor**: an experiment failed mid-run or ran out of a resource
//! - **Configuration**: invalid settings, catalogs or experiment parameters
//!
//! # Example
//!
//! ```rust
//! use havoc::error::{HavocError, Result};
//!
//! fn check_probability(p: f64) -> Result<f64> {
//!     if !(0.0..=1.0).contains(&p) {
//!         return Err(HavocError::InvalidArgument(format!("probability {p} out of range")));
//!     }
//!     Ok(p)
//! }
//!
//! assert!(check_probability(1.5).is_err());
//! ```

use std::io;
use thiserror::Error;

/// Main error type for havoc operations.
#[derive(Error, Debug)]
pub enum HavocError {
    // Lifecycle errors
    #[error("Already running: {0}")]
    AlreadyRunning(String),

    // Probe errors
    #[error("Health probe timed out after {0}ms")]
    ProbeTimeout(u64),

    #[error("Target unreachable: {0}")]
    ProbeUnreachable(String),

    // Experiment errors
    #[error("Executor fault: {0}")]
    ExecutorFault(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Forced abort: {0}")]
    ForcedAbort(String),

    // Validation errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HavocError {
    /// Whether this error means the target could not be health checked.
    pub fn is_probe_failure(&self) -> bool {
        matches!(
            self,
            HavocError::ProbeTimeout(_) | HavocError::ProbeUnreachable(_)
        )
    }

    /// Shorthand for a parameter validation failure.
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        HavocError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for HavocError {
    fn from(e: serde_json::Error) -> Self {
        HavocError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for HavocError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // reqwest does not report the configured limit, the probe fills it in
            HavocError::ProbeTimeout(0)
        } else {
            HavocError::ProbeUnreachable(e.to_string())
        }
    }
}

/// Result type alias for havoc operations.
pub type Result<T> = std::result::Result<T, HavocError>;
