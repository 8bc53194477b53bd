//! Error types for provider-pulse
//!
//! This module provides the crate-wide error type. Per-call HTTP failures are
//! deliberately not represented here: they are captured as data in
//! [`crate::types::ProbeResponse`] so a failing provider never aborts a cycle.
//! What remains are the failures that matter to the orchestrator:
//! - Configuration problems detected at startup
//! - Discovery failures (cycle-level)
//! - Buffer I/O failures, including the critical clear-after-upload case
//! - Remote sink rejections

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for provider-pulse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for provider-pulse
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The environment variable or field that caused the error (e.g., "PUSH_INTERVAL_CYCLES")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Work item discovery failed
    #[error("discovery error: {0}")]
    Discovery(String),

    /// The remote sink rejected an upload
    #[error("remote sink error (status {status}): {message}")]
    Sink {
        /// HTTP status returned by the sink
        status: u16,
        /// Response body or reason returned by the sink
        message: String,
    },

    /// The local buffer could not be reset after a confirmed remote upload
    ///
    /// Remote and local state are now inconsistent: the next flush will
    /// upload the same rows again.
    #[error("failed to clear buffer {path} after successful upload: {source}")]
    BufferClear {
        /// Path of the buffer file
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error leaves remote and local state inconsistent
    ///
    /// Only a failed buffer clear after a successful upload qualifies.
    pub fn is_critical(&self) -> bool {
        matches!(self, Error::BufferClear { .. })
    }

    /// Machine-readable error code, used as a structured logging field
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Discovery(_) => "discovery_error",
            Error::Sink { .. } => "sink_error",
            Error::BufferClear { .. } => "buffer_clear_failed",
        }
    }
}
