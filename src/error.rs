//! Error types for live-timing recording and aggregation.
//!
//! All fallible operations in this crate return [`LiveTimingError`]. Operator
//! facing failures (starting twice, stopping while idle) are ordinary error
//! values carrying a stable [`code`](LiveTimingError::code) so callers can map
//! them onto responses without string matching.
//!
//! Decoding is deliberately absent here: malformed capture lines are dropped by
//! the decoder and never become errors.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use paddock::LiveTimingError;
//!
//! let error = LiveTimingError::feed_failed("upstream closed the connection");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for live-timing operations.
pub type Result<T, E = LiveTimingError> = std::result::Result<T, E>;

/// Main error type for live-timing operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LiveTimingError {
    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("Capture file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Capture file {path} did not appear within {waited:?}")]
    CaptureTimeout { path: PathBuf, waited: Duration },

    #[error("Upstream feed failed: {reason}")]
    Feed {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid configuration: {details}")]
    Config { details: String },

    #[error("No active recording file found")]
    NoCaptureFile,

    #[error("Invalid capture filename '{name}'")]
    InvalidFilename { name: String },
}

impl LiveTimingError {
    /// Stable machine-readable code for operator responses.
    pub fn code(&self) -> &'static str {
        match self {
            LiveTimingError::AlreadyRecording => "already_recording",
            LiveTimingError::NotRecording => "not_recording",
            LiveTimingError::File { .. } => "file_error",
            LiveTimingError::CaptureTimeout { .. } => "capture_timeout",
            LiveTimingError::Feed { .. } => "feed_error",
            LiveTimingError::Config { .. } => "config_error",
            LiveTimingError::NoCaptureFile => "no_capture_file",
            LiveTimingError::InvalidFilename { .. } => "invalid_filename",
        }
    }

    /// Returns whether this error is potentially recoverable by re-issuing the operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            LiveTimingError::Feed { .. } => true,
            LiveTimingError::CaptureTimeout { .. } => true,
            LiveTimingError::File { .. } => true,
            LiveTimingError::AlreadyRecording => false,
            LiveTimingError::NotRecording => false,
            LiveTimingError::Config { .. } => false,
            LiveTimingError::NoCaptureFile => false,
            LiveTimingError::InvalidFilename { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LiveTimingError::AlreadyRecording => {
                vec!["Stop the current recording before starting a new one"]
            }
            LiveTimingError::NotRecording => vec!["Start a recording first"],
            LiveTimingError::File { .. } => vec![
                "Check the output directory exists and is writable",
                "Ensure sufficient disk space",
            ],
            LiveTimingError::CaptureTimeout { .. } => vec![
                "Check the upstream feed is reachable",
                "Re-issue start once the feed is available",
            ],
            LiveTimingError::Feed { .. } => vec![
                "Check network connectivity to the timing feed",
                "Re-issue start; reconnects are not automatic",
            ],
            LiveTimingError::Config { .. } => vec![
                "Check interval values are non-zero",
                "Verify the configuration file is valid YAML",
            ],
            LiveTimingError::NoCaptureFile => vec!["Start a recording to create a capture file"],
            LiveTimingError::InvalidFilename { .. } => {
                vec!["Use a plain file name without directory components"]
            }
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        LiveTimingError::File { path, source }
    }

    /// Helper constructor for upstream feed errors.
    pub fn feed_failed(reason: impl Into<String>) -> Self {
        LiveTimingError::Feed { reason: reason.into(), source: None }
    }

    /// Helper constructor for upstream feed errors with source.
    pub fn feed_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        LiveTimingError::Feed { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(details: impl Into<String>) -> Self {
        LiveTimingError::Config { details: details.into() }
    }
}

impl From<std::io::Error> for LiveTimingError {
    fn from(err: std::io::Error) -> Self {
        LiveTimingError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}
