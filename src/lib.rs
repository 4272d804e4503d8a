//! Live-timing state aggregation for motorsport feed captures.
//!
//! Paddock tails the capture file an upstream timing-feed client appends to,
//! decodes each frame into category updates, and merges them into a single
//! in-memory race state that many readers can query while ingestion runs.
//!
//! # Features
//!
//! - **Tolerant decoding**: strict JSON first, then literal-syntax frames; bad lines are dropped
//! - **Partial updates**: timing data deep-merges per car, other categories replace wholesale
//! - **Consistent reads**: one writer, many readers, never a half-applied update
//! - **Recording lifecycle**: start/stop/status around the feed client and pipeline
//! - **HTTP surface** (`http` feature): axum router for the operator endpoints
//!
//! # Quick Start
//!
//! ## Example (rebuild from a finished capture)
//!
//! ```rust,no_run
//! use paddock::LiveTiming;
//!
//! #[tokio::main]
//! async fn main() -> paddock::Result<()> {
//!     let state = LiveTiming::replay("live_data/live_timing_20240302_150405.json").await?;
//!
//!     for entry in state.leaderboard().entries {
//!         println!("{:>3} {:?}", entry.driver_number, entry.position);
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
pub mod types;

// Ingestion pipeline
pub mod aggregator;
pub mod config;
pub mod decode;
pub mod driver;
pub mod provider;
pub mod providers;
pub mod recorder;
pub mod stream;

// Operator surface
#[cfg(feature = "http")]
pub mod http;

// Core exports
pub use error::*;
pub use types::*;

// Pipeline exports
pub use aggregator::StateAggregator;
pub use config::RecorderConfig;
pub use decode::LineDecoder;
pub use providers::{CaptureReplay, FileTailer};
pub use recorder::{FeedClient, RecorderStatus, RecordingController};

use std::path::Path;
use std::sync::Arc;

/// Unified entry point for live-timing state.
///
/// Provides a consistent way to get a [`StateAggregator`] either from a live
/// recording or from a capture that has already finished.
///
/// # Examples
///
/// ## Live recording
/// ```rust,no_run
/// use paddock::{FeedClient, LiveTiming, RecorderConfig};
/// use std::sync::Arc;
///
/// # async fn example(feed: Arc<dyn FeedClient>) -> paddock::Result<()> {
/// let recorder = LiveTiming::recorder(RecorderConfig::default(), feed)?;
/// recorder.start(None).await?;
/// let board = recorder.aggregator().leaderboard();
/// # let _ = board;
/// # Ok(())
/// # }
/// ```
pub struct LiveTiming;

impl LiveTiming {
    /// Create the process-wide recording controller.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the output
    /// directory cannot be created.
    pub fn recorder(
        config: RecorderConfig,
        feed: Arc<dyn FeedClient>,
    ) -> Result<Arc<RecordingController>> {
        Ok(Arc::new(RecordingController::new(config, feed)?))
    }

    /// Rebuild race state from a finished capture file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read. Undecodable
    /// lines are skipped, not reported.
    pub async fn replay<P: AsRef<Path>>(path: P) -> Result<StateAggregator> {
        let aggregator = StateAggregator::new();
        aggregator.ingest_capture(path).await?;
        Ok(aggregator)
    }
}
