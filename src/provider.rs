//! Provider trait for capture-line sources

use crate::Result;

/// Trait for sources of raw capture lines
///
/// Sources abstract over where lines come from (a file still being written,
/// a finished capture) and handle their own waiting internally.
#[async_trait::async_trait]
pub trait LineSource: Send + 'static {
    /// Get the next complete line, without its terminator
    ///
    /// Returns:
    /// - `Ok(Some(line))` - New line available
    /// - `Ok(None)` - Source ended (normal termination)
    /// - `Err(e)` - Error occurred
    ///
    /// Lines are yielded strictly in file order. Each source handles waiting:
    /// - Tail: Polls for appended data
    /// - Replay: Reads to end of file, then ends
    async fn next_line(&mut self) -> Result<Option<String>>;
}
