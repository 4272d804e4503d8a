//! Replay provider for finished capture files

use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use super::tail::finish_line;
use crate::provider::LineSource;
use crate::{LiveTimingError, Result};

/// Reads a capture file from start to end without waiting for more data.
///
/// Used to rebuild race state from a recording that has already finished.
pub struct CaptureReplay {
    path: PathBuf,
    reader: BufReader<File>,
    pending: Vec<u8>,
    lines_read: u64,
}

impl CaptureReplay {
    /// Open a capture file for replay
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file =
            File::open(&path).await.map_err(|e| LiveTimingError::file_error(path.clone(), e))?;
        info!("Opened capture file for replay: {}", path.display());
        Ok(Self { path, reader: BufReader::new(file), pending: Vec::new(), lines_read: 0 })
    }

    /// Number of lines returned so far
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }
}

#[async_trait::async_trait]
impl LineSource for CaptureReplay {
    async fn next_line(&mut self) -> Result<Option<String>> {
        let read = self
            .reader
            .read_until(b'\n', &mut self.pending)
            .await
            .map_err(|e| LiveTimingError::file_error(self.path.clone(), e))?;

        if read == 0 && self.pending.is_empty() {
            debug!("Reached end of capture after {} lines", self.lines_read);
            return Ok(None);
        }

        // A final line without a newline still counts once the file has ended
        self.lines_read += 1;
        Ok(Some(finish_line(&mut self.pending)))
    }
}
