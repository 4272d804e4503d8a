//! Tail provider for capture files that are still being written

use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{Duration, Instant, sleep};
use tracing::{debug, error, info};

use crate::config::RecorderConfig;
use crate::provider::LineSource;
use crate::{LiveTimingError, Result};

/// Follows a growing capture file line by line.
///
/// The file may not exist yet when tailing starts: the upstream feed client
/// creates it once connected. The tailer polls for it every `poll_interval`
/// and gives up with [`LiveTimingError::CaptureTimeout`] after
/// `wait_timeout`. Once open, lines are returned in append order; at end of
/// file the tailer sleeps for `poll_interval` and tries again. A trailing
/// line without its newline is held back until the writer finishes it.
pub struct FileTailer {
    path: PathBuf,
    poll_interval: Duration,
    wait_timeout: Duration,
    reader: Option<BufReader<File>>,
    /// Bytes of the line currently being assembled
    pending: Vec<u8>,
    lines_read: u64,
}

impl FileTailer {
    /// Create a tailer with the default 100ms poll and 10s wait
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::from_config(path, &RecorderConfig::default())
    }

    /// Create a tailer using the recorder's polling settings
    pub fn from_config(path: impl Into<PathBuf>, config: &RecorderConfig) -> Self {
        Self {
            path: path.into(),
            poll_interval: config.poll_interval,
            wait_timeout: config.file_wait_timeout,
            reader: None,
            pending: Vec::new(),
            lines_read: 0,
        }
    }

    /// Set the interval between polls
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set how long to wait for the file to appear
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Path being tailed
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of complete lines returned so far
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    async fn wait_for_file(&self) -> Result<BufReader<File>> {
        let started = Instant::now();
        loop {
            match File::open(&self.path).await {
                Ok(file) => {
                    info!("Started tailing capture file: {}", self.path.display());
                    return Ok(BufReader::new(file));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    let waited = started.elapsed();
                    if waited >= self.wait_timeout {
                        error!("Timeout waiting for capture file: {}", self.path.display());
                        return Err(LiveTimingError::CaptureTimeout {
                            path: self.path.clone(),
                            waited,
                        });
                    }
                    sleep(self.poll_interval).await;
                }
                Err(e) => return Err(LiveTimingError::file_error(self.path.clone(), e)),
            }
        }
    }
}

/// Turn an assembled line into text, dropping its terminator.
pub(crate) fn finish_line(pending: &mut Vec<u8>) -> String {
    while matches!(pending.last(), Some(b'\n' | b'\r')) {
        pending.pop();
    }
    let line = String::from_utf8_lossy(pending).into_owned();
    pending.clear();
    line
}

#[async_trait::async_trait]
impl LineSource for FileTailer {
    async fn next_line(&mut self) -> Result<Option<String>> {
        if self.reader.is_none() {
            let reader = self.wait_for_file().await?;
            self.reader = Some(reader);
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        loop {
            reader
                .read_until(b'\n', &mut self.pending)
                .await
                .map_err(|e| LiveTimingError::file_error(self.path.clone(), e))?;

            if self.pending.ends_with(b"\n") {
                self.lines_read += 1;
                return Ok(Some(finish_line(&mut self.pending)));
            }

            // End of file, possibly mid-line: wait for the writer
            if !self.pending.is_empty() {
                debug!(bytes = self.pending.len(), "Holding partial capture line");
            }
            sleep(self.poll_interval).await;
        }
    }
}
