//! Recorder configuration
//!
//! Configuration can be built in code or loaded from YAML. Durations are
//! written in milliseconds:
//!
//! ```yaml
//! output_dir: /var/lib/paddock/captures
//! poll_interval_ms: 100
//! file_wait_timeout_ms: 10000
//! feed_shutdown_grace_ms: 2000
//! max_pipeline_errors: 10
//! log_tail_default: 10
//! ```
//!
//! Every key is optional; missing keys keep their defaults.

use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{LiveTimingError, Result};

/// Settings for the recording controller and its pipeline
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecorderConfig {
    /// Directory capture files are written to
    pub output_dir: PathBuf,

    /// Delay between tail polls, both while waiting for the file and at end of file
    #[serde(rename = "poll_interval_ms", deserialize_with = "millis")]
    pub poll_interval: Duration,

    /// How long the tailer waits for the capture file to be created
    #[serde(rename = "file_wait_timeout_ms", deserialize_with = "millis")]
    pub file_wait_timeout: Duration,

    /// How long `stop` waits for the upstream feed task to exit
    #[serde(rename = "feed_shutdown_grace_ms", deserialize_with = "millis")]
    pub feed_shutdown_grace: Duration,

    /// Consecutive source errors before the pipeline gives up
    pub max_pipeline_errors: u32,

    /// Lines returned by the raw log tail when the caller gives no count
    pub log_tail_default: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("live_data"),
            poll_interval: Duration::from_millis(100),
            file_wait_timeout: Duration::from_secs(10),
            feed_shutdown_grace: Duration::from_secs(2),
            max_pipeline_errors: 10,
            log_tail_default: 10,
        }
    }
}

fn millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

impl RecorderConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| LiveTimingError::config_error(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| LiveTimingError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    /// Check values that would stall or spin the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(LiveTimingError::config_error("poll_interval_ms must be greater than 0"));
        }
        if self.file_wait_timeout < self.poll_interval {
            return Err(LiveTimingError::config_error(
                "file_wait_timeout_ms must be at least poll_interval_ms",
            ));
        }
        if self.max_pipeline_errors == 0 {
            return Err(LiveTimingError::config_error("max_pipeline_errors must be greater than 0"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(LiveTimingError::config_error("output_dir must not be empty"));
        }
        Ok(())
    }

    /// Set the capture output directory
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the tail poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set how long to wait for the capture file to appear
    pub fn with_file_wait_timeout(mut self, timeout: Duration) -> Self {
        self.file_wait_timeout = timeout;
        self
    }

    /// Set the grace period given to the feed task on stop
    pub fn with_feed_shutdown_grace(mut self, grace: Duration) -> Self {
        self.feed_shutdown_grace = grace;
        self
    }
}
