//! Recording lifecycle.
//!
//! [`RecordingController`] ties together the upstream feed client, which
//! appends raw frames to a capture file, and the pipeline that tails that
//! same file into the shared [`StateAggregator`].
//!
//! ```text
//!   FeedClient ──appends──▶ capture file ──▶ FileTailer ──▶ LineDecoder ──▶ StateAggregator
//!   (feed task)                               (pipeline task, cancellable)
//! ```
//!
//! The controller is idle, recording or stopping. `start` resets the
//! aggregator and spawns both tasks; `stop` cancels the pipeline and asks the
//! feed task to finish. The feed task gets a grace period: a client stuck
//! inside blocking network I/O may not observe cancellation, and `stop`
//! reports that outcome instead of claiming the connection closed.
//!
//! The session lock is only held to inspect or swap handles. Waiting for
//! tasks to exit happens outside it, so `status` and `tail_log` stay
//! responsive while a stop drains.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::aggregator::StateAggregator;
use crate::config::RecorderConfig;
use crate::decode::LineDecoder;
use crate::driver::{Driver, DriverChannels, PipelineProgress};
use crate::providers::FileTailer;
use crate::{LiveTimingError, Result};

/// How long `stop` waits for the pipeline's current poll cycle
const PIPELINE_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Upstream feed connection.
///
/// Implementations connect to the live timing service and append every
/// received frame, one per line, to `capture`. `run` resolves when the
/// connection ends. It should return promptly once `cancel` fires; if it
/// cannot (for example while blocked on a socket), `stop` reports the feed as
/// still draining.
#[async_trait::async_trait]
pub trait FeedClient: Send + Sync + 'static {
    async fn run(&self, capture: PathBuf, cancel: CancellationToken) -> Result<()>;
}

/// Lifecycle state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderState {
    Idle,
    Recording,
    /// `stop` is waiting for the pipeline and feed tasks to exit
    Stopping,
}

/// Result of a successful `start`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartOutcome {
    pub status: &'static str,
    pub message: String,
    pub file: PathBuf,
}

/// Result of a successful `stop`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopOutcome {
    pub status: &'static str,
    pub message: String,
    /// Whether the feed task was seen to exit within the grace period
    pub feed_stopped: bool,
}

/// Recorder status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecorderStatus {
    pub is_recording: bool,
    pub current_file: Option<PathBuf>,
    pub start_time: Option<DateTime<Utc>>,
    /// Seconds since start while recording, otherwise 0
    pub duration: f64,
    pub cars_tracked: usize,
    pub pipeline: Option<PipelineProgress>,
}

/// Last lines of the capture file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogTail {
    /// Decoded documents, or the trimmed raw text where decoding failed
    pub lines: Vec<Value>,
    pub file: PathBuf,
    pub count: usize,
    pub total_lines: usize,
}

struct FeedHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Task handles detached from a session, awaited without the session lock.
struct Teardown {
    pipeline: Option<DriverChannels>,
    feed: Option<FeedHandle>,
}

impl Teardown {
    /// Stop the pipeline, then give the feed `grace` to exit before aborting it.
    ///
    /// Returns whether the feed task was seen to exit.
    async fn run(self, grace: Duration) -> bool {
        if let Some(pipeline) = self.pipeline {
            pipeline.shutdown(PIPELINE_STOP_TIMEOUT).await;
        }
        let Some(FeedHandle { cancel, mut task }) = self.feed else {
            return true;
        };
        cancel.cancel();
        match tokio::time::timeout(grace, &mut task).await {
            Ok(_) => true,
            Err(_) => {
                warn!("Feed task still running after {:?}; aborting", grace);
                task.abort();
                false
            }
        }
    }
}

/// One recording: created by `start`, kept after `stop` for status and log tail.
struct RecordingSession {
    file: PathBuf,
    started_at: DateTime<Utc>,
    /// Cleared when the feed task exits for any reason
    feed_alive: Arc<AtomicBool>,
    pipeline: Option<DriverChannels>,
    feed: Option<FeedHandle>,
    /// Set while a detached teardown is still running
    stopping: bool,
}

impl RecordingSession {
    /// Both halves must be alive: a feed that disconnected or a pipeline that
    /// gave up waiting for the capture file ends the recording.
    fn is_recording(&self) -> bool {
        self.feed_alive.load(Ordering::SeqCst)
            && self.pipeline.as_ref().is_some_and(|pipeline| !pipeline.is_finished())
    }

    /// Take the task handles out and mark the session as stopping.
    fn detach(&mut self) -> Teardown {
        self.stopping = true;
        self.feed_alive.store(false, Ordering::SeqCst);
        Teardown { pipeline: self.pipeline.take(), feed: self.feed.take() }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if let Some(feed) = &self.feed {
            feed.cancel.cancel();
        }
    }
}

/// Coordinates recordings and owns the shared aggregator.
///
/// Construct one per process and share it (`Arc`) with request handlers.
pub struct RecordingController {
    config: RecorderConfig,
    aggregator: Arc<StateAggregator>,
    feed: Arc<dyn FeedClient>,
    session: Arc<Mutex<Option<RecordingSession>>>,
}

impl RecordingController {
    /// Create a controller with a fresh aggregator.
    ///
    /// Creates the output directory if it does not exist.
    pub fn new(config: RecorderConfig, feed: Arc<dyn FeedClient>) -> Result<Self> {
        Self::with_aggregator(config, feed, Arc::new(StateAggregator::new()))
    }

    /// Create a controller around an existing aggregator
    pub fn with_aggregator(
        config: RecorderConfig,
        feed: Arc<dyn FeedClient>,
        aggregator: Arc<StateAggregator>,
    ) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.output_dir)
            .map_err(|e| LiveTimingError::file_error(config.output_dir.clone(), e))?;
        Ok(Self { config, aggregator, feed, session: Arc::new(Mutex::new(None)) })
    }

    /// Shared aggregator for read projections
    pub fn aggregator(&self) -> &Arc<StateAggregator> {
        &self.aggregator
    }

    /// Active configuration
    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Current lifecycle state
    pub async fn state(&self) -> RecorderState {
        match self.session.lock().await.as_ref() {
            Some(session) if session.stopping => RecorderState::Stopping,
            Some(session) if session.is_recording() => RecorderState::Recording,
            _ => RecorderState::Idle,
        }
    }

    /// Start a new recording.
    ///
    /// Fails with [`LiveTimingError::AlreadyRecording`] unless idle. Without
    /// a filename, a timestamped one is generated.
    pub async fn start(&self, filename: Option<&str>) -> Result<StartOutcome> {
        let name = {
            let mut guard = self.session.lock().await;
            let previous = guard.as_mut();
            if previous.as_ref().is_some_and(|s| s.stopping || s.is_recording()) {
                return Err(LiveTimingError::AlreadyRecording);
            }
            let name = capture_file_name(filename, Utc::now())?;

            // A session that ended on its own still owns handles to release
            if let Some(previous) = previous {
                let teardown = previous.detach();
                drop(guard);
                self.spawn_teardown(teardown, Duration::ZERO).await.ok();
            }
            name
        };

        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(|e| LiveTimingError::file_error(self.config.output_dir.clone(), e))?;
        let file = self.config.output_dir.join(name);

        let mut guard = self.session.lock().await;
        if guard.as_ref().is_some_and(|s| s.stopping || s.is_recording()) {
            return Err(LiveTimingError::AlreadyRecording);
        }

        self.aggregator.reset();

        let feed_alive = Arc::new(AtomicBool::new(true));
        let feed = self.spawn_feed(file.clone(), Arc::clone(&feed_alive));

        let tailer = FileTailer::from_config(&file, &self.config);
        let pipeline = Driver::spawn(
            tailer,
            LineDecoder::default(),
            Arc::clone(&self.aggregator),
            self.config.max_pipeline_errors,
        );

        *guard = Some(RecordingSession {
            file: file.clone(),
            started_at: Utc::now(),
            feed_alive,
            pipeline: Some(pipeline),
            feed: Some(feed),
            stopping: false,
        });

        info!("Started recording live timing to {}", file.display());
        Ok(StartOutcome { status: "success", message: "Recording started".to_string(), file })
    }

    /// Run a teardown on its own task and clear the stopping mark when done.
    ///
    /// The teardown finishes even if the caller stops waiting for it.
    fn spawn_teardown(&self, teardown: Teardown, grace: Duration) -> JoinHandle<bool> {
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            let feed_stopped = teardown.run(grace).await;
            if let Some(session) = session.lock().await.as_mut() {
                session.stopping = false;
            }
            feed_stopped
        })
    }

    fn spawn_feed(&self, file: PathBuf, alive: Arc<AtomicBool>) -> FeedHandle {
        let cancel = CancellationToken::new();
        let client = Arc::clone(&self.feed);
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            match client.run(file, token).await {
                Ok(()) => info!("Live timing feed stopped"),
                Err(e) => error!("Live timing feed error: {}", e),
            }
            alive.store(false, Ordering::SeqCst);
        });
        FeedHandle { cancel, task }
    }

    /// Stop the current recording.
    ///
    /// Fails with [`LiveTimingError::NotRecording`] when idle. The pipeline is
    /// always stopped; the feed task is cancelled and given
    /// `feed_shutdown_grace` to exit before being aborted.
    pub async fn stop(&self) -> Result<StopOutcome> {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return Err(LiveTimingError::NotRecording);
        };
        if session.stopping {
            return Err(LiveTimingError::NotRecording);
        }
        let was_recording = session.is_recording();
        let file = session.file.clone();
        let teardown = session.detach();
        drop(guard);

        if !was_recording {
            self.spawn_teardown(teardown, Duration::ZERO).await.ok();
            return Err(LiveTimingError::NotRecording);
        }

        let feed_stopped = self
            .spawn_teardown(teardown, self.config.feed_shutdown_grace)
            .await
            .unwrap_or_else(|e| {
                error!("Recording teardown failed: {}", e);
                false
            });

        let message = if feed_stopped {
            "Recording stopped".to_string()
        } else {
            "Recording marked as stopped; upstream feed may still be draining".to_string()
        };
        info!(feed_stopped, "Stopped recording {}", file.display());
        Ok(StopOutcome { status: "success", message, feed_stopped })
    }

    /// Current status. Has no side effects.
    pub async fn status(&self) -> RecorderStatus {
        let guard = self.session.lock().await;
        let session = guard.as_ref();
        let is_recording = session.is_some_and(RecordingSession::is_recording);
        let duration = match session {
            Some(session) if is_recording => {
                (Utc::now() - session.started_at).num_milliseconds().max(0) as f64 / 1000.0
            }
            _ => 0.0,
        };

        RecorderStatus {
            is_recording,
            current_file: session.map(|s| s.file.clone()),
            start_time: session.map(|s| s.started_at),
            duration,
            cars_tracked: self.aggregator.cars_tracked(),
            pipeline: session.and_then(|s| s.pipeline.as_ref()).map(DriverChannels::current_progress),
        }
    }

    /// Last `lines` lines of the current capture file (config default when `None`).
    pub async fn tail_log(&self, lines: Option<usize>) -> Result<LogTail> {
        let file = {
            let guard = self.session.lock().await;
            guard.as_ref().map(|s| s.file.clone()).ok_or(LiveTimingError::NoCaptureFile)?
        };
        let bytes = match tokio::fs::read(&file).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LiveTimingError::NoCaptureFile);
            }
            Err(e) => return Err(LiveTimingError::file_error(file, e)),
        };

        let text = String::from_utf8_lossy(&bytes);
        let all: Vec<&str> = text.lines().collect();
        let wanted = lines.unwrap_or(self.config.log_tail_default).min(all.len());
        let decoder = LineDecoder::default();
        let lines: Vec<Value> = all[all.len() - wanted..]
            .iter()
            .map(|line| {
                decoder.parse_document(line).unwrap_or_else(|| Value::String(line.trim().to_string()))
            })
            .collect();

        Ok(LogTail { count: lines.len(), lines, file, total_lines: all.len() })
    }
}

/// Resolve the capture file name for a recording.
///
/// Names get a `.json` suffix if missing; anything that is not a single plain
/// path component is rejected.
pub fn capture_file_name(requested: Option<&str>, now: DateTime<Utc>) -> Result<String> {
    let name = match requested.map(str::trim) {
        None | Some("") => return Ok(format!("live_timing_{}.json", now.format("%Y%m%d_%H%M%S"))),
        Some(name) => name,
    };

    let mut components = Path::new(name).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !plain || name.contains(['/', '\\']) {
        return Err(LiveTimingError::InvalidFilename { name: name.to_string() });
    }

    Ok(if name.ends_with(".json") { name.to_string() } else { format!("{name}.json") })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_name_is_timestamped() {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 15, 4, 5).unwrap();
        assert_eq!(capture_file_name(None, now).unwrap(), "live_timing_20240302_150405.json");
        assert_eq!(capture_file_name(Some("  "), now).unwrap(), "live_timing_20240302_150405.json");
    }

    #[test]
    fn supplied_names_gain_a_json_suffix() {
        let now = Utc::now();
        assert_eq!(capture_file_name(Some("bahrain_fp1"), now).unwrap(), "bahrain_fp1.json");
        assert_eq!(capture_file_name(Some("race.json"), now).unwrap(), "race.json");
    }

    #[test]
    fn names_escaping_the_output_dir_are_rejected() {
        let now = Utc::now();
        for name in ["../etc/passwd", "a/b", "..", "/abs.json", "sub\\x.json", "."] {
            assert!(
                matches!(
                    capture_file_name(Some(name), now),
                    Err(LiveTimingError::InvalidFilename { .. })
                ),
                "{name} should be rejected"
            );
        }
    }
}
