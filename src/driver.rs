//! Driver spawns and manages the tail → decode → aggregate pipeline

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::aggregator::StateAggregator;
use crate::decode::LineDecoder;
use crate::provider::LineSource;
use crate::{LiveTimingError, Result};

/// Counters published by a running pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineProgress {
    /// Lines taken from the source, including undecodable ones
    pub lines_read: u64,
    /// Updates the aggregator accepted
    pub updates_applied: u64,
}

/// Why a pipeline task finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineExit {
    /// Stop signal observed
    Cancelled,
    /// Source reported a normal end
    SourceEnded,
    /// Capture file never appeared
    CaptureTimeout,
    /// Source kept failing
    TooManyErrors,
}

/// Handles to a spawned pipeline
pub struct DriverChannels {
    /// Receiver for progress counters
    pub progress: watch::Receiver<PipelineProgress>,
    /// Cancellation token for cooperative shutdown
    pub cancel: CancellationToken,
    task: JoinHandle<PipelineExit>,
}

impl DriverChannels {
    /// Whether the pipeline task has finished on its own or been stopped
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Latest progress counters
    pub fn current_progress(&self) -> PipelineProgress {
        *self.progress.borrow()
    }

    /// Signal the pipeline to stop and wait for its current cycle to finish.
    ///
    /// Returns `None` if the task did not finish within `timeout`; it is
    /// aborted in that case.
    pub async fn shutdown(mut self, timeout: Duration) -> Option<PipelineExit> {
        self.cancel.cancel();
        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(exit)) => Some(exit),
            Ok(Err(e)) => {
                error!("Pipeline task failed: {}", e);
                None
            }
            Err(_) => {
                warn!("Pipeline did not stop within {:?}, aborting", timeout);
                self.task.abort();
                None
            }
        }
    }
}

impl Drop for DriverChannels {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Driver spawns and manages the ingestion pipeline
///
/// The pipeline is the single writer into the [`StateAggregator`]: lines are
/// decoded and applied strictly in source order, one at a time.
pub struct Driver;

impl Driver {
    /// Spawn the pipeline task for the given source
    ///
    /// Returns a progress receiver and a cancellation token; the stop signal
    /// is checked on every cycle, including while the source is waiting.
    pub fn spawn<S>(
        source: S,
        decoder: LineDecoder,
        aggregator: Arc<StateAggregator>,
        max_errors: u32,
    ) -> DriverChannels
    where
        S: LineSource,
    {
        let (progress_tx, progress_rx) = watch::channel(PipelineProgress::default());
        let cancel = CancellationToken::new();
        let cancel_task = cancel.clone();

        let task = tokio::spawn(async move {
            Self::pipeline_task(source, decoder, aggregator, progress_tx, cancel_task, max_errors)
                .await
        });

        DriverChannels { progress: progress_rx, cancel, task }
    }

    async fn pipeline_task<S>(
        mut source: S,
        decoder: LineDecoder,
        aggregator: Arc<StateAggregator>,
        progress_tx: watch::Sender<PipelineProgress>,
        cancel: CancellationToken,
        max_errors: u32,
    ) -> PipelineExit
    where
        S: LineSource,
    {
        info!("Pipeline task started");
        let mut progress = PipelineProgress::default();
        let mut error_count = 0u32;

        let exit = loop {
            if cancel.is_cancelled() {
                info!("Pipeline cancelled");
                break PipelineExit::Cancelled;
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Pipeline cancelled while waiting for data");
                    break PipelineExit::Cancelled;
                }
                result = source.next_line() => result,
            };

            match result {
                Ok(Some(line)) => {
                    error_count = 0;
                    Self::process_line(&line, &decoder, &aggregator, &mut progress);
                    progress_tx.send_replace(progress);
                }
                Ok(None) => {
                    info!("Source ended after {} lines", progress.lines_read);
                    break PipelineExit::SourceEnded;
                }
                Err(LiveTimingError::CaptureTimeout { path, waited }) => {
                    error!("Capture file {} not created within {:?}", path.display(), waited);
                    break PipelineExit::CaptureTimeout;
                }
                Err(e) => {
                    error_count += 1;
                    error!("Source error ({}/{}): {}", error_count, max_errors, e);

                    if error_count >= max_errors {
                        error!("Too many source errors, shutting down pipeline");
                        break PipelineExit::TooManyErrors;
                    }

                    // Exponential backoff: 50ms, 100ms, 200ms, ...
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break PipelineExit::Cancelled,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        };

        info!(
            lines = progress.lines_read,
            updates = progress.updates_applied,
            "Pipeline task ended ({:?})",
            exit
        );
        exit
    }

    /// Drain a source to its end on the current task.
    ///
    /// Source errors are returned as-is; undecodable lines are skipped.
    pub async fn ingest<S>(
        source: &mut S,
        decoder: &LineDecoder,
        aggregator: &StateAggregator,
    ) -> Result<PipelineProgress>
    where
        S: LineSource,
    {
        let mut progress = PipelineProgress::default();
        while let Some(line) = source.next_line().await? {
            Self::process_line(&line, decoder, aggregator, &mut progress);
        }
        debug!(
            lines = progress.lines_read,
            updates = progress.updates_applied,
            "Finished ingesting capture"
        );
        Ok(progress)
    }

    fn process_line(
        line: &str,
        decoder: &LineDecoder,
        aggregator: &StateAggregator,
        progress: &mut PipelineProgress,
    ) {
        progress.lines_read += 1;
        for update in decoder.decode_all(line) {
            trace!(category = %update.category, "Decoded feed update");
            if aggregator.apply(update) {
                progress.updates_applied += 1;
            }
        }
    }
}
