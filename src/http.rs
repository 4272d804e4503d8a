//! Operator HTTP surface
//!
//! Thin axum handlers over a shared [`RecordingController`]. Every success
//! response is `{"data": ..., "meta": {...}}`; failures are
//! `{"status": "error", "code": ..., "message": ...}` with a 4xx/5xx status.
//!
//! ```rust,no_run
//! use paddock::{RecorderConfig, RecordingController, http};
//! use std::sync::Arc;
//!
//! # async fn example(feed: Arc<dyn paddock::FeedClient>) -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = Arc::new(RecordingController::new(RecorderConfig::default(), feed)?);
//! let app = http::router(recorder);
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

use crate::recorder::{LogTail, RecorderStatus, RecordingController, StartOutcome, StopOutcome};
use crate::types::{LeaderboardEntry, Snapshot};
use crate::LiveTimingError;

type SharedRecorder = Arc<RecordingController>;

/// Success body
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: T,
    pub meta: Value,
}

impl<T: Serialize> Envelope<T> {
    fn new(data: T, meta: Value) -> Json<Self> {
        Json(Self { data, meta })
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    code: &'static str,
    message: String,
}

impl IntoResponse for LiveTimingError {
    fn into_response(self) -> Response {
        let status = match &self {
            LiveTimingError::AlreadyRecording
            | LiveTimingError::NotRecording
            | LiveTimingError::InvalidFilename { .. }
            | LiveTimingError::Config { .. } => StatusCode::BAD_REQUEST,
            LiveTimingError::NoCaptureFile => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("Live timing request failed: {}", self);
        }
        let body = ErrorBody { status: "error", code: self.code(), message: self.to_string() };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<Envelope<T>>, LiveTimingError>;

#[derive(Debug, Deserialize)]
struct StartParams {
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogParams {
    lines: Option<usize>,
}

/// Build the `/live/*` router
pub fn router(recorder: SharedRecorder) -> Router {
    Router::new()
        .route("/live/start", post(start_recording))
        .route("/live/stop", post(stop_recording))
        .route("/live/status", get(recorder_status))
        .route("/live/leaderboard", get(leaderboard))
        .route("/live/weather", get(weather))
        .route("/live/track-status", get(track_status))
        .route("/live/session-status", get(session_status))
        .route("/live/lap-count", get(lap_count))
        .route("/live/log", get(capture_log))
        .with_state(recorder)
}

async fn start_recording(
    State(recorder): State<SharedRecorder>,
    Query(params): Query<StartParams>,
) -> ApiResult<StartOutcome> {
    let outcome = recorder.start(params.filename.as_deref()).await?;
    Ok(Envelope::new(outcome, json!({"action": "start_recording"})))
}

async fn stop_recording(State(recorder): State<SharedRecorder>) -> ApiResult<StopOutcome> {
    let outcome = recorder.stop().await?;
    Ok(Envelope::new(outcome, json!({"action": "stop_recording"})))
}

async fn recorder_status(State(recorder): State<SharedRecorder>) -> ApiResult<RecorderStatus> {
    Ok(Envelope::new(recorder.status().await, json!({"action": "get_status"})))
}

async fn leaderboard(State(recorder): State<SharedRecorder>) -> ApiResult<Vec<LeaderboardEntry>> {
    let board = recorder.aggregator().leaderboard();
    let meta = json!({"last_updated": board.last_updated, "count": board.count});
    Ok(Envelope::new(board.entries, meta))
}

fn snapshot(view: Snapshot<Value>) -> ApiResult<Value> {
    Ok(Envelope::new(view.data, json!({"last_updated": view.last_updated})))
}

async fn weather(State(recorder): State<SharedRecorder>) -> ApiResult<Value> {
    snapshot(recorder.aggregator().weather())
}

async fn track_status(State(recorder): State<SharedRecorder>) -> ApiResult<Value> {
    snapshot(recorder.aggregator().track_status())
}

async fn session_status(State(recorder): State<SharedRecorder>) -> ApiResult<Value> {
    snapshot(recorder.aggregator().session_status())
}

async fn lap_count(State(recorder): State<SharedRecorder>) -> ApiResult<Value> {
    snapshot(recorder.aggregator().lap_count())
}

async fn capture_log(
    State(recorder): State<SharedRecorder>,
    Query(params): Query<LogParams>,
) -> ApiResult<Vec<Value>> {
    let LogTail { lines, file, count, total_lines } = recorder.tail_log(params.lines).await?;
    Ok(Envelope::new(lines, json!({"file": file, "count": count, "total_lines": total_lines})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::FeedClient;
    use crate::{RecorderConfig, Result};
    use axum::body::Body;
    use axum::http::Request;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    /// Writes a fixed set of frames, then idles until cancelled.
    struct CannedFeed(Vec<String>);

    #[async_trait::async_trait]
    impl FeedClient for CannedFeed {
        async fn run(&self, capture: PathBuf, cancel: CancellationToken) -> Result<()> {
            let mut file = tokio::fs::File::create(&capture).await?;
            for line in &self.0 {
                file.write_all(format!("{line}\n").as_bytes()).await?;
            }
            file.flush().await?;
            cancel.cancelled().await;
            Ok(())
        }
    }

    fn recorder(dir: &std::path::Path) -> SharedRecorder {
        let frames = vec![
            json!({"M": [{"M": "feed", "A": ["TimingData", {"Lines": {"44": {"Position": "1"}, "1": {"Position": "2"}}}]}]})
                .to_string(),
            json!({"M": [{"M": "feed", "A": ["WeatherData", {"AirTemp": "27.5"}]}]}).to_string(),
        ];
        let config = RecorderConfig::default()
            .with_output_dir(dir)
            .with_poll_interval(Duration::from_millis(5));
        Arc::new(RecordingController::new(config, Arc::new(CannedFeed(frames))).unwrap())
    }

    async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn recording_lifecycle_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder(dir.path());
        let app = router(Arc::clone(&recorder));

        let (status, body) = call(&app, "POST", "/live/start?filename=test_run").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "success");
        assert!(body["data"]["file"].as_str().unwrap().ends_with("test_run.json"));

        let (status, body) = call(&app, "POST", "/live/start").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "already_recording");

        tokio::time::timeout(Duration::from_secs(5), async {
            let aggregator = recorder.aggregator();
            while aggregator.cars_tracked() < 2 || aggregator.weather().data == json!({}) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("pipeline should ingest the canned frames");

        let (_, body) = call(&app, "GET", "/live/leaderboard").await;
        assert_eq!(body["meta"]["count"], 2);
        assert_eq!(body["data"][0]["driver_number"], "44");
        assert_eq!(body["data"][1]["driver_number"], "1");

        let (_, body) = call(&app, "GET", "/live/weather").await;
        assert_eq!(body["data"]["AirTemp"], "27.5");
        assert!(body["meta"]["last_updated"].is_string());

        let (_, body) = call(&app, "GET", "/live/status").await;
        assert_eq!(body["data"]["is_recording"], true);
        assert_eq!(body["data"]["cars_tracked"], 2);

        let (_, body) = call(&app, "GET", "/live/log?lines=1").await;
        assert_eq!(body["meta"]["count"], 1);
        assert_eq!(body["meta"]["total_lines"], 2);
        assert_eq!(body["data"][0]["M"][0]["A"][0], "WeatherData");

        let (status, body) = call(&app, "POST", "/live/stop").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["feed_stopped"], true);

        let (status, body) = call(&app, "POST", "/live/stop").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], "not_recording");
    }

    #[tokio::test]
    async fn log_without_a_recording_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(recorder(dir.path()));

        let (status, body) = call(&app, "GET", "/live/log").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "no_capture_file");
    }

    #[tokio::test]
    async fn invalid_filenames_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(recorder(dir.path()));

        let (status, body) = call(&app, "POST", "/live/start?filename=..%2Fescape").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_filename");

        let (_, body) = call(&app, "GET", "/live/status").await;
        assert_eq!(body["data"]["is_recording"], false);
    }

    #[tokio::test]
    async fn empty_projections_before_any_recording() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(recorder(dir.path()));

        for uri in ["/live/weather", "/live/track-status", "/live/session-status", "/live/lap-count"] {
            let (status, body) = call(&app, "GET", uri).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["data"], json!({}));
        }
        let (_, body) = call(&app, "GET", "/live/leaderboard").await;
        assert_eq!(body["data"], json!([]));
    }
}
