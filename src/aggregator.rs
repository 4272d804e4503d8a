//! Shared race-state aggregator
//!
//! One [`StateAggregator`] exists per process. The pipeline task is its only
//! writer; HTTP handlers and other readers take short read guards and get
//! owned projections back, so no caller ever holds the guard across I/O.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info};

use crate::decode::LineDecoder;
use crate::driver::{Driver, PipelineProgress};
use crate::providers::CaptureReplay;
use crate::stream::ThrottleExt;
use crate::types::{CategoryUpdate, LeaderboardSnapshot, RaceState, Snapshot, UpdateRate};
use crate::Result;

/// Owns the canonical [`RaceState`] and serves consistent projections of it.
///
/// Every update is applied under a single write guard, so a reader sees each
/// field either entirely before or entirely after an update.
#[derive(Debug)]
pub struct StateAggregator {
    state: RwLock<RaceState>,
    /// Bumped after every applied update and every reset
    revision: watch::Sender<u64>,
}

impl Default for StateAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StateAggregator {
    /// Create an aggregator with empty state
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self { state: RwLock::new(RaceState::new()), revision }
    }

    // Merges only ever insert whole values, so state behind a poisoned guard is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, RaceState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RaceState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    /// Apply one update by category name.
    ///
    /// Returns whether the category is aggregated. Unknown categories are
    /// ignored and leave `last_updated` unchanged.
    pub fn update(&self, category: &str, payload: Value) -> bool {
        self.apply(CategoryUpdate::new(category, payload))
    }

    /// Apply one decoded update
    pub fn apply(&self, update: CategoryUpdate) -> bool {
        let category = update.category.clone();
        let applied = self.write().apply(update);
        if applied {
            debug!(%category, "Applied live state update");
            self.bump();
        }
        applied
    }

    /// Clear all state ahead of a new recording
    pub fn reset(&self) {
        self.write().reset();
        self.bump();
        info!("Live state reset");
    }

    /// Leaderboard sorted by position, cars without a position last.
    ///
    /// Ties keep entity-id string order; see [`RaceState::leaderboard`].
    pub fn leaderboard(&self) -> LeaderboardSnapshot {
        let state = self.read();
        LeaderboardSnapshot::new(state.leaderboard(), state.last_updated)
    }

    /// Current weather
    pub fn weather(&self) -> Snapshot<Value> {
        self.field(|state| &state.weather)
    }

    /// Current track status (flags, safety car)
    pub fn track_status(&self) -> Snapshot<Value> {
        self.field(|state| &state.track_status)
    }

    /// Current session status
    pub fn session_status(&self) -> Snapshot<Value> {
        self.field(|state| &state.session_status)
    }

    /// Current lap count
    pub fn lap_count(&self) -> Snapshot<Value> {
        self.field(|state| &state.lap_count)
    }

    fn field(&self, select: impl FnOnce(&RaceState) -> &Value) -> Snapshot<Value> {
        let state = self.read();
        Snapshot { data: select(&*state).clone(), last_updated: state.last_updated }
    }

    /// Number of cars with any state
    pub fn cars_tracked(&self) -> usize {
        self.read().cars.len()
    }

    /// Time of the last applied update or reset
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.read().last_updated
    }

    /// Owned copy of the whole state
    pub fn snapshot(&self) -> RaceState {
        self.read().clone()
    }

    /// Current revision counter
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Stream of revision numbers, yielding the current one first.
    ///
    /// With [`UpdateRate::Max`] bursts collapse to the latest revision. Must
    /// be called from within a Tokio runtime when throttling.
    pub fn revisions(&self, rate: UpdateRate) -> BoxStream<'static, u64> {
        let revisions = WatchStream::new(self.revision.subscribe());
        match rate.throttle_interval() {
            None => revisions.boxed(),
            Some(interval) => revisions.throttle(interval).boxed(),
        }
    }

    /// Rebuild state from a finished capture file, applying lines in file order.
    ///
    /// Existing state is kept; call [`reset`](Self::reset) first for a clean rebuild.
    pub async fn ingest_capture<P: AsRef<Path>>(&self, path: P) -> Result<PipelineProgress> {
        let mut replay = CaptureReplay::open(path).await?;
        Driver::ingest(&mut replay, &LineDecoder::default(), self).await
    }
}
