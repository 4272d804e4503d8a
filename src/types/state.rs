//! Canonical race state and its per-category merge policy

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::trace;

use super::leaderboard::LeaderboardEntry;
use super::update::{Category, CategoryUpdate};
use super::value::merge_into;

/// Per-entity nested state (position, gaps, lap and sector times, stints...).
pub type CarState = Map<String, Value>;

/// Aggregate root for one recording.
///
/// `weather`, `track_status`, `session_status` and `lap_count` are replaced
/// wholesale by each update of their category. `cars` accumulates partial
/// timing updates through a deep merge.
#[derive(Debug, Clone, Serialize)]
pub struct RaceState {
    /// Entity id (car number) to accumulated state
    pub cars: BTreeMap<String, CarState>,
    pub weather: Value,
    pub track_status: Value,
    pub session_status: Value,
    pub lap_count: Value,
    pub last_updated: DateTime<Utc>,
}

impl Default for RaceState {
    fn default() -> Self {
        Self {
            cars: BTreeMap::new(),
            weather: empty(),
            track_status: empty(),
            session_status: empty(),
            lap_count: empty(),
            last_updated: Utc::now(),
        }
    }
}

fn empty() -> Value {
    Value::Object(Map::new())
}

impl RaceState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every field and restart the `last_updated` clock.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Apply one decoded update.
    ///
    /// Returns `false` for categories that are not aggregated; those leave the
    /// state, including `last_updated`, untouched.
    pub fn apply(&mut self, update: CategoryUpdate) -> bool {
        let kind = update.kind();
        match kind {
            Category::SessionStatus => self.session_status = update.payload,
            Category::TrackStatus => self.track_status = update.payload,
            Category::WeatherData => self.weather = update.payload,
            Category::LapCount => self.lap_count = update.payload,
            Category::TimingData => self.merge_timing(update.payload),
            Category::TimingAppData => self.copy_app_data(update.payload),
            Category::Other(name) => {
                trace!(category = %name, "Ignoring unaggregated category");
                return false;
            }
        }
        self.last_updated = Utc::now();
        true
    }

    fn merge_timing(&mut self, payload: Value) {
        for (entity, partial) in lines(payload) {
            match partial {
                Value::Object(partial) => {
                    merge_into(self.cars.entry(entity).or_default(), partial);
                }
                other => trace!(%entity, ?other, "Skipping non-object timing line"),
            }
        }
    }

    fn copy_app_data(&mut self, payload: Value) {
        for (entity, partial) in lines(payload) {
            let Value::Object(mut partial) = partial else {
                trace!(%entity, "Skipping non-object timing app line");
                continue;
            };
            let car = self.cars.entry(entity).or_default();
            for field in ["Stints", "Line"] {
                if let Some(value) = partial.remove(field) {
                    car.insert(field.to_string(), value);
                }
            }
        }
    }

    /// Sorted leaderboard projection. Does not modify the state.
    ///
    /// Cars are ordered by numeric position; cars without a usable position
    /// come last. Ties, including every car without a position, keep
    /// entity-id order, which compares ids as strings (`"10"` before `"9"`),
    /// not the order cars first appeared on the feed.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self
            .cars
            .iter()
            .map(|(entity, car)| LeaderboardEntry::from_car(entity, car))
            .collect();
        entries.sort_by_key(LeaderboardEntry::sort_key);
        entries
    }
}

/// Take the `Lines` map out of a line-keyed payload.
fn lines(payload: Value) -> Map<String, Value> {
    match payload {
        Value::Object(mut body) => match body.remove("Lines") {
            Some(Value::Object(lines)) => lines,
            _ => Map::new(),
        },
        _ => Map::new(),
    }
}
