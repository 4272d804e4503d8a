//! Leaderboard and snapshot projections served to readers

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::state::CarState;

/// One row of the leaderboard.
///
/// Common timing fields are lifted out of the raw car state for convenience;
/// `raw` carries the full accumulated state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub driver_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap_to_leader: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_lap_time: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_lap_time: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sectors: Option<Value>,
    pub raw: CarState,
}

impl LeaderboardEntry {
    /// Project one car's state into a leaderboard row
    pub fn from_car(driver_number: &str, car: &CarState) -> Self {
        let field = |name: &str| car.get(name).cloned();
        Self {
            driver_number: driver_number.to_string(),
            position: field("Position"),
            gap_to_leader: field("GapToLeader"),
            interval: field("IntervalToPositionAhead"),
            best_lap_time: field("BestLapTime"),
            last_lap_time: field("LastLapTime"),
            sectors: field("Sectors"),
            raw: car.clone(),
        }
    }

    /// Numeric race position, if the car has a parseable one.
    ///
    /// The feed sends positions as strings (`"3"`); bare integers are accepted too.
    pub fn numeric_position(&self) -> Option<i64> {
        match self.position.as_ref()? {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Sort key placing cars without a usable position after every real one.
    pub(crate) fn sort_key(&self) -> (bool, i64) {
        match self.numeric_position() {
            Some(position) => (false, position),
            None => (true, 0),
        }
    }
}

/// Point-in-time view of one state field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot<T> {
    pub data: T,
    pub last_updated: DateTime<Utc>,
}

/// Point-in-time leaderboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardSnapshot {
    pub entries: Vec<LeaderboardEntry>,
    pub count: usize,
    pub last_updated: DateTime<Utc>,
}

impl LeaderboardSnapshot {
    /// Wrap sorted entries with their timestamp
    pub fn new(entries: Vec<LeaderboardEntry>, last_updated: DateTime<Utc>) -> Self {
        Self { count: entries.len(), entries, last_updated }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CategoryUpdate, RaceState};
    use serde_json::json;

    #[test]
    fn positions_sort_numerically_with_missing_last() {
        let mut state = RaceState::new();
        state.apply(CategoryUpdate::new(
            "TimingData",
            json!({"Lines": {
                "11": {"Position": "3"},
                "1": {"Position": "1"},
                "4": {"GapToLeader": "+3.2"},
                "16": {"Position": "2"},
            }}),
        ));

        let order: Vec<_> =
            state.leaderboard().into_iter().map(|e| e.driver_number).collect();
        assert_eq!(order, ["1", "16", "11", "4"]);
    }

    #[test]
    fn double_digit_positions_sort_numerically_not_lexically() {
        let mut state = RaceState::new();
        state.apply(CategoryUpdate::new(
            "TimingData",
            json!({"Lines": {"a": {"Position": "10"}, "b": {"Position": "9"}, "c": {"Position": 2}}}),
        ));
        let order: Vec<_> =
            state.leaderboard().into_iter().map(|e| e.driver_number).collect();
        assert_eq!(order, ["c", "b", "a"]);
    }

    #[test]
    fn unparseable_positions_sort_last() {
        let mut state = RaceState::new();
        state.apply(CategoryUpdate::new(
            "TimingData",
            json!({"Lines": {"7": {"Position": "DNF"}, "8": {"Position": "20"}}}),
        ));
        let order: Vec<_> =
            state.leaderboard().into_iter().map(|e| e.driver_number).collect();
        assert_eq!(order, ["8", "7"]);
    }

    #[test]
    fn entries_lift_common_fields_and_keep_raw_state() {
        let car: CarState = serde_json::from_value(json!({
            "Position": "1",
            "GapToLeader": "",
            "IntervalToPositionAhead": {"Value": ""},
            "BestLapTime": {"Value": "1:32.608"},
            "LastLapTime": {"Value": "1:33.001"},
            "Sectors": {"0": {"Value": "28.1"}},
            "NumberOfLaps": 12,
        }))
        .unwrap();

        let entry = LeaderboardEntry::from_car("44", &car);
        assert_eq!(entry.position, Some(json!("1")));
        assert_eq!(entry.interval, Some(json!({"Value": ""})));
        assert_eq!(entry.best_lap_time, Some(json!({"Value": "1:32.608"})));
        assert_eq!(entry.sectors, Some(json!({"0": {"Value": "28.1"}})));
        assert_eq!(entry.raw["NumberOfLaps"], 12);
    }

    #[test]
    fn missing_fields_are_omitted_from_json() {
        let entry = LeaderboardEntry::from_car("3", &CarState::new());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, json!({"driver_number": "3", "raw": {}}));
    }
}
