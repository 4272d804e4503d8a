//! Core types for live-timing state.
//!
//! ## Architecture
//!
//! - [`CategoryUpdate`] is one decoded `(category, payload)` pair from the feed
//! - [`RaceState`] is the aggregate root, applying updates with a per-[`Category`] policy
//! - [`value::merge`] is the recursive merge used for partial timing updates
//! - [`LeaderboardEntry`] and [`Snapshot`] are the read projections handed to callers
//!
//! ## Usage Example
//!
//! ```rust
//! use paddock::types::{CategoryUpdate, RaceState};
//! use serde_json::json;
//!
//! let mut state = RaceState::new();
//! state.apply(CategoryUpdate::new("TimingData", json!({"Lines": {"44": {"Position": "1"}}})));
//! state.apply(CategoryUpdate::new(
//!     "TimingData",
//!     json!({"Lines": {"44": {"Sectors": {"0": {"Value": "28.1"}}}}}),
//! ));
//!
//! let board = state.leaderboard();
//! assert_eq!(board[0].driver_number, "44");
//! assert_eq!(board[0].position, Some(json!("1")));
//! assert_eq!(board[0].raw["Sectors"]["0"]["Value"], "28.1");
//! ```

mod leaderboard;
mod state;
mod update;
mod update_rate;
pub mod value;

pub use leaderboard::*;
pub use state::*;
pub use update::*;
pub use update_rate::*;
