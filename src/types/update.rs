//! Decoded feed updates and their categories

use serde::Serialize;
use serde_json::Value;

/// Named class of a feed update, which decides how it is merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    SessionStatus,
    TrackStatus,
    WeatherData,
    LapCount,
    TimingData,
    TimingAppData,
    /// Any category this crate does not aggregate. Kept so newer feed
    /// categories pass through the decoder untouched.
    Other(String),
}

impl Category {
    /// Classify a raw category name from the feed.
    pub fn from_name(name: &str) -> Self {
        match name {
            "SessionStatus" => Category::SessionStatus,
            "TrackStatus" => Category::TrackStatus,
            "WeatherData" => Category::WeatherData,
            "LapCount" => Category::LapCount,
            "TimingData" => Category::TimingData,
            "TimingAppData" => Category::TimingAppData,
            other => Category::Other(other.to_string()),
        }
    }

    /// The category name as it appears on the feed.
    pub fn as_str(&self) -> &str {
        match self {
            Category::SessionStatus => "SessionStatus",
            Category::TrackStatus => "TrackStatus",
            Category::WeatherData => "WeatherData",
            Category::LapCount => "LapCount",
            Category::TimingData => "TimingData",
            Category::TimingAppData => "TimingAppData",
            Category::Other(name) => name,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(category, payload)` pair decoded from a captured feed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryUpdate {
    /// Raw category name
    pub category: String,

    /// Update body, either line-keyed (`{"Lines": {...}}`) or a flat object
    pub payload: Value,
}

impl CategoryUpdate {
    /// Create a new update
    pub fn new(category: impl Into<String>, payload: Value) -> Self {
        Self { category: category.into(), payload }
    }

    /// Classified category
    pub fn kind(&self) -> Category {
        Category::from_name(&self.category)
    }
}
