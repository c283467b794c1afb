//! Behavior observation records consumed by the DNA encoder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of tracked behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorCategory {
    Health,
    Fitness,
    Mindfulness,
    Productivity,
    Learning,
    Creativity,
    Social,
    Finance,
}

impl BehaviorCategory {
    /// All categories in ordinal order.
    pub const ALL: [BehaviorCategory; 8] = [
        BehaviorCategory::Health,
        BehaviorCategory::Fitness,
        BehaviorCategory::Mindfulness,
        BehaviorCategory::Productivity,
        BehaviorCategory::Learning,
        BehaviorCategory::Creativity,
        BehaviorCategory::Social,
        BehaviorCategory::Finance,
    ];

    /// Stable ordinal (0..8).
    pub fn ordinal(self) -> u32 {
        match self {
            BehaviorCategory::Health => 0,
            BehaviorCategory::Fitness => 1,
            BehaviorCategory::Mindfulness => 2,
            BehaviorCategory::Productivity => 3,
            BehaviorCategory::Learning => 4,
            BehaviorCategory::Creativity => 5,
            BehaviorCategory::Social => 6,
            BehaviorCategory::Finance => 7,
        }
    }

    /// Typical tracking frequency weight. Always >= 1.
    pub fn frequency_weight(self) -> f64 {
        match self {
            BehaviorCategory::Health => 1.0,
            BehaviorCategory::Fitness => 1.5,
            BehaviorCategory::Mindfulness => 2.0,
            BehaviorCategory::Productivity => 1.2,
            BehaviorCategory::Learning => 1.8,
            BehaviorCategory::Creativity => 3.0,
            BehaviorCategory::Social => 2.5,
            BehaviorCategory::Finance => 1.3,
        }
    }
}

/// Immutable snapshot of one tracked behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorRecord {
    /// Stable identifier; its hash seeds the sequence shuffle.
    pub id: String,
    pub category: BehaviorCategory,
    /// When tracking began.
    pub start_date: DateTime<Utc>,
    /// Fraction of periods completed (0.0-1.0).
    pub completion_rate: f64,
    /// Current consecutive-day streak.
    pub streak_days: u32,
    /// Effort level (0.0-1.0).
    pub intensity: f64,
    /// Trend of improvement (0.0-1.0).
    pub growth_rate: f64,
    /// One entry per tracked period, oldest first.
    #[serde(default)]
    pub history: Vec<bool>,
    /// Completion events, oldest first.
    #[serde(default)]
    pub timestamps: Vec<DateTime<Utc>>,
    /// Preferred hour of day (0-23).
    #[serde(default)]
    pub time_of_day: Option<u32>,
}

impl BehaviorRecord {
    /// Create a record with empty history and no timestamps.
    pub fn new(id: impl Into<String>, category: BehaviorCategory, start_date: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            category,
            start_date,
            completion_rate: 0.0,
            streak_days: 0,
            intensity: 0.0,
            growth_rate: 0.0,
            history: Vec::new(),
            timestamps: Vec::new(),
            time_of_day: None,
        }
    }
}
