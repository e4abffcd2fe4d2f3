//! Analytics data types
//!
//! This module defines the interaction events that flow into the engine and the
//! derived snapshots (sessions, patterns, recommendations) that flow out of it.

use crate::error::AnalyticsError;
use crate::settings::SettingsPatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Interaction event types captured from the communication board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    TileClick,
    CategorySwitch,
    EyeTracking,
    VoiceCommand,
    SessionStart,
    SessionEnd,
}

impl InteractionType {
    pub const ALL: [InteractionType; 6] = [
        InteractionType::TileClick,
        InteractionType::CategorySwitch,
        InteractionType::EyeTracking,
        InteractionType::VoiceCommand,
        InteractionType::SessionStart,
        InteractionType::SessionEnd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::TileClick => "tile_click",
            InteractionType::CategorySwitch => "category_switch",
            InteractionType::EyeTracking => "eye_tracking",
            InteractionType::VoiceCommand => "voice_command",
            InteractionType::SessionStart => "session_start",
            InteractionType::SessionEnd => "session_end",
        }
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionType {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InteractionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AnalyticsError::InvalidEvent(format!("unknown interaction type: {s}")))
    }
}

/// Optional payload attached to an interaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    /// Identity of the activated tile
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "tile_id")]
    pub tile_id: Option<String>,
    /// Board category the interaction happened in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Session length in milliseconds (only on `session_end`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    /// Outcome of the interaction (e.g. selection accuracy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "error_type")]
    pub error_type: Option<String>,
    /// Bookmark linking a `session_start` to its `session_end`
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "session_id")]
    pub session_id: Option<Uuid>,
}

impl EventData {
    pub fn tile(tile_id: impl Into<String>) -> Self {
        Self {
            tile_id: Some(tile_id.into()),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }
}

/// An immutable, timestamped interaction fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// Wall-clock instant, persisted as milliseconds since epoch
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: InteractionType,
    #[serde(default)]
    pub data: EventData,
}

impl InteractionEvent {
    pub fn new(timestamp: DateTime<Utc>, event_type: InteractionType, data: EventData) -> Self {
        Self {
            timestamp,
            event_type,
            data,
        }
    }
}

/// A maximal run of events without an inactivity gap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// `end_time - start_time` in milliseconds
    pub duration_ms: i64,
    /// Number of events in the session
    pub event_count: usize,
}

/// Difficulty tier inferred from vocabulary breadth and repetition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLevel {
    Beginner,
    Intermediate,
    Advanced,
}

/// Dominant input modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationStyle {
    Visual,
    Mixed,
}

/// Inferred accessibility needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessibilityNeeds {
    pub needs_larger_tiles: bool,
    pub needs_slower_speech: bool,
    pub needs_high_contrast: bool,
    pub needs_simple_layout: bool,
}

/// Usage profile computed from the trailing analysis window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorPattern {
    /// Most used tiles, most frequent first
    pub preferred_tiles: Vec<String>,
    /// Most used categories, most frequent first
    pub preferred_categories: Vec<String>,
    /// Mean session duration in milliseconds
    pub average_session_time: f64,
    /// Busiest hours of day (0-23), busiest first
    pub peak_usage_times: Vec<u32>,
    pub difficulty_level: DifficultyLevel,
    pub communication_style: CommunicationStyle,
    pub accessibility_needs: AccessibilityNeeds,

    // Intermediate statistics
    /// Fraction of window events that reported `success: false`
    pub error_rate: f64,
    /// Mean gap between consecutive tile clicks in milliseconds
    pub avg_interaction_gap_ms: f64,
    /// Number of events in the analysis window
    pub window_event_count: usize,
    /// Number of sessions in the analysis window
    pub session_count: usize,
    /// When the pattern was computed
    pub computed_at: DateTime<Utc>,
}

/// Kind of change a recommendation proposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    Settings,
    Layout,
    Vocabulary,
    Timing,
}

/// Recommendation priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl FromStr for Priority {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(AnalyticsError::ParseError(format!("unknown priority: {other}"))),
        }
    }
}

/// A scored configuration change derived from the current pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Stable catalog identifier (e.g. `larger-tiles`)
    pub id: String,
    #[serde(rename = "type")]
    pub rec_type: RecommendationType,
    pub priority: Priority,
    pub description: String,
    /// Partial settings patch applied when the recommendation is accepted
    pub action: SettingsPatch,
    /// Self-reported certainty (0-1)
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_interaction_type_serialization() {
        let json = serde_json::to_string(&InteractionType::TileClick).unwrap();
        assert_eq!(json, "\"tile_click\"");

        let parsed: InteractionType = serde_json::from_str("\"voice_command\"").unwrap();
        assert_eq!(parsed, InteractionType::VoiceCommand);
    }

    #[test]
    fn test_interaction_type_from_str() {
        assert_eq!(
            "session_end".parse::<InteractionType>().unwrap(),
            InteractionType::SessionEnd
        );
        assert!("swipe".parse::<InteractionType>().is_err());
    }

    #[test]
    fn test_event_wire_format() {
        let event = InteractionEvent::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap(),
            InteractionType::TileClick,
            EventData::tile("hello").with_category("greetings").with_success(false),
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["timestamp"], 1_705_327_200_000i64);
        assert_eq!(value["type"], "tile_click");
        assert_eq!(value["data"]["tileId"], "hello");
        assert_eq!(value["data"]["category"], "greetings");
        assert_eq!(value["data"]["success"], false);
        assert!(value["data"].get("duration").is_none());
    }

    #[test]
    fn test_event_without_data_deserializes() {
        let json = r#"{"timestamp": 1705327200000, "type": "session_start"}"#;
        let event: InteractionEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, InteractionType::SessionStart);
        assert_eq!(event.data, EventData::default());
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!(" High ".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_recommendation_type_field_name() {
        let rec = Recommendation {
            id: "high-contrast".to_string(),
            rec_type: RecommendationType::Settings,
            priority: Priority::Medium,
            description: "Enable high contrast".to_string(),
            action: SettingsPatch::new(),
            confidence: 0.8,
        };
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["type"], "settings");
        assert_eq!(value["priority"], "medium");
    }
}
