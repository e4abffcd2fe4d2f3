//! Engine configuration
//!
//! Every knob has a default matching the production cadence, so an empty JSON
//! object (`{}`) is a valid configuration.

use crate::error::AnalyticsError;
use chrono::{FixedOffset, Local, Offset};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum inactivity gap inside one session (5 minutes)
pub const DEFAULT_SESSION_GAP_MS: i64 = 300_000;

/// Trailing analysis window in hours
pub const DEFAULT_ANALYSIS_WINDOW_HOURS: i64 = 24;

/// Minimum number of window events before a pattern is computed
pub const DEFAULT_MIN_EVENTS_FOR_ANALYSIS: usize = 10;

/// Length limits for the ranked pattern fields
pub const DEFAULT_MAX_PREFERRED_TILES: usize = 10;
pub const DEFAULT_MAX_PREFERRED_CATEGORIES: usize = 5;
pub const DEFAULT_MAX_PEAK_HOURS: usize = 3;

/// Periodic analysis cadence in seconds
pub const DEFAULT_ANALYSIS_INTERVAL_SECS: u64 = 30;

/// Key under which the event log is persisted
pub const DEFAULT_STORAGE_KEY: &str = "aac-insight.events";

/// Configuration for the analytics engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Gap (ms) above which the segmenter starts a new session
    pub session_gap_ms: i64,
    /// Trailing window (hours) the analyzer looks at
    pub analysis_window_hours: i64,
    /// Events required in the window before analysis runs
    pub min_events_for_analysis: usize,
    pub max_preferred_tiles: usize,
    pub max_preferred_categories: usize,
    pub max_peak_hours: usize,
    /// Periodic analysis cadence
    pub analysis_interval_secs: u64,
    /// Offset used for hour-of-day bucketing. `None` uses the host's local offset.
    pub utc_offset_minutes: Option<i32>,
    /// Key for the persisted event log
    pub storage_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_gap_ms: DEFAULT_SESSION_GAP_MS,
            analysis_window_hours: DEFAULT_ANALYSIS_WINDOW_HOURS,
            min_events_for_analysis: DEFAULT_MIN_EVENTS_FOR_ANALYSIS,
            max_preferred_tiles: DEFAULT_MAX_PREFERRED_TILES,
            max_preferred_categories: DEFAULT_MAX_PREFERRED_CATEGORIES,
            max_peak_hours: DEFAULT_MAX_PEAK_HOURS,
            analysis_interval_secs: DEFAULT_ANALYSIS_INTERVAL_SECS,
            utc_offset_minutes: None,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, AnalyticsError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file (JSON)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AnalyticsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, AnalyticsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values that would make the pipeline meaningless
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.session_gap_ms <= 0 {
            return Err(AnalyticsError::InvalidConfig(
                "session_gap_ms must be positive".to_string(),
            ));
        }
        if self.analysis_window_hours <= 0 {
            return Err(AnalyticsError::InvalidConfig(
                "analysis_window_hours must be positive".to_string(),
            ));
        }
        if self.analysis_interval_secs == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "analysis_interval_secs must be positive".to_string(),
            ));
        }
        if self.max_preferred_tiles == 0
            || self.max_preferred_categories == 0
            || self.max_peak_hours == 0
        {
            return Err(AnalyticsError::InvalidConfig(
                "ranking limits must be at least 1".to_string(),
            ));
        }
        if let Some(minutes) = self.utc_offset_minutes {
            if minutes.abs() >= 24 * 60 {
                return Err(AnalyticsError::InvalidConfig(format!(
                    "utc_offset_minutes out of range: {minutes}"
                )));
            }
        }
        if self.storage_key.trim().is_empty() {
            return Err(AnalyticsError::InvalidConfig(
                "storage_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Offset used to bucket events by hour of day
    pub fn hour_offset(&self) -> FixedOffset {
        match self.utc_offset_minutes {
            Some(minutes) => FixedOffset::east_opt(minutes * 60)
                .unwrap_or_else(|| Local::now().offset().fix()),
            None => Local::now().offset().fix(),
        }
    }

    /// Window length as a chrono duration
    pub fn analysis_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.analysis_window_hours)
    }

    /// Cadence of the periodic analysis task
    pub fn analysis_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.analysis_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.session_gap_ms, 300_000);
        assert_eq!(config.min_events_for_analysis, 10);
        assert_eq!(config.storage_key, "aac-insight.events");
    }

    #[test]
    fn test_partial_override() {
        let config =
            EngineConfig::from_json(r#"{"analysis_interval_secs": 60, "utc_offset_minutes": -300}"#)
                .unwrap();
        assert_eq!(config.analysis_interval_secs, 60);
        assert_eq!(config.analysis_interval(), std::time::Duration::from_secs(60));
        assert_eq!(config.hour_offset().local_minus_utc(), -300 * 60);
        assert_eq!(config.max_preferred_tiles, 10);
    }

    #[test]
    fn test_validation_rejects_zero_interval() {
        let result = EngineConfig::from_json(r#"{"analysis_interval_secs": 0}"#);
        assert!(matches!(result, Err(AnalyticsError::InvalidConfig(_))));
    }

    #[test]
    fn test_validation_rejects_bad_offset() {
        let result = EngineConfig::from_json(r#"{"utc_offset_minutes": 1500}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_round_trip() {
        let mut config = EngineConfig::default();
        config.utc_offset_minutes = Some(60);
        let json = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }
}
