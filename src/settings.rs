//! Board settings and configuration patches
//!
//! The engine never owns the live board configuration. It produces
//! [`SettingsPatch`]es and hands them to a [`SettingsTarget`], which must apply
//! a patch completely or not at all.

use crate::error::AnalyticsError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Partial configuration: setting name to new value
pub type SettingsPatch = Map<String, Value>;

/// Setting keys produced by the recommendation rules
pub const KEY_TILE_SIZE: &str = "tileSize";
pub const KEY_VOICE_RATE: &str = "voiceRate";
pub const KEY_HIGH_CONTRAST: &str = "highContrast";
pub const KEY_ENABLED_CATEGORIES: &str = "enabledCategories";

/// Fold `patch` onto `base`; keys in `patch` win on collision
pub fn merge_patch(base: &mut SettingsPatch, patch: &SettingsPatch) {
    for (key, value) in patch {
        base.insert(key.clone(), value.clone());
    }
}

/// Something a settings patch can be applied to
pub trait SettingsTarget {
    /// Apply `patch` atomically. On error the target must be left unchanged.
    fn apply_patch(&mut self, patch: &SettingsPatch) -> Result<(), AnalyticsError>;
}

impl SettingsTarget for Map<String, Value> {
    fn apply_patch(&mut self, patch: &SettingsPatch) -> Result<(), AnalyticsError> {
        merge_patch(self, patch);
        Ok(())
    }
}

/// Communication board settings as seen by the host UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoardSettings {
    /// Tile size step (larger is bigger)
    pub tile_size: u32,
    /// Speech rate multiplier (1.0 = normal)
    pub voice_rate: f64,
    pub voice_pitch: f64,
    pub high_contrast: bool,
    /// Categories shown on the board; empty means all
    pub enabled_categories: Vec<String>,
    pub grid_columns: u32,
    pub eye_tracking_enabled: bool,
    /// Gaze dwell time before a tile activates
    pub dwell_time_ms: u32,
    /// Host-specific settings the engine carries through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            tile_size: 4,
            voice_rate: 1.0,
            voice_pitch: 1.0,
            high_contrast: false,
            enabled_categories: Vec::new(),
            grid_columns: 4,
            eye_tracking_enabled: false,
            dwell_time_ms: 1000,
            extra: Map::new(),
        }
    }
}

impl BoardSettings {
    /// Load settings from JSON
    pub fn from_json(json: &str) -> Result<Self, AnalyticsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize settings to pretty JSON
    pub fn to_json(&self) -> Result<String, AnalyticsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load settings from a file, falling back to defaults when it does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, AnalyticsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

impl SettingsTarget for BoardSettings {
    fn apply_patch(&mut self, patch: &SettingsPatch) -> Result<(), AnalyticsError> {
        if patch.is_empty() {
            return Ok(());
        }

        // Apply to a copy; only a fully accepted patch replaces `self`
        let mut merged = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => {
                return Err(AnalyticsError::SettingsRejected(
                    "settings did not serialize to an object".to_string(),
                ))
            }
        };
        merge_patch(&mut merged, patch);

        let updated: BoardSettings = serde_json::from_value(Value::Object(merged))
            .map_err(|e| AnalyticsError::SettingsRejected(e.to_string()))?;
        *self = updated;
        Ok(())
    }
}
