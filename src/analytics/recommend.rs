//! Recommendation generation
//!
//! Recommendations come from a declarative rule table. Each rule is evaluated
//! independently against the current [`BehaviorPattern`]; rules may co-fire and
//! each owns a disjoint set of setting keys.

use crate::analytics::types::{BehaviorPattern, Priority, Recommendation, RecommendationType};
use crate::settings::{
    SettingsPatch, KEY_ENABLED_CATEGORIES, KEY_HIGH_CONTRAST, KEY_TILE_SIZE, KEY_VOICE_RATE,
};
use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde_json::Value;

/// Tile size applied by `larger-tiles`
pub const LARGE_TILE_SIZE: u32 = 8;

/// Voice rate applied by `slower-speech`
pub const CALM_VOICE_RATE: f64 = 0.7;

/// Inputs to rule evaluation beyond the pattern itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationContext {
    /// Current hour of day (0-23) in the analyzer's offset
    pub current_hour: u32,
}

impl GenerationContext {
    pub fn at(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            current_hour: now.with_timezone(&offset).hour(),
        }
    }
}

/// One entry of the recommendation catalog
#[derive(Clone, Copy)]
pub struct RecommendationRule {
    /// Stable identifier, also the key of the produced recommendation
    pub id: &'static str,
    pub rec_type: RecommendationType,
    pub priority: Priority,
    pub confidence: f64,
    pub description: &'static str,
    /// Trigger condition
    pub fires: fn(&BehaviorPattern, &GenerationContext) -> bool,
    /// Settings patch to propose
    pub action: fn(&BehaviorPattern) -> SettingsPatch,
}

impl std::fmt::Debug for RecommendationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecommendationRule")
            .field("id", &self.id)
            .field("rec_type", &self.rec_type)
            .field("priority", &self.priority)
            .field("confidence", &self.confidence)
            .finish_non_exhaustive()
    }
}

impl RecommendationRule {
    fn evaluate(&self, pattern: &BehaviorPattern, ctx: &GenerationContext) -> Option<Recommendation> {
        if !(self.fires)(pattern, ctx) {
            return None;
        }
        Some(Recommendation {
            id: self.id.to_string(),
            rec_type: self.rec_type,
            priority: self.priority,
            description: self.description.to_string(),
            action: (self.action)(pattern),
            confidence: self.confidence,
        })
    }
}

/// The built-in catalog, in generation order
pub static DEFAULT_RULES: &[RecommendationRule] = &[
    RecommendationRule {
        id: "larger-tiles",
        rec_type: RecommendationType::Settings,
        priority: Priority::High,
        confidence: 0.85,
        description: "Selections are often missed or slow; larger tiles should be easier to hit",
        fires: needs_larger_tiles,
        action: larger_tiles_action,
    },
    RecommendationRule {
        id: "slower-speech",
        rec_type: RecommendationType::Settings,
        priority: Priority::Medium,
        confidence: 0.75,
        description: "Sessions run long; a calmer speech rate may help follow along",
        fires: needs_slower_speech,
        action: slower_speech_action,
    },
    RecommendationRule {
        id: "high-contrast",
        rec_type: RecommendationType::Settings,
        priority: Priority::Medium,
        confidence: 0.80,
        description: "Error rate suggests tiles are hard to tell apart; try high contrast",
        fires: needs_high_contrast,
        action: high_contrast_action,
    },
    RecommendationRule {
        id: "optimize-categories",
        rec_type: RecommendationType::Layout,
        priority: Priority::Medium,
        confidence: 0.90,
        description: "Show only the categories used most to shorten navigation",
        fires: has_preferred_categories,
        action: optimize_categories_action,
    },
    RecommendationRule {
        id: "peak-time-optimization",
        rec_type: RecommendationType::Timing,
        priority: Priority::Low,
        confidence: 0.70,
        description: "This is one of the busiest hours of the day for this board",
        fires: is_peak_hour,
        action: empty_action,
    },
];

fn needs_larger_tiles(pattern: &BehaviorPattern, _: &GenerationContext) -> bool {
    pattern.accessibility_needs.needs_larger_tiles
}

fn needs_slower_speech(pattern: &BehaviorPattern, _: &GenerationContext) -> bool {
    pattern.accessibility_needs.needs_slower_speech
}

fn needs_high_contrast(pattern: &BehaviorPattern, _: &GenerationContext) -> bool {
    pattern.accessibility_needs.needs_high_contrast
}

fn has_preferred_categories(pattern: &BehaviorPattern, _: &GenerationContext) -> bool {
    !pattern.preferred_categories.is_empty()
}

fn is_peak_hour(pattern: &BehaviorPattern, ctx: &GenerationContext) -> bool {
    pattern.peak_usage_times.contains(&ctx.current_hour)
}

fn single(key: &str, value: Value) -> SettingsPatch {
    let mut patch = SettingsPatch::new();
    patch.insert(key.to_string(), value);
    patch
}

fn larger_tiles_action(_: &BehaviorPattern) -> SettingsPatch {
    single(KEY_TILE_SIZE, Value::from(LARGE_TILE_SIZE))
}

fn slower_speech_action(_: &BehaviorPattern) -> SettingsPatch {
    single(KEY_VOICE_RATE, Value::from(CALM_VOICE_RATE))
}

fn high_contrast_action(_: &BehaviorPattern) -> SettingsPatch {
    single(KEY_HIGH_CONTRAST, Value::Bool(true))
}

fn optimize_categories_action(pattern: &BehaviorPattern) -> SettingsPatch {
    single(
        KEY_ENABLED_CATEGORIES,
        Value::from(pattern.preferred_categories.clone()),
    )
}

fn empty_action(_: &BehaviorPattern) -> SettingsPatch {
    SettingsPatch::new()
}

/// Evaluates a rule table against a pattern
#[derive(Debug, Clone)]
pub struct RecommendationGenerator {
    rules: Vec<RecommendationRule>,
}

impl Default for RecommendationGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl RecommendationGenerator {
    /// Generator over the built-in catalog
    pub fn new() -> Self {
        Self::with_rules(DEFAULT_RULES.to_vec())
    }

    /// Generator over a custom catalog
    pub fn with_rules(rules: Vec<RecommendationRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RecommendationRule] {
        &self.rules
    }

    /// Produce the full recommendation set for `pattern`, in rule order.
    ///
    /// With no pattern the set is empty.
    pub fn generate(
        &self,
        pattern: Option<&BehaviorPattern>,
        ctx: &GenerationContext,
    ) -> Vec<Recommendation> {
        let Some(pattern) = pattern else {
            return Vec::new();
        };
        self.rules
            .iter()
            .filter_map(|rule| rule.evaluate(pattern, ctx))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::types::{
        AccessibilityNeeds, CommunicationStyle, DifficultyLevel,
    };
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn quiet_pattern() -> BehaviorPattern {
        BehaviorPattern {
            preferred_tiles: vec!["hello".to_string()],
            preferred_categories: Vec::new(),
            average_session_time: 60_000.0,
            peak_usage_times: vec![9],
            difficulty_level: DifficultyLevel::Beginner,
            communication_style: CommunicationStyle::Visual,
            accessibility_needs: AccessibilityNeeds::default(),
            error_rate: 0.0,
            avg_interaction_gap_ms: 800.0,
            window_event_count: 20,
            session_count: 1,
            computed_at: Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap(),
        }
    }

    fn ids(recs: &[Recommendation]) -> Vec<&str> {
        recs.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_no_pattern_no_recommendations() {
        let generator = RecommendationGenerator::new();
        let ctx = GenerationContext { current_hour: 9 };
        assert!(generator.generate(None, &ctx).is_empty());
    }

    #[test]
    fn test_quiet_pattern_fires_nothing_off_peak() {
        let generator = RecommendationGenerator::new();
        let ctx = GenerationContext { current_hour: 14 };
        assert!(generator.generate(Some(&quiet_pattern()), &ctx).is_empty());
    }

    #[test]
    fn test_all_rules_fire_in_catalog_order() {
        let mut pattern = quiet_pattern();
        pattern.accessibility_needs = AccessibilityNeeds {
            needs_larger_tiles: true,
            needs_slower_speech: true,
            needs_high_contrast: true,
            needs_simple_layout: true,
        };
        pattern.preferred_categories = vec!["food".to_string(), "people".to_string()];

        let generator = RecommendationGenerator::new();
        let recs = generator.generate(Some(&pattern), &GenerationContext { current_hour: 9 });

        assert_eq!(
            ids(&recs),
            vec![
                "larger-tiles",
                "slower-speech",
                "high-contrast",
                "optimize-categories",
                "peak-time-optimization"
            ]
        );
        assert_eq!(recs[0].priority, Priority::High);
        assert_eq!(recs[0].confidence, 0.85);
        assert_eq!(recs[0].action["tileSize"], json!(8));
        assert_eq!(recs[1].action["voiceRate"], json!(0.7));
        assert_eq!(recs[2].action["highContrast"], json!(true));
        assert_eq!(recs[3].action["enabledCategories"], json!(["food", "people"]));
        assert_eq!(recs[3].rec_type, RecommendationType::Layout);
        assert!(recs[4].action.is_empty());
        assert_eq!(recs[4].priority, Priority::Low);
    }

    #[test]
    fn test_rule_actions_are_disjoint() {
        let mut pattern = quiet_pattern();
        pattern.preferred_categories = vec!["food".to_string()];
        let mut seen = std::collections::HashSet::new();
        for rule in DEFAULT_RULES {
            for key in (rule.action)(&pattern).keys() {
                assert!(seen.insert(key.clone()), "duplicate key {key}");
            }
        }
    }

    #[test]
    fn test_confidence_in_range() {
        for rule in DEFAULT_RULES {
            assert!((0.0..=1.0).contains(&rule.confidence), "{}", rule.id);
        }
    }

    #[test]
    fn test_custom_rule_table() {
        fn always(_: &BehaviorPattern, _: &GenerationContext) -> bool {
            true
        }
        fn bigger_grid(_: &BehaviorPattern) -> SettingsPatch {
            let mut patch = SettingsPatch::new();
            patch.insert("gridColumns".to_string(), json!(6));
            patch
        }

        let generator = RecommendationGenerator::with_rules(vec![RecommendationRule {
            id: "wider-grid",
            rec_type: RecommendationType::Vocabulary,
            priority: Priority::Low,
            confidence: 0.5,
            description: "Show more tiles per row",
            fires: always,
            action: bigger_grid,
        }]);

        let recs = generator.generate(Some(&quiet_pattern()), &GenerationContext { current_hour: 0 });
        assert_eq!(ids(&recs), vec!["wider-grid"]);
        assert_eq!(recs[0].action["gridColumns"], json!(6));
    }

    #[test]
    fn test_context_hour_uses_offset() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap();
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(GenerationContext::at(now, offset).current_hour, 1);
    }
}
