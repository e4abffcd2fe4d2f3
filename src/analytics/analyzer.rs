//! Behavior pattern analysis
//!
//! Computes a [`BehaviorPattern`] from the trailing analysis window. The pattern
//! is recomputed from scratch on every cycle; nothing is carried over between
//! cycles.

use crate::analytics::segmenter::{average_duration_ms, segment_sessions};
use crate::analytics::types::{
    AccessibilityNeeds, BehaviorPattern, CommunicationStyle, DifficultyLevel, InteractionEvent,
    InteractionType,
};
use crate::config::EngineConfig;
use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use std::collections::HashMap;

/// Error rate above which larger tiles are suggested
const LARGER_TILES_ERROR_RATE: f64 = 0.2;

/// Mean gap between tile clicks (ms) above which larger tiles are suggested
const LARGER_TILES_GAP_MS: f64 = 3000.0;

/// Mean session length (ms) above which slower speech is suggested
const SLOWER_SPEECH_SESSION_MS: f64 = 300_000.0;

/// Error rate above which high contrast is suggested
const HIGH_CONTRAST_ERROR_RATE: f64 = 0.15;

/// Simple layout is suggested below these vocabulary sizes
const SIMPLE_LAYOUT_MAX_TILES: usize = 8;
const SIMPLE_LAYOUT_MAX_CATEGORIES: usize = 3;

/// Voice commands per tile click above which the style is `mixed`
const MIXED_STYLE_VOICE_RATIO: f64 = 0.5;

/// Occurrence counts keyed by name, remembering first-seen order.
///
/// Ranking is a stable sort over first-seen order, so equal counts keep the
/// key that appeared first in the window ahead.
#[derive(Debug, Default)]
struct FrequencyTable {
    index: HashMap<String, usize>,
    entries: Vec<(String, usize)>,
}

impl FrequencyTable {
    fn record(&mut self, key: &str) {
        match self.index.get(key) {
            Some(&slot) => self.entries[slot].1 += 1,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), 1));
            }
        }
    }

    fn distinct(&self) -> usize {
        self.entries.len()
    }

    fn total(&self) -> usize {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    fn ranked(&self, limit: usize) -> Vec<String> {
        let mut sorted: Vec<&(String, usize)> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        sorted
            .into_iter()
            .take(limit)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// Analyzer for the trailing usage window
#[derive(Debug, Clone)]
pub struct PatternAnalyzer {
    window: Duration,
    min_events: usize,
    session_gap_ms: i64,
    max_tiles: usize,
    max_categories: usize,
    max_peak_hours: usize,
    hour_offset: FixedOffset,
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl PatternAnalyzer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            window: config.analysis_window(),
            min_events: config.min_events_for_analysis,
            session_gap_ms: config.session_gap_ms,
            max_tiles: config.max_preferred_tiles,
            max_categories: config.max_preferred_categories,
            max_peak_hours: config.max_peak_hours,
            hour_offset: config.hour_offset(),
        }
    }

    /// Offset used for hour-of-day bucketing
    pub fn hour_offset(&self) -> FixedOffset {
        self.hour_offset
    }

    /// Events in `(now - window, now]`, in log order
    pub fn window_events<'a>(
        &self,
        events: &'a [InteractionEvent],
        now: DateTime<Utc>,
    ) -> Vec<&'a InteractionEvent> {
        let cutoff = now - self.window;
        events
            .iter()
            .filter(|e| e.timestamp > cutoff && e.timestamp <= now)
            .collect()
    }

    /// Compute a pattern, or `None` when the window holds too few events
    pub fn analyze(&self, events: &[InteractionEvent], now: DateTime<Utc>) -> Option<BehaviorPattern> {
        let window = self.window_events(events, now);
        if window.len() < self.min_events {
            log::debug!(
                "Skipping analysis: {} events in window, {} required",
                window.len(),
                self.min_events
            );
            return None;
        }

        // Frequency tables
        let mut tiles = FrequencyTable::default();
        let mut categories = FrequencyTable::default();
        for event in &window {
            if let Some(tile) = event.data.tile_id.as_deref() {
                tiles.record(tile);
            }
            if let Some(category) = event.data.category.as_deref() {
                categories.record(category);
            }
        }

        // Sessions
        let owned: Vec<InteractionEvent> = window.iter().map(|e| (*e).clone()).collect();
        let sessions = segment_sessions(&owned, self.session_gap_ms);
        let average_session_time = average_duration_ms(&sessions);

        // Difficulty
        let distinct_tiles = tiles.distinct();
        let mean_clicks = if distinct_tiles == 0 {
            0.0
        } else {
            tiles.total() as f64 / distinct_tiles as f64
        };
        let difficulty_level = classify_difficulty(distinct_tiles, mean_clicks);

        // Accessibility
        let error_rate = compute_error_rate(&window);
        let avg_interaction_gap_ms = compute_avg_click_gap(&window);
        let accessibility_needs = AccessibilityNeeds {
            needs_larger_tiles: error_rate > LARGER_TILES_ERROR_RATE
                || avg_interaction_gap_ms > LARGER_TILES_GAP_MS,
            needs_slower_speech: average_session_time > SLOWER_SPEECH_SESSION_MS,
            needs_high_contrast: error_rate > HIGH_CONTRAST_ERROR_RATE,
            needs_simple_layout: distinct_tiles < SIMPLE_LAYOUT_MAX_TILES
                && categories.distinct() < SIMPLE_LAYOUT_MAX_CATEGORIES,
        };

        let peak_usage_times = self.compute_peak_hours(&window);
        let communication_style = classify_style(&window);

        Some(BehaviorPattern {
            preferred_tiles: tiles.ranked(self.max_tiles),
            preferred_categories: categories.ranked(self.max_categories),
            average_session_time,
            peak_usage_times,
            difficulty_level,
            communication_style,
            accessibility_needs,
            error_rate,
            avg_interaction_gap_ms,
            window_event_count: window.len(),
            session_count: sessions.len(),
            computed_at: now,
        })
    }

    /// Busiest hours of day, busiest first; equal counts favor the earlier hour
    fn compute_peak_hours(&self, window: &[&InteractionEvent]) -> Vec<u32> {
        let mut buckets = [0usize; 24];
        for event in window {
            let hour = event.timestamp.with_timezone(&self.hour_offset).hour();
            buckets[hour as usize] += 1;
        }

        let mut hours: Vec<u32> = (0..24).filter(|h| buckets[*h as usize] > 0).collect();
        hours.sort_by(|a, b| buckets[*b as usize].cmp(&buckets[*a as usize]));
        hours.truncate(self.max_peak_hours);
        hours
    }
}

/// Classify difficulty from distinct tiles used (`distinct`) and mean clicks per tile
pub fn classify_difficulty(distinct: usize, mean_clicks: f64) -> DifficultyLevel {
    if distinct == 0 {
        return DifficultyLevel::Beginner;
    }
    if distinct > 20 && mean_clicks > 3.0 {
        DifficultyLevel::Advanced
    } else if distinct > 10 && mean_clicks > 2.0 {
        DifficultyLevel::Intermediate
    } else {
        DifficultyLevel::Beginner
    }
}

/// Fraction of events reporting `success: false`, over all events
fn compute_error_rate(window: &[&InteractionEvent]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let failures = window
        .iter()
        .filter(|e| e.data.success == Some(false))
        .count();
    failures as f64 / window.len() as f64
}

/// Mean gap (ms) between consecutive tile clicks; 0 with fewer than two clicks
fn compute_avg_click_gap(window: &[&InteractionEvent]) -> f64 {
    let clicks: Vec<DateTime<Utc>> = window
        .iter()
        .filter(|e| e.event_type == InteractionType::TileClick)
        .map(|e| e.timestamp)
        .collect();

    if clicks.len() < 2 {
        return 0.0;
    }

    let total_ms: i64 = clicks
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_milliseconds())
        .sum();
    total_ms as f64 / (clicks.len() - 1) as f64
}

fn classify_style(window: &[&InteractionEvent]) -> CommunicationStyle {
    let voice = window
        .iter()
        .filter(|e| e.event_type == InteractionType::VoiceCommand)
        .count();
    let clicks = window
        .iter()
        .filter(|e| e.event_type == InteractionType::TileClick)
        .count();

    if voice as f64 > clicks as f64 * MIXED_STYLE_VOICE_RATIO {
        CommunicationStyle::Mixed
    } else {
        CommunicationStyle::Visual
    }
}
