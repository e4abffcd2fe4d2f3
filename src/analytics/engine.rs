//! Analytics engine orchestration
//!
//! This module provides the public API the host UI talks to. The engine owns the
//! event log and the derived state (pattern and active recommendations) and
//! runs the cycle: event log → segmenter → analyzer → generator, plus the
//! applier on request.

use crate::analytics::applier::{apply_batch, apply_single, ApplySummary};
use crate::analytics::analyzer::PatternAnalyzer;
use crate::analytics::recommend::{GenerationContext, RecommendationGenerator};
use crate::analytics::segmenter::segment_sessions;
use crate::analytics::types::{
    BehaviorPattern, EventData, InteractionEvent, InteractionType, Priority, Recommendation,
    Session,
};
use crate::config::EngineConfig;
use crate::error::AnalyticsError;
use crate::settings::SettingsTarget;
use crate::store::{EventLog, KeyValueStore, LoadWarning};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Engine-wide activity state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Analyzing,
    Applying,
}

/// Events captured at the start of an analysis cycle.
///
/// Analysis runs over the snapshot only; events appended after it was taken
/// are picked up by the next cycle.
#[derive(Debug, Clone)]
pub struct AnalysisSnapshot {
    events: Vec<InteractionEvent>,
    now: DateTime<Utc>,
}

impl AnalysisSnapshot {
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Run the analyzer over the captured events
    pub fn analyze(&self, analyzer: &PatternAnalyzer) -> Option<BehaviorPattern> {
        analyzer.analyze(&self.events, self.now)
    }
}

/// Result of one analysis cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum AnalysisOutcome {
    /// A new pattern was published and recommendations regenerated
    Updated { recommendations: usize },
    /// Too few events in the window; the previous pattern stays in effect
    Skipped { window_events: usize },
    /// Another cycle was already in flight
    Coalesced,
}

#[derive(Debug, Clone, Copy)]
struct SessionBookmark {
    id: Uuid,
    started_at: DateTime<Utc>,
}

/// Source of the current instant
pub type Clock = fn() -> DateTime<Utc>;

/// Behavior analytics engine bound to one application session
#[derive(Debug)]
pub struct AnalyticsEngine<S: KeyValueStore> {
    config: EngineConfig,
    log: EventLog<S>,
    analyzer: PatternAnalyzer,
    generator: RecommendationGenerator,
    pattern: Option<BehaviorPattern>,
    recommendations: Vec<Recommendation>,
    state: EngineState,
    session: Option<SessionBookmark>,
    load_warning: Option<LoadWarning>,
    clock: Clock,
    rejected_events: u64,
}

impl<S: KeyValueStore> AnalyticsEngine<S> {
    /// Open an engine over `store`, reloading the persisted event log
    pub fn open(store: S, config: EngineConfig) -> Result<Self, AnalyticsError> {
        config.validate()?;
        let (log, load_warning) = EventLog::open(store, config.storage_key.clone());

        Ok(Self {
            analyzer: PatternAnalyzer::new(&config),
            generator: RecommendationGenerator::new(),
            config,
            log,
            pattern: None,
            recommendations: Vec::new(),
            state: EngineState::Idle,
            session: None,
            load_warning,
            clock: Utc::now,
            rejected_events: 0,
        })
    }

    /// Replace the recommendation rule table
    pub fn with_generator(mut self, generator: RecommendationGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Replace the wall clock
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Current instant according to the engine clock
    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &PatternAnalyzer {
        &self.analyzer
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Record an interaction stamped with the current instant
    pub fn record_interaction(&mut self, event_type: InteractionType, data: EventData) {
        let now = self.now();
        self.record_interaction_at(event_type, data, now);
    }

    /// Check that an explicit timestamp is not ahead of the engine clock
    pub fn check_timestamp(&self, timestamp: DateTime<Utc>) -> Result<(), AnalyticsError> {
        let now = self.now();
        if timestamp > now {
            return Err(AnalyticsError::InvalidEvent(format!(
                "timestamp {} is {}ms ahead of the current time",
                timestamp,
                (timestamp - now).num_milliseconds()
            )));
        }
        Ok(())
    }

    /// Record an interaction with an explicit timestamp.
    ///
    /// Accepted in every engine state. A timestamp ahead of the engine clock is
    /// dropped and counted. A timestamp earlier than the last logged event is
    /// clamped forward so the log stays non-decreasing. A failed durable write
    /// is logged; the event stays in memory.
    pub fn record_interaction_at(
        &mut self,
        event_type: InteractionType,
        data: EventData,
        timestamp: DateTime<Utc>,
    ) {
        if let Err(e) = self.check_timestamp(timestamp) {
            log::warn!("Dropping {event_type} event: {e}");
            self.rejected_events += 1;
            return;
        }

        let timestamp = match self.log.last() {
            Some(last) if last.timestamp > timestamp => {
                log::debug!(
                    "Clock went backwards by {}ms; clamping event timestamp",
                    (last.timestamp - timestamp).num_milliseconds()
                );
                last.timestamp
            }
            _ => timestamp,
        };

        let event = InteractionEvent::new(timestamp, event_type, data);
        if let Err(e) = self.log.append(event) {
            log::error!("Failed to persist {event_type} event: {e}");
        }
    }

    /// Mark the start of an explicit session; returns its bookmark id
    pub fn begin_session(&mut self) -> Uuid {
        let now = self.now();
        self.begin_session_at(now)
    }

    pub fn begin_session_at(&mut self, timestamp: DateTime<Utc>) -> Uuid {
        if let Some(open) = self.session {
            log::debug!("Session {} replaced before it was ended", open.id);
        }
        let id = Uuid::new_v4();
        self.session = Some(SessionBookmark {
            id,
            started_at: timestamp,
        });
        self.record_interaction_at(
            InteractionType::SessionStart,
            EventData {
                session_id: Some(id),
                ..EventData::default()
            },
            timestamp,
        );
        id
    }

    /// Mark the end of the current session.
    ///
    /// `duration_ms` from the caller wins; otherwise it is computed from the
    /// `begin_session` bookmark, or from the last unmatched `session_start` in
    /// the log when the bookmark was lost to a restart. Without either, the
    /// event carries no duration.
    pub fn end_session(&mut self, duration_ms: Option<i64>) {
        let now = self.now();
        self.end_session_at(duration_ms, now);
    }

    pub fn end_session_at(&mut self, duration_ms: Option<i64>, timestamp: DateTime<Utc>) {
        let bookmark = self.session.take().or_else(|| self.open_session_in_log());
        let duration = duration_ms.or_else(|| {
            bookmark.map(|b| (timestamp - b.started_at).num_milliseconds().max(0))
        });
        self.record_interaction_at(
            InteractionType::SessionEnd,
            EventData {
                duration,
                session_id: bookmark.map(|b| b.id),
                ..EventData::default()
            },
            timestamp,
        );
    }

    /// Whether `begin_session` is open
    pub fn session_open(&self) -> bool {
        self.session.is_some()
    }

    /// Last `session_start` in the log not followed by a `session_end`
    fn open_session_in_log(&self) -> Option<SessionBookmark> {
        let start = self
            .log
            .all()
            .iter()
            .rev()
            .take_while(|e| e.event_type != InteractionType::SessionEnd)
            .find(|e| e.event_type == InteractionType::SessionStart)?;
        let id = start.data.session_id?;
        log::debug!("Ending session {id} recovered from the event log");
        Some(SessionBookmark {
            id,
            started_at: start.timestamp,
        })
    }

    // ------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------

    /// Run one analysis cycle now
    pub fn run_analysis(&mut self) -> AnalysisOutcome {
        let now = self.now();
        self.run_analysis_at(now)
    }

    /// Run one analysis cycle as of `now`
    pub fn run_analysis_at(&mut self, now: DateTime<Utc>) -> AnalysisOutcome {
        let Some(snapshot) = self.begin_analysis(now) else {
            return AnalysisOutcome::Coalesced;
        };
        let pattern = snapshot.analyze(&self.analyzer);
        self.finish_analysis(&snapshot, pattern)
    }

    /// Capture the analysis window and enter `Analyzing`.
    ///
    /// Returns `None` while another cycle is in flight.
    pub fn begin_analysis(&mut self, now: DateTime<Utc>) -> Option<AnalysisSnapshot> {
        if self.state != EngineState::Idle {
            log::debug!("Analysis requested while {:?}; coalescing", self.state);
            return None;
        }
        self.state = EngineState::Analyzing;

        let events = self
            .analyzer
            .window_events(self.log.all(), now)
            .into_iter()
            .cloned()
            .collect();
        Some(AnalysisSnapshot { events, now })
    }

    /// Publish the result of a cycle started with [`begin_analysis`](Self::begin_analysis).
    ///
    /// A `None` pattern keeps the previous pattern and recommendations.
    pub fn finish_analysis(
        &mut self,
        snapshot: &AnalysisSnapshot,
        pattern: Option<BehaviorPattern>,
    ) -> AnalysisOutcome {
        self.state = EngineState::Idle;

        let Some(pattern) = pattern else {
            return AnalysisOutcome::Skipped {
                window_events: snapshot.len(),
            };
        };

        let ctx = GenerationContext::at(snapshot.now, self.analyzer.hour_offset());
        let recommendations = self.generator.generate(Some(&pattern), &ctx);
        log::debug!(
            "Analysis over {} events produced {} recommendations",
            pattern.window_event_count,
            recommendations.len()
        );

        let count = recommendations.len();
        self.pattern = Some(pattern);
        self.recommendations = recommendations;
        AnalysisOutcome::Updated {
            recommendations: count,
        }
    }

    /// Latest pattern, if any cycle has produced one
    pub fn current_pattern(&self) -> Option<&BehaviorPattern> {
        self.pattern.as_ref()
    }

    /// Active recommendations in generation order
    pub fn current_recommendations(&self) -> &[Recommendation] {
        &self.recommendations
    }

    // ------------------------------------------------------------------
    // Application
    // ------------------------------------------------------------------

    /// Apply one recommendation by id to `settings`
    pub fn apply_recommendation<T: SettingsTarget + ?Sized>(
        &mut self,
        id: &str,
        settings: &mut T,
    ) -> ApplySummary {
        if self.state == EngineState::Analyzing {
            return ApplySummary::busy();
        }
        self.state = EngineState::Applying;
        let summary = apply_single(&mut self.recommendations, id, settings);
        self.state = EngineState::Idle;
        summary
    }

    /// Apply every active recommendation whose priority is in `filter`
    pub fn apply_recommendations<T: SettingsTarget + ?Sized>(
        &mut self,
        filter: &[Priority],
        settings: &mut T,
    ) -> ApplySummary {
        if self.state == EngineState::Analyzing {
            return ApplySummary::busy();
        }
        self.state = EngineState::Applying;
        let summary = apply_batch(&mut self.recommendations, filter, settings);
        self.state = EngineState::Idle;
        summary
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Ordered snapshot of the whole event log
    pub fn events(&self) -> &[InteractionEvent] {
        self.log.all()
    }

    /// Sessions over the whole log
    pub fn sessions(&self) -> Vec<Session> {
        segment_sessions(self.log.all(), self.config.session_gap_ms)
    }

    /// Sessions over the analysis window ending at `now`
    pub fn window_sessions(&self, now: DateTime<Utc>) -> Vec<Session> {
        let window: Vec<InteractionEvent> = self
            .analyzer
            .window_events(self.log.all(), now)
            .into_iter()
            .cloned()
            .collect();
        segment_sessions(&window, self.config.session_gap_ms)
    }

    /// The load warning raised at startup, handed out once
    pub fn take_load_warning(&mut self) -> Option<LoadWarning> {
        self.load_warning.take()
    }

    /// Number of events whose durable write failed
    pub fn persist_failures(&self) -> u64 {
        self.log.persist_failures()
    }

    /// Number of recorded events dropped for a timestamp ahead of the clock
    pub fn rejected_events(&self) -> u64 {
        self.rejected_events
    }

    /// Import events verbatim (timestamps preserved), persisting once.
    ///
    /// Events must not go back in time relative to the log, nor lie ahead of
    /// the engine clock.
    pub fn import_events(&mut self, events: Vec<InteractionEvent>) -> Result<usize, AnalyticsError> {
        let mut last = self.log.last().map(|e| e.timestamp);
        for event in &events {
            self.check_timestamp(event.timestamp)?;
            if let Some(prev) = last {
                if event.timestamp < prev {
                    return Err(AnalyticsError::InvalidEvent(format!(
                        "event at {} precedes {}",
                        event.timestamp, prev
                    )));
                }
            }
            last = Some(event.timestamp);
        }

        let count = events.len();
        self.log.extend(events)?;
        Ok(count)
    }

    pub fn store(&self) -> &S {
        self.log.store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::applier::{ApplyStatus, DEFAULT_BATCH_PRIORITIES};
    use crate::settings::BoardSettings;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn config() -> EngineConfig {
        EngineConfig {
            utc_offset_minutes: Some(0),
            ..EngineConfig::default()
        }
    }

    fn engine() -> AnalyticsEngine<MemoryStore> {
        AnalyticsEngine::open(MemoryStore::new(), config()).unwrap()
    }

    fn at(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap() + Duration::minutes(min)
    }

    /// Ten clicks, a quarter of them failed, across two categories
    fn record_struggling_usage(engine: &mut AnalyticsEngine<MemoryStore>) {
        for i in 0..12 {
            let data = EventData::tile(format!("t{}", i % 3))
                .with_category(if i % 2 == 0 { "food" } else { "people" })
                .with_success(i % 4 != 0);
            engine.record_interaction_at(InteractionType::TileClick, data, at(0) + Duration::seconds(i));
        }
    }

    #[test]
    fn test_analysis_skipped_without_enough_events() {
        let mut engine = engine();
        for i in 0..9 {
            engine.record_interaction_at(InteractionType::TileClick, EventData::tile("a"), at(i));
        }
        let outcome = engine.run_analysis_at(at(30));
        assert_eq!(outcome, AnalysisOutcome::Skipped { window_events: 9 });
        assert!(engine.current_pattern().is_none());
        assert!(engine.current_recommendations().is_empty());
    }

    #[test]
    fn test_analysis_produces_pattern_and_recommendations() {
        let mut engine = engine();
        record_struggling_usage(&mut engine);

        let outcome = engine.run_analysis_at(at(1));
        assert!(matches!(outcome, AnalysisOutcome::Updated { .. }));

        let pattern = engine.current_pattern().unwrap();
        assert_eq!(pattern.preferred_categories, vec!["food", "people"]);
        assert!(pattern.accessibility_needs.needs_larger_tiles);

        let ids: Vec<&str> = engine
            .current_recommendations()
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec!["larger-tiles", "high-contrast", "optimize-categories", "peak-time-optimization"]
        );
    }

    #[test]
    fn test_skipped_cycle_keeps_previous_state() {
        let mut engine = engine();
        record_struggling_usage(&mut engine);
        engine.run_analysis_at(at(1));
        let pattern = engine.current_pattern().cloned();
        let recs = engine.current_recommendations().to_vec();

        // Two days later the window is empty
        let outcome = engine.run_analysis_at(at(60 * 48));
        assert_eq!(outcome, AnalysisOutcome::Skipped { window_events: 0 });
        assert_eq!(engine.current_pattern().cloned(), pattern);
        assert_eq!(engine.current_recommendations(), recs.as_slice());
    }

    #[test]
    fn test_batch_apply_then_regeneration() {
        let mut engine = engine();
        record_struggling_usage(&mut engine);
        engine.run_analysis_at(at(1));

        let mut settings = BoardSettings::default();
        let summary = engine.apply_recommendations(&DEFAULT_BATCH_PRIORITIES, &mut settings);

        assert_eq!(summary.status, ApplyStatus::Applied);
        assert_eq!(
            summary.applied_ids,
            vec!["larger-tiles", "high-contrast", "optimize-categories"]
        );
        assert_eq!(settings.tile_size, 8);
        assert!(settings.high_contrast);
        assert_eq!(settings.enabled_categories, vec!["food", "people"]);
        assert_eq!(engine.current_recommendations().len(), 1);
        assert_eq!(engine.state(), EngineState::Idle);

        // Triggers still hold, so the next cycle brings them back
        engine.run_analysis_at(at(2));
        assert_eq!(engine.current_recommendations().len(), 4);
    }

    #[test]
    fn test_apply_unknown_id() {
        let mut engine = engine();
        record_struggling_usage(&mut engine);
        engine.run_analysis_at(at(1));
        let before = engine.current_recommendations().to_vec();

        let mut settings = BoardSettings::default();
        let summary = engine.apply_recommendation("no-such-rule", &mut settings);

        assert_eq!(summary.status, ApplyStatus::NotFound);
        assert_eq!(engine.current_recommendations(), before.as_slice());
        assert_eq!(settings, BoardSettings::default());
    }

    #[test]
    fn test_apply_is_refused_while_analyzing() {
        let mut engine = engine();
        record_struggling_usage(&mut engine);
        engine.run_analysis_at(at(1));

        let snapshot = engine.begin_analysis(at(2)).unwrap();
        assert_eq!(engine.state(), EngineState::Analyzing);
        assert!(engine.begin_analysis(at(2)).is_none());

        let mut settings = BoardSettings::default();
        let summary = engine.apply_recommendation("larger-tiles", &mut settings);
        assert_eq!(summary.status, ApplyStatus::Busy);

        let pattern = snapshot.analyze(engine.analyzer());
        engine.finish_analysis(&snapshot, pattern);
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.apply_recommendation("larger-tiles", &mut settings).is_applied());
    }

    #[test]
    fn test_events_appended_mid_cycle_wait_for_next_cycle() {
        let mut engine = engine();
        for i in 0..9 {
            engine.record_interaction_at(InteractionType::TileClick, EventData::tile("a"), at(i));
        }

        let snapshot = engine.begin_analysis(at(10)).unwrap();
        engine.record_interaction_at(InteractionType::TileClick, EventData::tile("a"), at(10));

        let pattern = snapshot.analyze(engine.analyzer());
        assert_eq!(
            engine.finish_analysis(&snapshot, pattern),
            AnalysisOutcome::Skipped { window_events: 9 }
        );

        assert!(matches!(
            engine.run_analysis_at(at(11)),
            AnalysisOutcome::Updated { .. }
        ));
    }

    #[test]
    fn test_session_markers() {
        let mut engine = engine();
        let id = engine.begin_session_at(at(0));
        assert!(engine.session_open());
        engine.end_session_at(None, at(3));
        assert!(!engine.session_open());

        let events = engine.events();
        assert_eq!(events[0].event_type, InteractionType::SessionStart);
        assert_eq!(events[0].data.session_id, Some(id));
        assert_eq!(events[1].event_type, InteractionType::SessionEnd);
        assert_eq!(events[1].data.duration, Some(180_000));
        assert_eq!(events[1].data.session_id, Some(id));

        engine.end_session_at(Some(42), at(4));
        assert_eq!(engine.events()[2].data.duration, Some(42));
        assert_eq!(engine.events()[2].data.session_id, None);
    }

    #[test]
    fn test_backwards_clock_is_clamped() {
        let mut engine = engine();
        engine.record_interaction_at(InteractionType::TileClick, EventData::tile("a"), at(5));
        engine.record_interaction_at(InteractionType::TileClick, EventData::tile("b"), at(1));

        let events = engine.events();
        assert_eq!(events[1].timestamp, at(5));
        assert_eq!(events[1].data.tile_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_restart_reloads_log() {
        let mut engine = engine();
        record_struggling_usage(&mut engine);
        let store = engine.store().clone();

        let mut restarted = AnalyticsEngine::open(store, config()).unwrap();
        assert!(restarted.take_load_warning().is_none());
        assert_eq!(restarted.events(), engine.events());
        assert!(restarted.current_pattern().is_none());

        restarted.run_analysis_at(at(1));
        assert_eq!(
            restarted.current_pattern().map(|p| p.window_event_count),
            Some(12)
        );
    }

    #[test]
    fn test_corrupted_store_warns_once() {
        let mut store = MemoryStore::new();
        store.save("aac-insight.events", b"[{]").unwrap();

        let mut engine = AnalyticsEngine::open(store, config()).unwrap();
        assert!(engine.events().is_empty());
        assert!(engine.take_load_warning().is_some());
        assert!(engine.take_load_warning().is_none());
    }

    #[test]
    fn test_import_rejects_out_of_order_events() {
        let mut engine = engine();
        let events = vec![
            InteractionEvent::new(at(5), InteractionType::TileClick, EventData::tile("a")),
            InteractionEvent::new(at(1), InteractionType::TileClick, EventData::tile("b")),
        ];
        assert!(engine.import_events(events).is_err());
        assert!(engine.events().is_empty());

        let events = vec![
            InteractionEvent::new(at(1), InteractionType::TileClick, EventData::tile("a")),
            InteractionEvent::new(at(5), InteractionType::TileClick, EventData::tile("b")),
        ];
        assert_eq!(engine.import_events(events).unwrap(), 2);
    }

    #[test]
    fn test_future_timestamp_does_not_pin_later_events() {
        fn clock() -> DateTime<Utc> {
            at(3)
        }
        let mut engine = engine().with_clock(clock);

        engine.record_interaction_at(
            InteractionType::TileClick,
            EventData::tile("late").with_category("food"),
            at(60 * 23),
        );
        for i in 0..12 {
            engine.record_interaction_at(
                InteractionType::TileClick,
                EventData::tile("want").with_category("verbs").with_success(true),
                at(0) + Duration::seconds(10 * i),
            );
        }
        assert_eq!(engine.rejected_events(), 1);
        assert_eq!(engine.events().len(), 12);
        assert_eq!(engine.events()[1].timestamp, at(0) + Duration::seconds(10));

        assert!(matches!(engine.run_analysis(), AnalysisOutcome::Updated { .. }));
        let pattern = engine.current_pattern().unwrap();
        assert_eq!(pattern.window_event_count, 12);
        assert_eq!(pattern.avg_interaction_gap_ms, 10_000.0);
        assert_eq!(pattern.peak_usage_times, vec![14]);
        assert_eq!(pattern.preferred_categories, vec!["verbs"]);
    }

    #[test]
    fn test_import_rejects_future_events() {
        fn clock() -> DateTime<Utc> {
            at(10)
        }
        let mut engine = engine().with_clock(clock);
        let events = vec![
            InteractionEvent::new(at(1), InteractionType::TileClick, EventData::tile("a")),
            InteractionEvent::new(at(11), InteractionType::TileClick, EventData::tile("b")),
        ];
        assert!(matches!(
            engine.import_events(events),
            Err(AnalyticsError::InvalidEvent(_))
        ));
        assert!(engine.events().is_empty());
        assert!(engine.check_timestamp(at(10)).is_ok());
    }

    #[test]
    fn test_end_session_after_restart_uses_logged_start() {
        let mut engine = engine();
        let id = engine.begin_session_at(at(0));
        engine.record_interaction_at(InteractionType::TileClick, EventData::tile("a"), at(1));
        let store = engine.store().clone();

        let mut restarted = AnalyticsEngine::open(store, config()).unwrap();
        assert!(!restarted.session_open());
        restarted.end_session_at(None, at(5));

        let end = restarted.events().last().unwrap();
        assert_eq!(end.event_type, InteractionType::SessionEnd);
        assert_eq!(end.data.duration, Some(300_000));
        assert_eq!(end.data.session_id, Some(id));

        // Already matched, so a second end carries nothing
        restarted.end_session_at(None, at(6));
        let end = restarted.events().last().unwrap();
        assert_eq!(end.data.duration, None);
        assert_eq!(end.data.session_id, None);
    }

    #[test]
    fn test_custom_generator_drives_recommendations() {
        use crate::analytics::recommend::RecommendationRule;
        use crate::analytics::types::RecommendationType;
        use crate::settings::SettingsPatch;

        fn busy_user(pattern: &BehaviorPattern, _: &GenerationContext) -> bool {
            pattern.window_event_count >= 12
        }
        fn bigger_grid(_: &BehaviorPattern) -> SettingsPatch {
            let mut patch = SettingsPatch::new();
            patch.insert("gridColumns".to_string(), serde_json::json!(6));
            patch
        }

        let generator = RecommendationGenerator::with_rules(vec![RecommendationRule {
            id: "wider-grid",
            rec_type: RecommendationType::Layout,
            priority: Priority::High,
            confidence: 0.6,
            description: "Show more tiles per row",
            fires: busy_user,
            action: bigger_grid,
        }]);
        let mut engine = engine().with_generator(generator);
        record_struggling_usage(&mut engine);
        engine.run_analysis_at(at(1));

        let ids: Vec<&str> = engine
            .current_recommendations()
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["wider-grid"]);

        let mut settings = BoardSettings::default();
        assert!(engine.apply_recommendation("wider-grid", &mut settings).is_applied());
        assert_eq!(settings.extra["gridColumns"], serde_json::json!(6));
    }

    #[test]
    fn test_window_sessions() {
        let mut engine = engine();
        for min in [0, 1, 2, 20, 21] {
            engine.record_interaction_at(InteractionType::TileClick, EventData::tile("a"), at(min));
        }
        assert_eq!(engine.sessions().len(), 2);
        assert_eq!(engine.window_sessions(at(60 * 24 + 10)).len(), 1);
    }
}
