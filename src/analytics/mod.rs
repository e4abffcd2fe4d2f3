//! Behavior analytics and adaptive recommendations
//!
//! This module turns the stream of board interactions into a usage profile and
//! the profile into configuration recommendations.
//!
//! Pipeline: Event log → Segmenter → Analyzer → Generator → (on request) Applier

pub mod analyzer;
pub mod applier;
pub mod engine;
pub mod recommend;
pub mod segmenter;
pub mod types;

pub use analyzer::{classify_difficulty, PatternAnalyzer};
pub use applier::{ApplyStatus, ApplySummary, DEFAULT_BATCH_PRIORITIES};
pub use engine::{AnalysisOutcome, AnalysisSnapshot, AnalyticsEngine, EngineState};
pub use recommend::{GenerationContext, RecommendationGenerator, RecommendationRule, DEFAULT_RULES};
pub use segmenter::segment_sessions;
pub use types::{
    AccessibilityNeeds, BehaviorPattern, CommunicationStyle, DifficultyLevel, EventData,
    InteractionEvent, InteractionType, Priority, Recommendation, RecommendationType, Session,
};
