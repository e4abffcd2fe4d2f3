//! aac-insight - On-device behavior analytics for AAC communication boards
//!
//! The engine records every board interaction in a durable local log, derives a
//! usage profile from a trailing window, and turns that profile into
//! configuration recommendations the user can accept:
//! event log → session segmentation → pattern analysis → recommendation
//! generation → (on request) settings application.
//!
//! ## Modules
//!
//! - **Analytics**: the engine, analyzer, rule table and applier
//! - **Store**: durable event log over a pluggable key-value store
//! - **Scheduler**: periodic analysis for an engine shared across threads
//! - **FFI**: C ABI for host UIs written in other languages

pub mod analytics;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod settings;
pub mod store;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use analytics::{
    AnalysisOutcome, AnalyticsEngine, ApplyStatus, ApplySummary, BehaviorPattern, EventData,
    InteractionEvent, InteractionType, Priority, Recommendation,
};
pub use config::EngineConfig;
pub use error::AnalyticsError;
pub use scheduler::{CancellationToken, PeriodicAnalysis, SharedEngine};
pub use settings::{BoardSettings, SettingsPatch, SettingsTarget};
pub use store::{EventLog, FileStore, KeyValueStore, MemoryStore};

/// Library version
pub const AAC_INSIGHT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "aac-insight";
