//! Error types for aac-insight

use thiserror::Error;

/// Errors that can occur inside the analytics core
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid interaction event: {0}")]
    InvalidEvent(String),

    #[error("Settings patch rejected: {0}")]
    SettingsRejected(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
