//! Error types for the regimen_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for regimen_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A time-of-day string that is not 24-hour `HH:MM`
    #[error("Invalid time of day {0:?}: expected HH:MM")]
    InvalidTimeOfDay(String),

    /// A timestamp that is not ISO-8601
    #[error("Invalid instant {0:?}: expected ISO-8601")]
    InvalidInstant(String),

    /// An active-range bound that is neither a date nor an instant
    #[error("Invalid active bound {0:?}: expected YYYY-MM-DD or ISO-8601 instant")]
    InvalidBound(String),

    /// A stored item record that could not be reconstructed
    #[error("Invalid record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },

    /// No tracked item with this identifier
    #[error("Unknown item: {0}")]
    UnknownItem(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
