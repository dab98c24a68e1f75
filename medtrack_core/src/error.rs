//! Error types for the medtrack_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for medtrack_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed user input, rejected at the construction boundary
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// The schedule-suggestion service was unreachable, timed out,
    /// was cancelled, or returned output of the wrong shape
    #[error("Suggestion failed: {0}")]
    SuggestionFailure(String),

    /// Referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a validation error for a named input field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for errors the user can fix by correcting their input
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }
}
