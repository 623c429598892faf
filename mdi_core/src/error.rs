//! Error types for the mdi_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for mdi_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input failed a range or shape check before any calculation ran
    #[error("Validation error: {field} {constraint}")]
    Validation { field: String, constraint: String },

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

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
    /// Build a validation error for `field` violating `constraint`
    pub fn validation(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            constraint: constraint.into(),
        }
    }

    /// Field path of a validation error, if this is one
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}
