//! Error types for retrier configuration

use thiserror::Error;

/// Result type alias using retrier's configuration error
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while constructing a retrier
///
/// These describe programming or deployment mistakes, not runtime failures of
/// the retried operation; see [`RetryError`](crate::retry::RetryError) for
/// those.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No delay policy was supplied to the builder
    #[error("retrier requires a delay policy")]
    MissingDelayPolicy,

    /// No attempt gate was supplied to the builder
    #[error("retrier requires an attempt gate")]
    MissingAttemptGate,

    /// A configured value is out of range
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }
}
