//! Configuration error types.

use crate::validation::{format_validation_errors, ConfigValidationError};
use thiserror::Error;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration source could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The loaded configuration failed validation.
    #[error("{}", format_validation_errors(.0))]
    Validation(Vec<ConfigValidationError>),

    /// The key is not a recognised configuration option.
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// The value cannot be stored under the given key.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// The configuration file holds something other than a JSON object.
    #[error("Configuration file {0} must contain a JSON object")]
    NotAnObject(String),

    /// Reading or writing the configuration file failed.
    #[error("Configuration file error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON.
    #[error("Configuration serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
