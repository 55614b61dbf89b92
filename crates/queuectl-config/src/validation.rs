//! Configuration validation module.
//!
//! Every snapshot is validated before it replaces the current one, so a
//! bad edit to the configuration file never reaches a running worker.

use crate::QueueConfig;
use std::fmt;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    /// Backoff base must be a positive, finite number.
    InvalidBackoffBase { value: f64 },
    /// Interval value must be positive.
    NonPositiveInterval { name: String },
    /// Stale-claim threshold must comfortably exceed the heartbeat interval.
    StaleThresholdTooShort { stale_secs: u64, heartbeat_secs: u64 },
    /// Database path is empty.
    EmptyDatabasePath,
    /// Log level is invalid.
    InvalidLogLevel { value: String },
    /// Log format is invalid.
    InvalidLogFormat { value: String },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBackoffBase { value } => {
                write!(f, "backoff_base must be a positive number, got {value}")
            }
            Self::NonPositiveInterval { name } => {
                write!(f, "{name} must be greater than zero")
            }
            Self::StaleThresholdTooShort {
                stale_secs,
                heartbeat_secs,
            } => {
                write!(
                    f,
                    "stale_claim_secs ({stale_secs}) must be more than twice heartbeat_interval_secs ({heartbeat_secs})"
                )
            }
            Self::EmptyDatabasePath => write!(f, "database_path must not be empty"),
            Self::InvalidLogLevel { value } => {
                write!(
                    f,
                    "Invalid log level: {value} (expected trace, debug, info, warn or error)"
                )
            }
            Self::InvalidLogFormat { value } => {
                write!(f, "Invalid log format: {value} (expected pretty or json)")
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Result of configuration validation containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ConfigValidationError>,
}

impl ValidationResult {
    fn add_error(&mut self, error: ConfigValidationError) {
        self.errors.push(error);
    }

    /// Converts to Result, returning Err with all errors if any exist.
    ///
    /// # Errors
    ///
    /// Returns every validation error collected.
    pub fn into_result(self) -> Result<(), Vec<ConfigValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Valid log levels.
    const VALID_LOG_LEVELS: &'static [&'static str] = &["trace", "debug", "info", "warn", "error"];
    /// Valid log formats.
    const VALID_LOG_FORMATS: &'static [&'static str] = &["pretty", "json"];

    /// Validates the queue configuration.
    ///
    /// # Errors
    ///
    /// Returns all validation errors found.
    pub fn validate(config: &QueueConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut result = ValidationResult::default();

        Self::validate_retry(config, &mut result);
        Self::validate_timing(config, &mut result);
        Self::validate_storage(config, &mut result);
        Self::validate_logging(config, &mut result);

        result.into_result()
    }

    fn validate_retry(config: &QueueConfig, result: &mut ValidationResult) {
        if !config.backoff_base.is_finite() || config.backoff_base <= 0.0 {
            result.add_error(ConfigValidationError::InvalidBackoffBase {
                value: config.backoff_base,
            });
        }
    }

    fn validate_timing(config: &QueueConfig, result: &mut ValidationResult) {
        if config.poll_interval_ms == 0 {
            result.add_error(ConfigValidationError::NonPositiveInterval {
                name: "poll_interval_ms".to_string(),
            });
        }

        if config.heartbeat_interval_secs == 0 {
            result.add_error(ConfigValidationError::NonPositiveInterval {
                name: "heartbeat_interval_secs".to_string(),
            });
        }

        if config.stale_claim_secs <= config.heartbeat_interval_secs.saturating_mul(2) {
            result.add_error(ConfigValidationError::StaleThresholdTooShort {
                stale_secs: config.stale_claim_secs,
                heartbeat_secs: config.heartbeat_interval_secs,
            });
        }
    }

    fn validate_storage(config: &QueueConfig, result: &mut ValidationResult) {
        if config.database_path.trim().is_empty() {
            result.add_error(ConfigValidationError::EmptyDatabasePath);
        }
    }

    fn validate_logging(config: &QueueConfig, result: &mut ValidationResult) {
        let level = config.log_level.to_lowercase();
        if !Self::VALID_LOG_LEVELS.contains(&level.as_str()) {
            result.add_error(ConfigValidationError::InvalidLogLevel {
                value: config.log_level.clone(),
            });
        }

        let format = config.log_format.to_lowercase();
        if !Self::VALID_LOG_FORMATS.contains(&format.as_str()) {
            result.add_error(ConfigValidationError::InvalidLogFormat {
                value: config.log_format.clone(),
            });
        }
    }
}

/// Formats validation errors for display.
#[must_use]
pub fn format_validation_errors(errors: &[ConfigValidationError]) -> String {
    let mut output = String::from("Configuration validation failed:");
    for (i, error) in errors.iter().enumerate() {
        output.push_str(&format!("\n  {}. {}", i + 1, error));
    }
    output
}
