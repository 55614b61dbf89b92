//! Queue configuration structures.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Keys accepted by `config get` and `config set`.
pub const CONFIG_KEYS: &[&str] = &[
    "max_retries",
    "backoff_base",
    "database_path",
    "poll_interval_ms",
    "heartbeat_interval_secs",
    "stale_claim_secs",
    "log_level",
    "log_format",
];

/// Process-wide queue configuration.
///
/// Every worker re-reads this document at the start of each poll cycle,
/// so retry settings take effect without a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Attempt ceiling applied to jobs enqueued without their own.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential retry backoff, in seconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,

    /// Path of the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Idle sleep between claim attempts, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How often a running job's claim is refreshed, in seconds.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Age of the last heartbeat after which a claim is considered abandoned.
    #[serde(default = "default_stale_claim_secs")]
    pub stale_claim_secs: u64,

    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format (`pretty` or `json`).
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            database_path: default_database_path(),
            poll_interval_ms: default_poll_interval_ms(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            stale_claim_secs: default_stale_claim_secs(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> f64 {
    2.0
}

fn default_database_path() -> String {
    "queuectl.db".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_heartbeat_interval_secs() -> u64 {
    5
}

fn default_stale_claim_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl QueueConfig {
    /// Returns the idle poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the claim heartbeat interval.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Returns the liveness threshold for processing claims.
    #[must_use]
    pub const fn stale_claim_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_claim_secs)
    }

    /// Returns true if logs should be emitted as JSON lines.
    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Returns true if `key` names a configuration option.
    #[must_use]
    pub fn is_known_key(key: &str) -> bool {
        CONFIG_KEYS.contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_retries, 3);
        assert!((config.backoff_base - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.database_path, "queuectl.db");
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.stale_claim_threshold(), Duration::from_secs(60));
        assert!(!config.json_logs());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: QueueConfig = serde_json::from_str(r#"{"max_retries": 7}"#).unwrap();
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(5));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_integer_backoff_base_is_accepted() {
        let config: QueueConfig = serde_json::from_str(r#"{"backoff_base": 3}"#).unwrap();
        assert!((config.backoff_base - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_known_keys_match_serialized_fields() {
        let value = serde_json::to_value(QueueConfig::default()).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), CONFIG_KEYS.len());
        for key in object.keys() {
            assert!(QueueConfig::is_known_key(key), "{key} missing from CONFIG_KEYS");
        }
    }
}
