//! Configuration loader with layered sources.

use crate::{ConfigError, ConfigResult, ConfigValidator, QueueConfig};
use config::{Config, Environment, File, FileFormat};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Configuration file used when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Prefix of environment variables that override file values.
pub const ENV_PREFIX: &str = "QUEUECTL";

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<QueueConfig>>,
    path: PathBuf,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. Built-in defaults
    /// 2. The JSON file at `path`, if it exists
    /// 3. Environment variables with the `QUEUECTL_` prefix
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or the result is invalid.
    pub fn new(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let path = path.into();
        let config = Self::load_config(&path)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            path,
        })
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> QueueConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from all sources and returns the new snapshot.
    ///
    /// The previous snapshot is kept if loading fails.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or the result is invalid.
    pub async fn reload(&self) -> ConfigResult<QueueConfig> {
        let new_config = Self::load_config(&self.path)?;
        let mut config = self.config.write().await;
        if *config != new_config {
            info!(path = %self.path.display(), "Configuration reloaded with changes");
        }
        *config = new_config.clone();
        Ok(new_config)
    }

    /// Gets the effective value of a single configuration key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownKey`] for unrecognised keys.
    pub async fn get_value(&self, key: &str) -> ConfigResult<Value> {
        if !QueueConfig::is_known_key(key) {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let config = self.config.read().await;
        let json = serde_json::to_value(&*config)?;
        json.get(key)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))
    }

    /// Persists a single key to the configuration file.
    ///
    /// Numeric strings are stored as numbers and `true`/`false` as booleans.
    /// The file is only rewritten when the resulting document is valid.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown keys, values of the wrong type, values
    /// that fail validation, or file I/O failures.
    pub async fn set_value(&self, key: &str, raw: &str) -> ConfigResult<Value> {
        if !QueueConfig::is_known_key(key) {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut document = self.read_document()?;
        let value = parse_value(raw);
        document.insert(key.to_string(), value.clone());

        let candidate: QueueConfig = serde_json::from_value(Value::Object(document.clone()))
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        ConfigValidator::validate(&candidate).map_err(ConfigError::Validation)?;

        self.write_document(&document)?;
        self.reload().await?;

        info!(key, value = %value, path = %self.path.display(), "Configuration value updated");
        Ok(value)
    }

    fn read_document(&self) -> ConfigResult<Map<String, Value>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(Map::new()),
            Ok(text) => match serde_json::from_str::<Value>(&text)? {
                Value::Object(map) => Ok(map),
                _ => Err(ConfigError::NotAnObject(self.path.display().to_string())),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                match serde_json::to_value(QueueConfig::default())? {
                    Value::Object(map) => Ok(map),
                    _ => Ok(Map::new()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_document(&self, document: &Map<String, Value>) -> ConfigResult<()> {
        let text = serde_json::to_string_pretty(document)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, text + "\n")?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Loads configuration from the given file and the process environment.
    fn load_config(path: &Path) -> ConfigResult<QueueConfig> {
        Self::load_from(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_from(path: &Path, environment: Environment) -> ConfigResult<QueueConfig> {
        let mut builder = Config::builder();

        if path.exists() {
            debug!("Loading config from: {}", path.display());
            builder = builder
                .add_source(File::new(&path.to_string_lossy(), FileFormat::Json).required(false));
        }

        builder = builder.add_source(environment.try_parsing(true));

        let config: QueueConfig = builder.build()?.try_deserialize()?;
        ConfigValidator::validate(&config).map_err(ConfigError::Validation)?;

        Ok(config)
    }
}

/// Interprets a command-line value the way a person typing it would expect.
fn parse_value(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = raw.parse::<f64>() {
        if float.is_finite() {
            return Value::from(float);
        }
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_path(dir: &TempDir) -> PathBuf {
        dir.path().join("config.json")
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new(config_path(&dir)).unwrap();

        let config = loader.get().await;
        assert_eq!(config.max_retries, 3);
        assert!((config.backoff_base - 2.0).abs() < f64::EPSILON);
        assert!(!config_path(&dir).exists());
    }

    #[tokio::test]
    async fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            config_path(&dir),
            r#"{"max_retries": 5, "backoff_base": 3, "database_path": "jobs.db"}"#,
        )
        .unwrap();

        let loader = ConfigLoader::new(config_path(&dir)).unwrap();
        let config = loader.get().await;
        assert_eq!(config.max_retries, 5);
        assert!((config.backoff_base - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.database_path, "jobs.db");
    }

    #[tokio::test]
    async fn test_invalid_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(config_path(&dir), r#"{"backoff_base": 0}"#).unwrap();

        let result = ConfigLoader::new(config_path(&dir));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[tokio::test]
    async fn test_reload_observes_file_changes() {
        let dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new(config_path(&dir)).unwrap();
        assert_eq!(loader.get().await.max_retries, 3);

        std::fs::write(config_path(&dir), r#"{"max_retries": 9}"#).unwrap();
        let reloaded = loader.reload().await.unwrap();

        assert_eq!(reloaded.max_retries, 9);
        assert_eq!(loader.get().await.max_retries, 9);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        std::fs::write(config_path(&dir), r#"{"max_retries": 4}"#).unwrap();
        let loader = ConfigLoader::new(config_path(&dir)).unwrap();

        std::fs::write(config_path(&dir), "{ not json").unwrap();
        assert!(loader.reload().await.is_err());
        assert_eq!(loader.get().await.max_retries, 4);
    }

    #[tokio::test]
    async fn test_set_value_creates_file_and_casts_numbers() {
        let dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new(config_path(&dir)).unwrap();

        let stored = loader.set_value("max_retries", "5").await.unwrap();
        assert_eq!(stored, Value::from(5));
        loader.set_value("backoff_base", "1.5").await.unwrap();

        let text = std::fs::read_to_string(config_path(&dir)).unwrap();
        let document: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(document["max_retries"], Value::from(5));
        assert_eq!(document["backoff_base"], Value::from(1.5));
        assert_eq!(document["poll_interval_ms"], Value::from(1000));

        assert_eq!(loader.get().await.max_retries, 5);
        assert_eq!(loader.get_value("backoff_base").await.unwrap(), Value::from(1.5));
    }

    #[tokio::test]
    async fn test_set_value_rejects_unknown_key() {
        let dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new(config_path(&dir)).unwrap();

        let result = loader.set_value("retries", "5").await;
        assert!(matches!(result, Err(ConfigError::UnknownKey(_))));
        assert!(!config_path(&dir).exists());
    }

    #[tokio::test]
    async fn test_set_value_rejects_wrong_type() {
        let dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new(config_path(&dir)).unwrap();

        let result = loader.set_value("max_retries", "lots").await;
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_set_value_rejects_invalid_document() {
        let dir = TempDir::new().unwrap();
        std::fs::write(config_path(&dir), r#"{"backoff_base": 2}"#).unwrap();
        let loader = ConfigLoader::new(config_path(&dir)).unwrap();

        let result = loader.set_value("backoff_base", "-1").await;
        assert!(matches!(result, Err(ConfigError::Validation(_))));

        let text = std::fs::read_to_string(config_path(&dir)).unwrap();
        assert_eq!(text, r#"{"backoff_base": 2}"#);
    }

    #[tokio::test]
    async fn test_get_value_unknown_key() {
        let dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new(config_path(&dir)).unwrap();
        assert!(matches!(
            loader.get_value("nope").await,
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(config_path(&dir), r#"{"log_format": "pretty", "max_retries": 2}"#).unwrap();

        let mut vars = config::Map::new();
        vars.insert("QUEUECTL_LOG_FORMAT".to_string(), "json".to_string());
        vars.insert("QUEUECTL_MAX_RETRIES".to_string(), "7".to_string());
        let environment = Environment::with_prefix(ENV_PREFIX).source(Some(vars));

        let config = ConfigLoader::load_from(&config_path(&dir), environment).unwrap();
        assert!(config.json_logs());
        assert_eq!(config.max_retries, 7);
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("3"), Value::from(3));
        assert_eq!(parse_value("2.5"), Value::from(2.5));
        assert_eq!(parse_value("true"), Value::Bool(true));
        assert_eq!(parse_value("info"), Value::String("info".into()));
        assert_eq!(parse_value("NaN"), Value::String("NaN".into()));
    }
}
