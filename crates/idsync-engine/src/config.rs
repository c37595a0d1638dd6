//! Engine configuration.
//!
//! Batch size and parallelism are explicit settings, never auto-tuned.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use idsync_connector::resilience::RetryConfig;

use crate::protected::ProtectedAttributeTable;

/// Configuration for the outbound synchronization engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pending exports sent to a connector per call.
    #[serde(default = "default_export_batch_size")]
    pub export_batch_size: usize,

    /// Batches executed concurrently. 1 means sequential.
    #[serde(default = "default_max_export_parallelism")]
    pub max_export_parallelism: usize,

    /// Attempts before a pending export or attribute change is terminally failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in seconds.
    #[serde(default = "default_retry_initial_delay_secs")]
    pub retry_initial_delay_secs: u64,

    /// Upper bound on the retry delay, in seconds.
    #[serde(default = "default_retry_max_delay_secs")]
    pub retry_max_delay_secs: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: f64,

    /// Add up to 25% jitter to retry delays.
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter: bool,

    /// Attributes whose connected system substitutes a value for a clear.
    #[serde(default)]
    pub protected_attributes: ProtectedAttributeTable,
}

fn default_export_batch_size() -> usize {
    100
}

fn default_max_export_parallelism() -> usize {
    1
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_initial_delay_secs() -> u64 {
    30
}

fn default_retry_max_delay_secs() -> u64 {
    3600
}

fn default_retry_backoff_multiplier() -> f64 {
    2.0
}

fn default_retry_jitter() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            export_batch_size: default_export_batch_size(),
            max_export_parallelism: default_max_export_parallelism(),
            max_retries: default_max_retries(),
            retry_initial_delay_secs: default_retry_initial_delay_secs(),
            retry_max_delay_secs: default_retry_max_delay_secs(),
            retry_backoff_multiplier: default_retry_backoff_multiplier(),
            retry_jitter: default_retry_jitter(),
            protected_attributes: ProtectedAttributeTable::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads a `.env` file first when one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// Unset variables fall back to their defaults; set but unparsable
    /// variables are rejected.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let defaults = Self::default();

        let config = Self {
            export_batch_size: parse_or(&reader, "IDSYNC_EXPORT_BATCH_SIZE", defaults.export_batch_size)?,
            max_export_parallelism: parse_or(
                &reader,
                "IDSYNC_MAX_EXPORT_PARALLELISM",
                defaults.max_export_parallelism,
            )?,
            max_retries: parse_or(&reader, "IDSYNC_MAX_RETRIES", defaults.max_retries)?,
            retry_initial_delay_secs: parse_or(
                &reader,
                "IDSYNC_RETRY_INITIAL_DELAY_SECS",
                defaults.retry_initial_delay_secs,
            )?,
            retry_max_delay_secs: parse_or(
                &reader,
                "IDSYNC_RETRY_MAX_DELAY_SECS",
                defaults.retry_max_delay_secs,
            )?,
            retry_backoff_multiplier: parse_or(
                &reader,
                "IDSYNC_RETRY_BACKOFF_MULTIPLIER",
                defaults.retry_backoff_multiplier,
            )?,
            retry_jitter: parse_or(&reader, "IDSYNC_RETRY_JITTER", defaults.retry_jitter)?,
            protected_attributes: defaults.protected_attributes,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.export_batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "IDSYNC_EXPORT_BATCH_SIZE".into(),
                "must be at least 1".into(),
            ));
        }
        if self.max_export_parallelism == 0 {
            return Err(ConfigError::InvalidValue(
                "IDSYNC_MAX_EXPORT_PARALLELISM".into(),
                "must be at least 1".into(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue(
                "IDSYNC_MAX_RETRIES".into(),
                "must be at least 1".into(),
            ));
        }
        if self.retry_backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue(
                "IDSYNC_RETRY_BACKOFF_MULTIPLIER".into(),
                "must be at least 1.0".into(),
            ));
        }
        Ok(())
    }

    /// Backoff policy for rescheduling failed exports.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: Duration::from_secs(self.retry_initial_delay_secs),
            max_delay: Duration::from_secs(self.retry_max_delay_secs),
            backoff_multiplier: self.retry_backoff_multiplier,
            jitter: self.retry_jitter,
        }
    }

    #[must_use]
    pub fn with_protected_attributes(mut self, table: ProtectedAttributeTable) -> Self {
        self.protected_attributes = table;
        self
    }
}

fn parse_or<F, T>(reader: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match reader(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.into(), e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env::VarError;

    /// Create a reader closure from a HashMap (no global env mutation).
    fn make_reader(vars: HashMap<&str, &str>) -> impl Fn(&str) -> Result<String, VarError> {
        let owned: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| owned.get(key).cloned().ok_or(VarError::NotPresent)
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_reader(make_reader(HashMap::new())).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.export_batch_size, 100);
        assert_eq!(config.max_export_parallelism, 1);
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_overrides() {
        let reader = make_reader(HashMap::from([
            ("IDSYNC_EXPORT_BATCH_SIZE", "2"),
            ("IDSYNC_MAX_EXPORT_PARALLELISM", "3"),
            ("IDSYNC_RETRY_JITTER", "false"),
        ]));
        let config = EngineConfig::from_reader(reader).unwrap();
        assert_eq!(config.export_batch_size, 2);
        assert_eq!(config.max_export_parallelism, 3);
        assert!(!config.retry_config().jitter);
    }

    #[test]
    fn test_invalid_value_names_variable() {
        let reader = make_reader(HashMap::from([("IDSYNC_MAX_RETRIES", "many")]));
        let err = EngineConfig::from_reader(reader).unwrap_err();
        assert!(err.to_string().contains("IDSYNC_MAX_RETRIES"));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let reader = make_reader(HashMap::from([("IDSYNC_EXPORT_BATCH_SIZE", "0")]));
        assert!(EngineConfig::from_reader(reader).is_err());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"export_batch_size": 10}"#).unwrap();
        assert_eq!(config.export_batch_size, 10);
        assert_eq!(config.max_retries, 5);
        assert!(config.protected_attributes.is_empty());
    }

    #[test]
    fn test_retry_config_mirrors_settings() {
        let retry = EngineConfig::default().retry_config();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.initial_delay, Duration::from_secs(30));
        assert_eq!(retry.max_delay, Duration::from_secs(3600));
    }
}
