//! Configuration structures for ixstream.
//!
//! Configuration is loaded from TOML files and can be overridden via CLI flags.

use crate::event::VersionOrdering;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Consumer configuration
    #[serde(default)]
    pub consumer: ConsumerConfig,

    /// Pipeline controller configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Index store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Consumer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumerConfig {
    /// Total order applied to version tokens
    #[serde(default)]
    pub version_ordering: VersionOrdering,

    /// Reject out-of-order and stale batches instead of applying them as given
    #[serde(default = "default_enabled")]
    pub validate_ordering: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            version_ordering: VersionOrdering::default(),
            validate_ordering: default_enabled(),
        }
    }
}

/// Pipeline controller configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Maximum events per delivered batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How long to wait for a batch to fill, in milliseconds
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,

    /// Advisory weight admitted but not yet delivered
    #[serde(default = "default_max_pending_weight")]
    pub max_pending_weight: u64,

    /// Retries of a failed batch before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay in milliseconds (doubles per attempt)
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Retry delay cap in milliseconds
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl PipelineConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            max_pending_weight: default_max_pending_weight(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

/// Index store configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Document limit (0 = unbounded)
    #[serde(default)]
    pub max_documents: usize,
}

/// Monitoring configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Directive string for an env filter.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Plain text format
    Text,
}

// Default value functions
fn default_enabled() -> bool {
    true
}
fn default_batch_size() -> usize {
    1000
}
fn default_batch_timeout_ms() -> u64 {
    500
}
fn default_max_pending_weight() -> u64 {
    64 * 1024 * 1024 // 64 MiB of serialized payload
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    100
}
fn default_retry_max_delay_ms() -> u64 {
    5000
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        let pipeline = &self.pipeline;

        if pipeline.batch_size == 0 {
            return Err(crate::Error::Config(
                "Pipeline batch_size must be greater than zero".into(),
            ));
        }

        if pipeline.batch_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "Pipeline batch_timeout_ms must be greater than zero".into(),
            ));
        }

        if pipeline.max_pending_weight == 0 {
            return Err(crate::Error::Config(
                "Pipeline max_pending_weight must be greater than zero".into(),
            ));
        }

        if pipeline.retry_base_delay_ms > pipeline.retry_max_delay_ms {
            return Err(crate::Error::Config(format!(
                "Retry base delay {}ms exceeds max delay {}ms",
                pipeline.retry_base_delay_ms, pipeline.retry_max_delay_ms
            )));
        }

        if !self.consumer.validate_ordering {
            tracing::warn!(
                "Ordering validation disabled: out-of-order batches will be applied as given"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.consumer.version_ordering, VersionOrdering::Numeric);
        assert!(config.consumer.validate_ordering);
        assert_eq!(config.pipeline.batch_size, 1000);
        assert_eq!(config.pipeline.batch_timeout(), Duration::from_millis(500));
        assert_eq!(config.pipeline.max_pending_weight, 64 * 1024 * 1024);
        assert_eq!(config.pipeline.max_retries, 3);
        assert_eq!(config.store.max_documents, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.pipeline.batch_size, 1000);
        assert_eq!(config.monitoring.log_format, LogFormat::Json);
    }

    #[test]
    fn test_parse_full_toml() {
        let content = r#"
            [consumer]
            version_ordering = "lexicographic"
            validate_ordering = false

            [pipeline]
            batch_size = 10
            batch_timeout_ms = 50
            max_pending_weight = 4096
            max_retries = 1

            [store]
            max_documents = 100

            [monitoring]
            log_level = "debug"
            log_format = "text"
        "#;
        let config: Config = toml::from_str(content).unwrap();

        assert_eq!(
            config.consumer.version_ordering,
            VersionOrdering::Lexicographic
        );
        assert!(!config.consumer.validate_ordering);
        assert_eq!(config.pipeline.batch_size, 10);
        assert_eq!(config.pipeline.max_pending_weight, 4096);
        assert_eq!(config.pipeline.retry_base_delay_ms, 100);
        assert_eq!(config.store.max_documents, 100);
        assert_eq!(config.monitoring.log_level, LogLevel::Debug);
        assert_eq!(config.monitoring.log_format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_batch_size() {
        let mut config = Config::default();
        config.pipeline.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_config_validation_zero_weight() {
        let mut config = Config::default();
        config.pipeline.max_pending_weight = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_pending_weight"));
    }

    #[test]
    fn test_config_validation_retry_delays() {
        let mut config = Config::default();
        config.pipeline.retry_base_delay_ms = 10_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Retry base delay"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nbatch_size = 7").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.pipeline.batch_size, 7);
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nbatch_size = 0").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_log_level_variants() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Warn.as_str(), "warn");
    }
}
