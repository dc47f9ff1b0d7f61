use std::time::Duration;

use thiserror::Error;

use crate::context::Context;
use crate::telemetry::LogFormat;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the metadata database file.
    pub data_dir: String,
    /// Default deadline for service operations. `None` means no deadline.
    pub operation_timeout: Option<Duration>,
    pub log_format: LogFormat,
    /// Enables dangerous operations like purge. Must never be true in production.
    pub test_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            operation_timeout: Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
            log_format: LogFormat::Plain,
            test_mode: false,
        }
    }
}

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("DATA_DIR").unwrap_or_else(|| "./data".to_string());

        let operation_timeout = match lookup("OPERATION_TIMEOUT_MS") {
            Some(raw) => {
                let ms: u64 = raw.trim().parse().map_err(|_| {
                    ConfigError::ValidationError(format!(
                        "OPERATION_TIMEOUT_MS must be a number of milliseconds, got {raw:?}"
                    ))
                })?;
                (ms > 0).then(|| Duration::from_millis(ms))
            }
            None => Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
        };

        let log_format = lookup("LOG_FORMAT")
            .map(|v| LogFormat::parse(&v))
            .unwrap_or_default();

        let test_mode = lookup("TEST_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let config = Config {
            data_dir,
            operation_timeout,
            log_format,
            test_mode,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "DATA_DIR cannot be empty".to_string(),
            ));
        }

        if self.test_mode {
            tracing::warn!("TEST_MODE is enabled. Destructive purge operations are allowed.");
        }

        Ok(())
    }

    /// A fresh context carrying the configured operation deadline.
    pub fn context(&self) -> Context {
        match self.operation_timeout {
            Some(timeout) => Context::with_timeout(timeout),
            None => Context::background(),
        }
    }
}
