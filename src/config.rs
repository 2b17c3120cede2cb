//! Engine configuration with TOML load/save helpers.

use crate::error::EngineError;
use crate::repeat::WaitStrategy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Configuration of a single scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub name: String,
    /// Maximum number of tasks executing at once; `None` is unlimited
    pub max_concurrent_tasks: Option<usize>,
    /// Hold submitted tasks until the scheduler is resumed
    pub start_suspended: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "tasklane".to_string(),
            max_concurrent_tasks: None,
            start_suspended: false,
        }
    }
}

impl SchedulerConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_concurrent_tasks(mut self, limit: usize) -> Self {
        self.max_concurrent_tasks = Some(limit);
        self
    }

    pub fn suspended(mut self) -> Self {
        self.start_suspended = true;
        self
    }
}

/// Defaults for [`RetryTask`](crate::repeat::RetryTask)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts; `None` retries until the handler gives up
    pub max_attempts: Option<usize>,
    /// Wait between attempts
    pub wait: WaitStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            wait: WaitStrategy::Constant(std::time::Duration::from_millis(100)),
        }
    }
}

/// Subscriber settings used by [`logging::init`](crate::logging::init)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset
    pub filter: String,
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "tasklane=info".to_string(),
            with_target: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_toml_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml_string()?;
        std::fs::write(path, content).context("Failed to write config file")
    }

    /// Convert configuration to a TOML string
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    /// Reject values the engine cannot honour
    pub fn validate(&self) -> std::result::Result<(), EngineError> {
        if self.scheduler.max_concurrent_tasks == Some(0) {
            return Err(EngineError::Config(
                "scheduler.max_concurrent_tasks must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(EngineError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serde adapter storing a `Duration` as whole milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
