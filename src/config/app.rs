//! Application configuration structures.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::storage::{DEFAULT_CHANNEL_CAPACITY, normalize_retention_days};
use crate::storage::retention::DEFAULT_RETENTION_DAYS;

use super::validation::{ConfigError, expand_env_vars};

// =============================================================================
// Constants
// =============================================================================

/// Default daemon port; producers point at it out of the box.
pub const DEFAULT_PORT: u16 = 8001;

/// Default database location, relative to the working directory.
pub const DEFAULT_DATABASE_URL: &str = "loghound.db";

/// Default interval between retention sweeps (1 hour).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Shortest accepted sweep interval.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "127.0.0.1").
    pub bind: String,

    /// Server port (default: 8001).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite URL or plain file path (`sqlite::memory:` for a throwaway store).
    pub url: String,

    /// Writer channel capacity (default: 1024).
    pub channel_capacity: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

// =============================================================================
// Retention Configuration
// =============================================================================

/// Retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Days of logs kept, clamped to [1, 365]; anything non-integer means 7.
    #[serde(deserialize_with = "deserialize_retention_days")]
    pub days: u32,

    /// How often the retention sweep runs (default: 1h).
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: DEFAULT_RETENTION_DAYS,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

fn deserialize_retention_days<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    let text = match raw {
        None | Some(serde_yaml::Value::Null) => None,
        Some(serde_yaml::Value::String(s)) => Some(s),
        Some(serde_yaml::Value::Number(n)) => Some(n.to_string()),
        Some(serde_yaml::Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(format!("{other:?}")),
    };
    Ok(normalize_retention_days(text.as_deref()))
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Web server configuration.
    pub server: ServerConfig,

    /// Database configuration.
    pub database: DatabaseConfig,

    /// Retention configuration.
    pub retention: RetentionConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` references are expanded before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        // An empty document means "all defaults".
        let config: Self = if expanded.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&expanded)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::invalid(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::invalid("server port must be non-zero"));
        }

        if self.database.url.trim().is_empty() {
            return Err(ConfigError::invalid("database url must not be empty"));
        }

        if self.database.channel_capacity == 0 {
            return Err(ConfigError::invalid(
                "database channel_capacity must be positive",
            ));
        }

        if self.retention.sweep_interval < MIN_SWEEP_INTERVAL {
            return Err(ConfigError::invalid(format!(
                "retention sweep_interval must be at least {}",
                humantime::format_duration(MIN_SWEEP_INTERVAL)
            )));
        }

        Ok(())
    }
}
