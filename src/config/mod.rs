//! Configuration module for the loghound daemon.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Database settings (URL, writer channel capacity)
//! - Retention settings (days kept, sweep interval)

mod app;
mod validation;

pub use app::{AppConfig, DatabaseConfig, RetentionConfig, ServerConfig};
pub use validation::{ConfigError, expand_env_vars};

// Re-export constants
pub use app::{DEFAULT_DATABASE_URL, DEFAULT_PORT, DEFAULT_SWEEP_INTERVAL};
