//! Producer-side configuration.
//!
//! Values come from explicit `with_*` setters first, then `LOGHOUND_*`
//! environment variables, then built-in defaults.

use std::time::Duration;

use url::Url;

use crate::client::ClientError;

pub const ENV_APPLICATION_ID: &str = "LOGHOUND_APPLICATION_ID";
pub const ENV_DAEMON_URL: &str = "LOGHOUND_DAEMON_URL";
pub const ENV_SERVICE_NAME: &str = "LOGHOUND_SERVICE_NAME";
pub const ENV_ENABLED: &str = "LOGHOUND_ENABLED";
pub const ENV_QUEUE_SIZE: &str = "LOGHOUND_QUEUE_SIZE";
pub const ENV_BATCH_SIZE: &str = "LOGHOUND_BATCH_SIZE";
pub const ENV_HTTP_TIMEOUT: &str = "LOGHOUND_HTTP_TIMEOUT";

/// Used when no application id is configured anywhere, so producers never
/// fail to start over a missing label.
pub const DEFAULT_APPLICATION_ID: &str = "my-app";
pub const DEFAULT_DAEMON_URL: &str = "http://localhost:8001/logs/ingest";
pub const DEFAULT_QUEUE_SIZE: usize = 1000;
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(1);

/// Producer client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub application_id: String,
    pub daemon_url: Url,
    pub service_name: Option<String>,
    pub enabled: bool,
    pub queue_size: usize,
    pub batch_size: usize,
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            application_id: DEFAULT_APPLICATION_ID.to_string(),
            daemon_url: Url::parse(DEFAULT_DAEMON_URL).expect("default daemon URL is valid"),
            service_name: None,
            enabled: true,
            queue_size: DEFAULT_QUEUE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(app) = non_empty(ENV_APPLICATION_ID) {
            config.application_id = app;
        }
        if let Some(url) = non_empty(ENV_DAEMON_URL) {
            config.daemon_url = validate_daemon_url(&url)?;
        }
        config.service_name = non_empty(ENV_SERVICE_NAME);
        config.enabled = parse_enabled(lookup(ENV_ENABLED).as_deref());

        if let Some(raw) = non_empty(ENV_QUEUE_SIZE) {
            config.queue_size = parse_positive(ENV_QUEUE_SIZE, &raw)?;
        }
        if let Some(raw) = non_empty(ENV_BATCH_SIZE) {
            config.batch_size = parse_positive(ENV_BATCH_SIZE, &raw)?;
        }
        if let Some(raw) = non_empty(ENV_HTTP_TIMEOUT) {
            config.http_timeout =
                humantime::parse_duration(raw.trim()).map_err(|e| ClientError::InvalidSetting {
                    name: ENV_HTTP_TIMEOUT,
                    value: raw.clone(),
                    reason: e.to_string(),
                })?;
        }

        Ok(config)
    }

    pub fn with_application_id(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = application_id.into();
        self
    }

    pub fn with_daemon_url(mut self, url: &str) -> Result<Self, ClientError> {
        self.daemon_url = validate_daemon_url(url)?;
        Ok(self)
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

/// Accept only absolute http(s) URLs with a host.
pub fn validate_daemon_url(raw: &str) -> Result<Url, ClientError> {
    let invalid = |reason: &str| ClientError::InvalidDaemonUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(url)
}

/// Unset means enabled; recognized falsy values disable; anything else
/// unrecognized also disables.
fn parse_enabled(raw: Option<&str>) -> bool {
    let Some(raw) = raw else {
        return true;
    };
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_positive(name: &'static str, raw: &str) -> Result<usize, ClientError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ClientError::InvalidSetting {
            name,
            value: raw.to_string(),
            reason: "expected a positive integer".to_string(),
        }),
    }
}
