//! Canonical log event shapes shared by the producer client and the daemon.
//!
//! - [`LogRecord`]: one observed event
//! - [`LogBatch`]: envelope submitted to the ingestion endpoint
//! - [`LogLevel`]: severity with a fixed total order
//! - [`StoredLog`]: a record as read back from storage, with its insertion id

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Open metadata map attached to every record.
///
/// Keys are free-form (language, thread id, request id, environment, ...), so
/// new producers can add keys without any schema change on the daemon side.
pub type Context = serde_json::Map<String, serde_json::Value>;

/// Current wall-clock time as floating-point Unix seconds (UTC).
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

// =============================================================================
// Level
// =============================================================================

/// Log severity.
///
/// Ordered `Debug < Info < Warn < Error < Critical`. Parsing is
/// case-insensitive and accepts `WARNING` as an alias for `WARN`; the
/// normalized form is always the upper-case canonical name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumString,
    Display,
    AsRefStr,
    EnumIter,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    #[strum(to_string = "WARN", serialize = "WARNING")]
    Warn = 2,
    Error = 3,
    Critical = 4,
}

impl LogLevel {
    /// Numeric rank used for `min_level` filtering.
    pub fn rank(self) -> i64 {
        self as i64
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_ref())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        LogLevel::from_str(raw.trim()).map_err(|_| {
            serde::de::Error::custom(format!(
                "unknown level '{raw}', expected one of DEBUG, INFO, WARN, WARNING, ERROR, CRITICAL"
            ))
        })
    }
}

// =============================================================================
// Records
// =============================================================================

/// One observed log event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Producer-assigned creation time, Unix seconds (UTC).
    pub ts: f64,
    pub level: LogLevel,
    pub message: String,
    pub application_id: String,
    #[serde(default)]
    pub service_name: Option<String>,
    pub module_name: String,

    // Error context, only populated for error-like events.
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub line_no: Option<i64>,
    #[serde(default)]
    pub exception_type: Option<String>,
    #[serde(default)]
    pub stacktrace: Option<String>,

    #[serde(default)]
    pub context: Context,
}

impl LogRecord {
    /// Create a record with the required fields; optional fields start empty.
    pub fn new(
        ts: f64,
        level: LogLevel,
        message: impl Into<String>,
        application_id: impl Into<String>,
        module_name: impl Into<String>,
    ) -> Self {
        Self {
            ts,
            level,
            message: message.into(),
            application_id: application_id.into(),
            service_name: None,
            module_name: module_name.into(),
            file_path: None,
            line_no: None,
            exception_type: None,
            stacktrace: None,
            context: Context::new(),
        }
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    pub fn with_location(mut self, file_path: impl Into<String>, line_no: i64) -> Self {
        self.file_path = Some(file_path.into());
        self.line_no = Some(line_no);
        self
    }

    pub fn with_exception(
        mut self,
        exception_type: impl Into<String>,
        stacktrace: impl Into<String>,
    ) -> Self {
        self.exception_type = Some(exception_type.into());
        self.stacktrace = Some(stacktrace.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// A record read back from storage together with its insertion sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLog {
    /// Insertion sequence; stable tie-break for records sharing a timestamp.
    pub id: i64,
    #[serde(flatten)]
    pub record: LogRecord,
}

// =============================================================================
// Batch
// =============================================================================

/// Envelope used to submit a group of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogBatch {
    pub application_id: String,
    pub logs: Vec<LogRecord>,
}

/// Structural problem with a batch that serde alone cannot catch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchShapeError(pub String);

impl fmt::Display for BatchShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for BatchShapeError {}

impl LogBatch {
    pub fn new(application_id: impl Into<String>, logs: Vec<LogRecord>) -> Self {
        Self {
            application_id: application_id.into(),
            logs,
        }
    }

    /// Check envelope constraints beyond what deserialization enforces.
    pub fn validate(&self) -> Result<(), BatchShapeError> {
        if self.application_id.trim().is_empty() {
            return Err(BatchShapeError("application_id must not be empty".to_string()));
        }
        for (i, log) in self.logs.iter().enumerate() {
            if !log.ts.is_finite() {
                return Err(BatchShapeError(format!("logs[{i}].ts must be a finite number")));
            }
            if log.application_id.trim().is_empty() {
                return Err(BatchShapeError(format!(
                    "logs[{i}].application_id must not be empty"
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}
