//! Time-range query model and SQL construction.
//!
//! A [`LogQuery`] is validated into a [`QueryPlan`] before touching the
//! database, so every caller mistake surfaces as a [`QueryError`] with a
//! stable code. Results are always ordered `ts DESC, id DESC`; the cursor
//! condition uses the same key so pages never overlap or skip rows.

use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{QueryBuilder, Row};
use thiserror::Error;

use crate::model::{Context, LogLevel, LogRecord, StoredLog};
use crate::storage::StorageError;
use crate::storage::cursor::CursorPosition;

// =============================================================================
// Constants
// =============================================================================

pub const DEFAULT_QUERY_LIMIT: u32 = 100;
pub const MAX_QUERY_LIMIT: u32 = 1000;

/// Longest accepted `message_regex`.
pub const MAX_PATTERN_LEN: usize = 500;

/// Rows fetched per round while scanning for message matches.
pub(crate) const MESSAGE_SCAN_CHUNK: u32 = 500;

/// Compiled regex size ceiling.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

const SELECT_COLUMNS: &str = "SELECT id, ts, level, message, application_id, service_name, \
     module_name, file_path, line_no, exception_type, stacktrace, context FROM logs";

// =============================================================================
// Errors
// =============================================================================

/// Query failures. Everything except [`QueryError::Storage`] is a caller error.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("start_ts ({start}) must not be after end_ts ({end})")]
    InvalidTimeRange { start: f64, end: f64 },

    #[error("invalid time value for '{param}': {value}")]
    InvalidTimeFormat { param: &'static str, value: String },

    #[error("unknown level '{0}', expected one of DEBUG, INFO, WARN, WARNING, ERROR, CRITICAL")]
    InvalidLevel(String),

    #[error("message_contains and message_regex are mutually exclusive")]
    ConflictingMessageFilters,

    #[error("invalid regex pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl QueryError {
    /// Stable machine-readable code reported to HTTP callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTimeRange { .. } => "INVALID_TIME_RANGE",
            Self::InvalidTimeFormat { .. } => "INVALID_TIME_FORMAT",
            Self::InvalidLevel(_) => "INVALID_LEVEL",
            Self::ConflictingMessageFilters => "INVALID_PARAMS",
            Self::InvalidPattern(_) => "INVALID_PATTERN",
            Self::InvalidCursor(_) => "INVALID_CURSOR",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    pub fn is_caller_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(StorageError::Database(e))
    }
}

// =============================================================================
// Query Types
// =============================================================================

/// Filtered, paginated time-range query.
///
/// Both time bounds are inclusive. Empty `module_names` / `service_names`
/// mean "any"; several values match with `IN` semantics.
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub start_ts: f64,
    pub end_ts: f64,
    pub application_id: Option<String>,
    pub module_names: Vec<String>,
    pub service_names: Vec<String>,
    pub message_contains: Option<String>,
    pub message_regex: Option<String>,
    pub min_level: Option<LogLevel>,
    pub cursor: Option<String>,
    pub limit: u32,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            start_ts: 0.0,
            end_ts: f64::MAX,
            application_id: None,
            module_names: Vec::new(),
            service_names: Vec::new(),
            message_contains: None,
            message_regex: None,
            min_level: None,
            cursor: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl LogQuery {
    pub fn new(start_ts: f64, end_ts: f64) -> Self {
        Self {
            start_ts,
            end_ts,
            ..Default::default()
        }
    }

    pub fn with_application(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }

    pub fn with_module(mut self, module_name: impl Into<String>) -> Self {
        self.module_names.push(module_name.into());
        self
    }

    pub fn with_service(mut self, service_name: impl Into<String>) -> Self {
        self.service_names.push(service_name.into());
        self
    }

    pub fn with_message_contains(mut self, needle: impl Into<String>) -> Self {
        self.message_contains = Some(needle.into());
        self
    }

    pub fn with_message_regex(mut self, pattern: impl Into<String>) -> Self {
        self.message_regex = Some(pattern.into());
        self
    }

    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = Some(level);
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Validate the query and resolve its cursor and pattern.
    pub fn plan(&self) -> Result<QueryPlan, QueryError> {
        if self.start_ts > self.end_ts {
            return Err(QueryError::InvalidTimeRange {
                start: self.start_ts,
                end: self.end_ts,
            });
        }

        if self.message_contains.is_some() && self.message_regex.is_some() {
            return Err(QueryError::ConflictingMessageFilters);
        }

        let matcher = match (self.message_contains.as_deref(), self.message_regex.as_deref()) {
            (Some(needle), None) => Some(substring_matcher(needle)?),
            (None, Some(pattern)) => Some(compile_pattern(pattern)?),
            _ => None,
        };

        let after = match self.cursor.as_deref() {
            Some(token) => Some(
                CursorPosition::decode(token)
                    .map_err(|e| QueryError::InvalidCursor(e.to_string()))?,
            ),
            None => None,
        };

        Ok(QueryPlan {
            matcher,
            after,
            limit: self.limit.clamp(1, MAX_QUERY_LIMIT),
        })
    }
}

/// Case-insensitive literal match with full Unicode case folding.
fn substring_matcher(needle: &str) -> Result<Regex, QueryError> {
    RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| QueryError::InvalidPattern(e.to_string()))
}

fn compile_pattern(pattern: &str) -> Result<Regex, QueryError> {
    if pattern.chars().count() > MAX_PATTERN_LEN {
        return Err(QueryError::InvalidPattern(format!(
            "pattern exceeds {MAX_PATTERN_LEN} characters"
        )));
    }
    RegexBuilder::new(pattern)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| QueryError::InvalidPattern(e.to_string()))
}

/// A validated query ready for execution.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// Message filter applied outside SQL, from either message option.
    pub matcher: Option<Regex>,
    pub after: Option<CursorPosition>,
    pub limit: u32,
}

// =============================================================================
// Result Types
// =============================================================================

/// One page of results, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub records: Vec<StoredLog>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

impl LogPage {
    /// Build a page from up to `limit + 1` rows.
    pub(crate) fn from_rows(mut rows: Vec<StoredLog>, limit: usize) -> Self {
        let has_more = rows.len() > limit;
        if has_more {
            rows.truncate(limit);
        }
        let next_cursor = if has_more {
            rows.last()
                .map(|last| CursorPosition::new(last.record.ts, last.id).encode())
        } else {
            None
        };
        Self {
            records: rows,
            has_more,
            next_cursor,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// =============================================================================
// SQL
// =============================================================================

/// Build the filtered SELECT for one round of fetching.
///
/// Message filters are not part of the SQL; `after` and `fetch` are passed
/// separately so the message scan can advance through chunks.
pub(crate) fn build_select(
    q: &LogQuery,
    after: Option<CursorPosition>,
    fetch: u32,
) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::new(SELECT_COLUMNS);
    qb.push(" WHERE ts >= ")
        .push_bind(q.start_ts)
        .push(" AND ts <= ")
        .push_bind(q.end_ts);

    if let Some(app) = &q.application_id {
        qb.push(" AND application_id = ").push_bind(app.clone());
    }
    push_in_list(&mut qb, "module_name", &q.module_names);
    push_in_list(&mut qb, "service_name", &q.service_names);

    if let Some(level) = q.min_level {
        qb.push(" AND level_rank >= ").push_bind(level.rank());
    }
    if let Some(pos) = after {
        qb.push(" AND (ts < ")
            .push_bind(pos.ts)
            .push(" OR (ts = ")
            .push_bind(pos.ts)
            .push(" AND id < ")
            .push_bind(pos.id)
            .push("))");
    }

    qb.push(" ORDER BY ts DESC, id DESC LIMIT ")
        .push_bind(i64::from(fetch));
    qb
}

fn push_in_list(qb: &mut QueryBuilder<'static, Sqlite>, column: &str, values: &[String]) {
    match values {
        [] => {}
        [single] => {
            qb.push(format!(" AND {column} = ")).push_bind(single.clone());
        }
        many => {
            qb.push(format!(" AND {column} IN ("));
            let mut separated = qb.separated(", ");
            for value in many {
                separated.push_bind(value.clone());
            }
            separated.push_unseparated(")");
        }
    }
}

/// Map a `SELECT_COLUMNS` row into a [`StoredLog`].
pub(crate) fn row_to_log(row: &SqliteRow) -> Result<StoredLog, StorageError> {
    let level_raw: String = row.try_get("level")?;
    let level = LogLevel::from_str(&level_raw)
        .map_err(|_| StorageError::InvalidData(format!("unknown level '{level_raw}'")))?;
    let context_raw: String = row.try_get("context")?;

    Ok(StoredLog {
        id: row.try_get("id")?,
        record: LogRecord {
            ts: row.try_get("ts")?,
            level,
            message: row.try_get("message")?,
            application_id: row.try_get("application_id")?,
            service_name: row.try_get("service_name")?,
            module_name: row.try_get("module_name")?,
            file_path: row.try_get("file_path")?,
            line_no: row.try_get("line_no")?,
            exception_type: row.try_get("exception_type")?,
            stacktrace: row.try_get("stacktrace")?,
            context: parse_context(&context_raw),
        },
    })
}

fn parse_context(raw: &str) -> Context {
    if raw.is_empty() || raw == "{}" {
        return Context::new();
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::debug!(error = %e, raw, "Failed to parse context JSON, returning empty");
        Context::new()
    })
}
