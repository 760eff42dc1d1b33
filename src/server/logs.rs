//! `/logs/*` handlers: ingestion, query and scoped deletion.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::model::{LogBatch, LogLevel, LogRecord, StoredLog, unix_now};
use crate::server::AppState;
use crate::server::error::ApiError;
use crate::storage::{DEFAULT_QUERY_LIMIT, LogPage, LogQuery, MAX_QUERY_LIMIT, QueryError};
use crate::timeparse::parse_time_param_at;

/// Window used when a query names neither bound.
pub const DEFAULT_QUERY_WINDOW_SECS: f64 = 300.0;

/// Records further ahead of the daemon clock than this are flagged.
const FUTURE_SKEW_SECS: f64 = 300.0;
/// Records older than this on arrival are flagged.
const PAST_SKEW_SECS: f64 = 86_400.0;

// =============================================================================
// Ingestion
// =============================================================================

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub accepted: u64,
}

/// Timestamp anomalies found in one batch. Reported, never rejected.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TimestampReport {
    pub future: usize,
    pub past: usize,
    /// Every record carries the same `ts` (only for batches of two or more).
    pub identical: bool,
}

impl TimestampReport {
    pub fn inspect(logs: &[LogRecord], now: f64) -> Self {
        let mut report = Self::default();
        for log in logs {
            if log.ts > now + FUTURE_SKEW_SECS {
                report.future += 1;
                tracing::warn!(ts = log.ts, ahead_secs = log.ts - now, "Log timestamp is in the future");
            }
            if log.ts < now - PAST_SKEW_SECS {
                report.past += 1;
                tracing::warn!(ts = log.ts, behind_secs = now - log.ts, "Log timestamp is in the past");
            }
        }

        if let [first, rest @ ..] = logs
            && !rest.is_empty()
            && rest.iter().all(|l| l.ts == first.ts)
        {
            report.identical = true;
            tracing::warn!(
                count = logs.len(),
                ts = first.ts,
                "All logs in batch have identical timestamp"
            );
        }
        report
    }
}

pub(crate) async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LogBatch>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(batch) = payload.map_err(|e| ApiError::validation(e.body_text()))?;
    batch
        .validate()
        .map_err(|e| ApiError::validation(e.to_string()))?;

    TimestampReport::inspect(&batch.logs, unix_now());

    let application_id = batch.application_id.clone();
    let accepted = state.writer.write_batch(batch).await?;
    tracing::debug!(%application_id, accepted, "Batch ingested");

    Ok((StatusCode::ACCEPTED, Json(IngestResponse { accepted })))
}

// =============================================================================
// Query
// =============================================================================

/// Raw query-string parameters of `GET /logs/query`.
#[derive(Debug, Default, Deserialize)]
pub struct LogsQueryParams {
    pub since: Option<String>,
    pub until: Option<String>,
    /// Legacy raw bound, used only when `since` is absent.
    pub start_ts: Option<f64>,
    /// Legacy raw bound, used only when `until` is absent.
    pub end_ts: Option<f64>,
    pub application_id: Option<String>,
    /// One name or a comma-separated list.
    pub module_name: Option<String>,
    /// One name or a comma-separated list.
    pub service_name: Option<String>,
    pub message_contains: Option<String>,
    pub message_regex: Option<String>,
    pub min_level: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

impl LogsQueryParams {
    /// Resolve parameters into a storage query, relative to `now`.
    pub fn into_query(self, now: f64) -> Result<LogQuery, ApiError> {
        let limit = match self.limit {
            None => DEFAULT_QUERY_LIMIT,
            Some(n) if (1..=i64::from(MAX_QUERY_LIMIT)).contains(&n) => n as u32,
            Some(n) => {
                return Err(ApiError::validation(format!(
                    "limit must be between 1 and {MAX_QUERY_LIMIT}, got {n}"
                )));
            }
        };

        let start = match (non_empty(self.since), self.start_ts) {
            (Some(since), _) => parse_time_param_at(&since, false, now).map_err(|_| {
                QueryError::InvalidTimeFormat {
                    param: "since",
                    value: since,
                }
            })?,
            (None, Some(ts)) => ts,
            (None, None) => now - DEFAULT_QUERY_WINDOW_SECS,
        };
        let end = match (non_empty(self.until), self.end_ts) {
            (Some(until), _) => parse_time_param_at(&until, true, now).map_err(|_| {
                QueryError::InvalidTimeFormat {
                    param: "until",
                    value: until,
                }
            })?,
            (None, Some(ts)) => ts,
            (None, None) => now,
        };

        let mut query = LogQuery::new(start, end).with_limit(limit);
        query.application_id = non_empty(self.application_id);
        query.module_names = split_list(self.module_name.as_deref());
        query.service_names = split_list(self.service_name.as_deref());
        query.message_contains = non_empty(self.message_contains);
        query.message_regex = non_empty(self.message_regex);
        query.cursor = non_empty(self.cursor);

        if let Some(raw) = non_empty(self.min_level) {
            let level = raw
                .parse::<LogLevel>()
                .map_err(|_| QueryError::InvalidLevel(raw.clone()))?;
            query.min_level = Some(level);
        }

        Ok(query)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub results: Vec<StoredLog>,
    pub count: usize,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

impl From<LogPage> for QueryResponse {
    fn from(page: LogPage) -> Self {
        Self {
            count: page.records.len(),
            results: page.records,
            has_more: page.has_more,
            next_cursor: page.next_cursor,
        }
    }
}

pub(crate) async fn query_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<LogsQueryParams>, QueryRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::validation(e.body_text()))?;
    let query = params.into_query(unix_now())?;
    let page = state.reader.query(&query).await?;
    Ok(Json(page.into()))
}

// =============================================================================
// Clear
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ClearParams {
    pub application_id: Option<String>,
    pub environment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub deleted: u64,
}

pub(crate) async fn clear_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ClearParams>, QueryRejection>,
) -> Result<Json<ClearResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::validation(e.body_text()))?;
    let application_id = non_empty(params.application_id)
        .ok_or_else(|| ApiError::validation("application_id is required"))?;
    let environment = non_empty(params.environment);

    let deleted = state
        .admin
        .delete_by_application(&application_id, environment.as_deref())
        .await?;
    tracing::info!(%application_id, ?environment, deleted, "Cleared logs");

    Ok(Json(ClearResponse { deleted }))
}
