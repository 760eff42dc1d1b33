//! HTTP surface of the loghound daemon.
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /logs/ingest` | accept a [`LogBatch`](crate::model::LogBatch) |
//! | `GET /logs/query` | filtered, paginated time-range query |
//! | `POST /logs/clear` | delete one application's records |
//! | `GET /status` | service identity and settings |
//! | `GET /healthz`, `GET /readyz` | liveness and readiness probes |

pub mod error;
pub mod logs;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::storage::{LogReader, LogWriter, StorageAdmin, StorageHandles};

pub use error::ApiError;
pub use logs::{LogsQueryParams, QueryResponse, TimestampReport};

/// Static facts reported by `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub service_name: String,
    pub version: String,
    pub host: String,
    pub port: u16,
    pub retention_days: u32,
}

impl ServiceInfo {
    pub fn new(host: impl Into<String>, port: u16, retention_days: u32) -> Self {
        Self {
            service_name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            host: host.into(),
            port,
            retention_days,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub writer: LogWriter,
    pub reader: LogReader,
    pub admin: StorageAdmin,
    pub info: ServiceInfo,
}

impl AppState {
    pub fn new(handles: &StorageHandles, info: ServiceInfo) -> Self {
        Self {
            writer: handles.writer.clone(),
            reader: handles.reader.clone(),
            admin: handles.admin.clone(),
            info,
        }
    }
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,
}

#[derive(Serialize)]
struct StatusResponse<'a> {
    status: &'static str,
    #[serde(flatten)]
    info: &'a ServiceInfo,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/status", get(status_handler))
        .route("/logs/ingest", post(logs::ingest_handler))
        .route("/logs/query", get(logs::query_handler))
        .route("/logs/clear", post(logs::clear_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        db: None,
    })
}

/// Readiness probe that round-trips the database.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.reader.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "ok".to_string(),
            db: Some("ready".to_string()),
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    db: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(StatusResponse {
        status: "healthy",
        info: &state.info,
    })
    .into_response()
}
