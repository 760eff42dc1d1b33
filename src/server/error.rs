//! HTTP error mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::storage::{QueryError, StorageError};

/// Every failure a handler can report.
///
/// Rendered as `{"detail": {"code": ..., "message": ...}}`.
#[derive(Debug)]
pub enum ApiError {
    /// Query failures: caller errors map to 400, storage failures to 500.
    Query(QueryError),
    /// Request body or parameters did not match the expected schema.
    Validation(String),
    Storage(StorageError),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: String,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Query(e) if e.is_caller_error() => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Query(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Query(e) => e.code(),
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        Self::Query(e)
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Query(e) => e.to_string(),
            Self::Validation(msg) => msg.clone(),
            Self::Storage(e) => e.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %message, "Request failed");
        } else {
            tracing::debug!(code = self.code(), error = %message, "Rejected request");
        }

        let body = ErrorBody {
            detail: ErrorDetail {
                code: self.code(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}
