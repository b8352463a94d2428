//! Standardized API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Response for bulk job creation.
#[derive(Debug, Serialize, Deserialize)]
pub struct BulkCreateResponse {
    pub job_id: String,
    pub total: u64,
    pub duplicates_count: u64,
    pub invalid_count: u64,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub redis_connected: bool,
    pub postgres_connected: bool,
    pub export_sink_connected: bool,
    pub active_jobs: u64,
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = Some(details);
        self
    }
}

/// API error with status, code, and optional Retry-After.
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(msg, code),
            retry_after: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::BAD_REQUEST, "VALID_001", msg)
    }

    pub fn validation(errors: Vec<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            response: ErrorResponse::new("Validation failed", "VALID_001").with_details(errors),
            retry_after: None,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::NOT_FOUND, "JOB_001", msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::CONFLICT, "JOB_002", msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::INTERNAL_SERVER_ERROR, "SYS_001", msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.response)).into_response();

        if let Some(retry_after) = self.retry_after {
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

impl From<numwatch_core::Error> for ApiError {
    fn from(err: numwatch_core::Error) -> Self {
        use numwatch_core::Error;

        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match &err {
            Error::Validation(msg) => ApiError::bad_request(msg.clone()),
            Error::JobNotFound(id) => ApiError::not_found(format!("job not found: {id}")),
            Error::InvalidTransition { .. } => ApiError::conflict(err.to_string()),
            Error::RateLimited { retry_after } => Self {
                status,
                response: ErrorResponse::new(err.to_string(), "RATE_001"),
                retry_after: *retry_after,
            },
            _ => ApiError::with_code(status, "SYS_001", err.to_string()),
        }
    }
}
