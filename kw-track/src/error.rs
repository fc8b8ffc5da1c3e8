//! Error types for kw-track

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::backend::BackendError;

/// Tracker-level error taxonomy.
///
/// Job failures (timeouts, backend-reported errors) are surfaced as
/// terminal state transitions over the event bus, not as errors from API
/// calls; the variants here cover the synchronous paths.
#[derive(Debug, Error)]
pub enum TrackError {
    /// URL rejected before submission; user-correctable
    #[error("Invalid listing URL: {0}")]
    InvalidUrl(String),

    /// Transient backend/transport failure
    #[error("Backend error: {0}")]
    Transport(#[from] BackendError),

    /// Poll ceiling reached; the job was force-failed
    #[error("Analysis timed out waiting for the backend")]
    AnalysisTimeout,

    /// Backend reported the analysis as failed
    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    /// A duplicate-resolution operation was rejected by the backend.
    /// Never retried automatically; the caller must re-decide.
    #[error("Resolution failed: {0}")]
    Resolution(String),
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., a resolution the backend rejected
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// kw-common error
    #[error("Common error: {0}")]
    Common(#[from] kw_common::Error),
}

impl From<TrackError> for ApiError {
    fn from(err: TrackError) -> Self {
        match err {
            TrackError::InvalidUrl(msg) => ApiError::BadRequest(msg),
            TrackError::Resolution(msg) => ApiError::Conflict(msg),
            TrackError::Transport(e) => ApiError::Internal(e.to_string()),
            TrackError::AnalysisTimeout | TrackError::AnalysisFailed(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
