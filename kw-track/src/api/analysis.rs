//! Analysis workflow API handlers
//!
//! POST /analysis, GET /analysis/{job_id}, POST /analysis/{job_id}/cancel,
//! POST /analysis/resolve

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use kw_common::events::JobState;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::analysis_job::steps_from_map;
use crate::models::duplicate::{ResolutionDecision, ResolutionOutcome};
use crate::services::backend::BackendError;
use crate::services::job_tracker::SubmissionOutcome;
use crate::AppState;

/// POST /analysis request
#[derive(Debug, Deserialize)]
pub struct SubmitAnalysisRequest {
    pub url: String,
}

/// GET /analysis/{job_id} response
#[derive(Debug, Serialize)]
pub struct AnalysisStatusResponse {
    pub job_id: String,
    pub state: JobState,
    pub progress: Vec<kw_common::events::StepProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True when this service is still polling the job
    pub tracked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polls: Option<u32>,
}

/// POST /analysis/{job_id}/cancel response
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub cancelled: bool,
}

/// POST /analysis
///
/// Submit a listing URL for (re-)analysis. Returns 202 Accepted with either
/// the tracked job id or the duplicate candidate set needing resolution.
pub async fn submit_analysis(
    State(state): State<AppState>,
    Json(request): Json<SubmitAnalysisRequest>,
) -> ApiResult<(StatusCode, Json<SubmissionOutcome>)> {
    let outcome = state.tracker.submit(&request.url).await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

/// GET /analysis/{job_id}
///
/// Snapshot of a tracked job. Jobs leave the registry once terminal or
/// cancelled; for those this proxies the backend so late pollers still get
/// an answer.
pub async fn get_analysis_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<AnalysisStatusResponse>> {
    if let Some(job) = state.tracker.snapshot(&job_id).await {
        return Ok(Json(AnalysisStatusResponse {
            job_id: job.job_id,
            state: job.state,
            progress: job.progress,
            error: job.error,
            tracked: true,
            polls: Some(job.polls),
        }));
    }

    let snapshot = state
        .backend
        .job_status(&job_id)
        .await
        .map_err(|e| match e {
            BackendError::Api(404, _) => {
                ApiError::NotFound(format!("Analysis job not found: {}", job_id))
            }
            other => ApiError::Internal(other.to_string()),
        })?;

    Ok(Json(AnalysisStatusResponse {
        job_id,
        state: snapshot.status,
        progress: snapshot
            .progress
            .as_ref()
            .map(steps_from_map)
            .unwrap_or_default(),
        error: snapshot.error,
        tracked: false,
        polls: None,
    }))
}

/// POST /analysis/{job_id}/cancel
///
/// Drop interest in a job. The remote job is left to finish on its own;
/// only the local polling stops.
pub async fn cancel_analysis(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let cancelled = state.tracker.cancel(&job_id).await;
    if !cancelled {
        return Err(ApiError::NotFound(format!(
            "Analysis job not tracked: {}",
            job_id
        )));
    }

    Ok(Json(CancelResponse { job_id, cancelled }))
}

/// POST /analysis/resolve
///
/// Apply a duplicate-resolution decision. A backend rejection comes back as
/// 409; the candidate set stays with the caller for a different decision.
pub async fn resolve_duplicate(
    State(state): State<AppState>,
    Json(decision): Json<ResolutionDecision>,
) -> ApiResult<Json<ResolutionOutcome>> {
    let outcome = state.resolver.resolve(decision).await?;
    Ok(Json(outcome))
}

/// Build analysis workflow routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/analysis", post(submit_analysis))
        .route("/analysis/resolve", post(resolve_duplicate))
        .route("/analysis/:job_id", get(get_analysis_status))
        .route("/analysis/:job_id/cancel", post(cancel_analysis))
}
