//! Availability history API handlers
//!
//! GET /properties/{property_id}/availability

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::availability::{AvailabilityPeriod, RoomAvailabilitySummary};
use crate::services::availability::reconstruct_availability_now;
use crate::AppState;

/// GET /properties/{id}/availability query parameters
#[derive(Debug, Default, Deserialize)]
pub struct AvailabilityQuery {
    /// Restrict the backend timeline to the last N days
    pub days: Option<u32>,
}

/// Reconstructed history for one room
#[derive(Debug, Serialize)]
pub struct RoomAvailabilityResponse {
    pub room_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_number: Option<String>,
    pub periods: Vec<AvailabilityPeriod>,
    pub summary: RoomAvailabilitySummary,
}

/// GET /properties/{id}/availability response
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub rooms: Vec<RoomAvailabilityResponse>,
}

/// GET /properties/{id}/availability
///
/// Fetch the raw snapshot timeline from the backend and reconstruct
/// ordered periods plus summary stats per room.
pub async fn get_property_availability(
    State(state): State<AppState>,
    Path(property_id): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> ApiResult<Json<AvailabilityResponse>> {
    let timeline = state
        .backend
        .availability_timeline(&property_id, query.days)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let rooms = timeline
        .rooms
        .iter()
        .map(|room| {
            let history = reconstruct_availability_now(room);
            RoomAvailabilityResponse {
                room_id: room.room_id.clone(),
                room_number: room.room_number.clone(),
                periods: history.periods,
                summary: history.summary,
            }
        })
        .collect();

    Ok(Json(AvailabilityResponse { rooms }))
}

/// Build availability routes
pub fn availability_routes() -> Router<AppState> {
    Router::new().route(
        "/properties/:property_id/availability",
        get(get_property_availability),
    )
}
