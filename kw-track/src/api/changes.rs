//! Change feed API handlers
//!
//! GET /properties/{property_id}/changes

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::change_event::{ChangeEvent, ChangeKind};
use crate::services::change_aggregator::{
    aggregate_changes, change_counts, sort_by_detected_at, ChangeCounts,
};
use crate::AppState;

/// Kinds excluded from the "relevant changes" total.
///
/// The backend's unrecognized-tag leftovers are noise for the dashboard's
/// headline counter, but they still render in the list.
const IRRELEVANT_KINDS: [ChangeKind; 1] = [ChangeKind::Other];

/// GET /properties/{id}/changes query parameters
#[derive(Debug, Default, Deserialize)]
pub struct ChangesQuery {
    /// Restrict the backend feed to the last N days
    pub days: Option<u32>,
    /// "newest" to reverse the default oldest-first ordering
    pub order: Option<String>,
}

/// GET /properties/{id}/changes response
///
/// Always the full normalized list; showing a bounded prefix with an
/// "N more" indicator is the UI's concern, `total` is here to support it.
#[derive(Debug, Serialize)]
pub struct ChangesResponse {
    pub events: Vec<ChangeEvent>,
    pub counts: ChangeCounts,
    pub total: usize,
}

/// GET /properties/{id}/changes
///
/// Fetch the raw change feed from the backend and normalize it into the
/// closed change taxonomy.
pub async fn get_property_changes(
    State(state): State<AppState>,
    Path(property_id): Path<String>,
    Query(query): Query<ChangesQuery>,
) -> ApiResult<Json<ChangesResponse>> {
    let batch = state
        .backend
        .change_feed(&property_id, query.days)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let mut events = aggregate_changes(&batch);

    let newest_first = query.order.as_deref() == Some("newest");
    sort_by_detected_at(&mut events, newest_first);

    let counts = change_counts(&events, &IRRELEVANT_KINDS);
    let total = events.len();

    tracing::debug!(
        property_id = %property_id,
        total,
        relevant = counts.relevant,
        "Change feed aggregated"
    );

    Ok(Json(ChangesResponse {
        events,
        counts,
        total,
    }))
}

/// Build change feed routes
pub fn changes_routes() -> Router<AppState> {
    Router::new().route("/properties/:property_id/changes", get(get_property_changes))
}
