//! Room availability periods and summaries
//!
//! Availability history is a read-side projection: it is reconstructed on
//! demand from raw per-room snapshots supplied by the backend and never
//! persisted here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw availability snapshot as delivered by the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAvailabilitySnapshot {
    /// Backend period identifier, when one exists
    #[serde(default, alias = "periodId")]
    pub period_id: Option<String>,

    /// Raw start marker (any encoding the Temporal Normalizer accepts)
    #[serde(default, alias = "startDate", alias = "start")]
    pub start_date: Option<String>,

    /// Raw end marker; absent for an ongoing period
    #[serde(default, alias = "endDate", alias = "end")]
    pub end_date: Option<String>,

    /// Backend's own "this is the ongoing period" flag
    #[serde(default, alias = "isCurrent")]
    pub is_current: Option<bool>,

    /// Listed price text at period start, verbatim
    #[serde(default, alias = "priceText", alias = "price_text_at_start")]
    pub price_text: Option<String>,
}

/// Raw per-room history as delivered by the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRoomHistory {
    /// Room identifier
    #[serde(alias = "roomId")]
    pub room_id: String,

    /// Display room number, when the property has several rooms
    #[serde(default, alias = "roomNumber")]
    pub room_number: Option<String>,

    /// Raw listing status string ("available", "taken", "offline", ...)
    #[serde(default, alias = "currentStatus", alias = "status")]
    pub current_status: Option<String>,

    /// Backend's listed/unlisted flag
    #[serde(default, alias = "isCurrentlyListed")]
    pub is_currently_listed: Option<bool>,

    /// When the room was first seen by the scraper
    #[serde(default, alias = "firstSeen", alias = "discovered_at")]
    pub first_seen: Option<String>,

    /// Ordered snapshot history
    #[serde(default)]
    pub snapshots: Vec<RawAvailabilitySnapshot>,
}

/// One contiguous interval during which a room held one listed status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityPeriod {
    /// Period identifier (backend's, or synthesized from room id + index)
    pub period_id: String,

    /// Room the period belongs to
    pub room_id: String,

    /// Canonical period start
    pub start_date: DateTime<Utc>,

    /// Canonical period end; `None` while the period is ongoing
    pub end_date: Option<DateTime<Utc>>,

    /// Whole days covered; ongoing periods are measured against "now"
    pub duration_days: i64,

    /// Listed price text at period start, verbatim
    pub price_text_at_start: Option<String>,

    /// True iff `end_date` is `None`
    pub is_current: bool,
}

/// Listing status of a room right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Available,
    Taken,
    Offline,
}

impl RoomStatus {
    /// Read a raw backend status string, used when no periods exist.
    /// Unknown strings read as `Taken` (present but not confirmably listed).
    pub fn from_raw(raw: Option<&str>) -> RoomStatus {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("available") | Some("free") | Some("listed") => RoomStatus::Available,
            Some("offline") | Some("unlisted") | Some("removed") | Some("gone") => {
                RoomStatus::Offline
            }
            _ => RoomStatus::Taken,
        }
    }
}

/// Derived aggregate per room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomAvailabilitySummary {
    /// Total reconstructed periods
    pub total_periods: usize,

    /// Mean duration of completed periods; absent when none completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_duration_days: Option<f64>,

    /// Completed (non-current) period count
    pub times_changed: usize,

    /// Resolved current status (offline beats available beats taken)
    pub current_status: RoomStatus,

    /// True when an ongoing period exists and the room is not offline
    pub is_currently_listed: bool,

    /// Whole days since the room was first seen
    pub days_since_discovered: i64,
}

/// Reconstructed availability history for one room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityHistory {
    /// Periods ordered by start date descending (newest first)
    pub periods: Vec<AvailabilityPeriod>,

    /// Derived summary statistics
    pub summary: RoomAvailabilitySummary,
}
