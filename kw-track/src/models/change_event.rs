//! Normalized change events
//!
//! Raw change records arrive in four differently shaped buckets with
//! inconsistent tag spellings. Everything is normalized into `ChangeEvent`
//! with a closed `ChangeKind` at ingestion; nothing downstream branches on
//! raw strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed change taxonomy. Unrecognized raw kinds map to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Status,
    Price,
    Availability,
    Rooms,
    Other,
}

impl ChangeKind {
    /// Map a raw `change_type` tag to a kind, case-insensitively.
    ///
    /// The scraper has emitted several spellings for the same semantic kind
    /// over time (`room_became_available` vs `room_available`); all synonyms
    /// collapse here and nowhere else.
    pub fn from_raw(tag: &str) -> ChangeKind {
        match tag.trim().to_ascii_lowercase().as_str() {
            "price" | "price_change" | "price_changed" => ChangeKind::Price,
            "status" | "status_change" | "status_changed" => ChangeKind::Status,
            "availability"
            | "room_available"
            | "room_became_available"
            | "room_unavailable"
            | "room_became_unavailable" => ChangeKind::Availability,
            "rooms" | "room_count" | "room_count_changed" => ChangeKind::Rooms,
            _ => ChangeKind::Other,
        }
    }
}

/// One detected field change for one property.
///
/// Events are never mutated after creation, only filtered, sorted, and
/// grouped. `old_value`/`new_value` stay opaque (string or number) exactly
/// as the backend provided them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Property the change belongs to
    pub property_id: Option<String>,

    /// Property address for display
    pub address: Option<String>,

    /// Normalized change kind
    pub kind: ChangeKind,

    /// Value before the change, as provided
    pub old_value: serde_json::Value,

    /// Value after the change, as provided
    pub new_value: serde_json::Value,

    /// Human-readable text from the backend, used as display fallback
    pub summary: Option<String>,

    /// Canonical detection instant (sentinel when the raw date was unusable)
    pub detected_at: DateTime<Utc>,

    /// Room the change concerns, when room-scoped
    pub room_number: Option<String>,
}

/// Direction of a price movement. Rent going up is the unfavourable one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceDirection {
    Increase,
    Decrease,
    Unchanged,
}

impl PriceDirection {
    /// Display convention: increases are flagged, decreases are welcomed
    pub fn is_unfavorable(self) -> bool {
        matches!(self, PriceDirection::Increase)
    }
}

/// Signed price delta derived from a price event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "delta", rename_all = "snake_case")]
pub enum PriceDelta {
    Known { amount: f64, direction: PriceDirection },
    /// Values that cannot be read as numbers degrade here, never to an error
    Unknown,
}

/// Signed room-count delta derived from an availability event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "delta", rename_all = "snake_case")]
pub enum RoomDelta {
    Known { count: i64 },
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_synonyms_collapse() {
        assert_eq!(ChangeKind::from_raw("PRICE"), ChangeKind::Price);
        assert_eq!(ChangeKind::from_raw("price_changed"), ChangeKind::Price);
        assert_eq!(
            ChangeKind::from_raw("room_became_available"),
            ChangeKind::Availability
        );
        assert_eq!(
            ChangeKind::from_raw("Room_Available"),
            ChangeKind::Availability
        );
        assert_eq!(ChangeKind::from_raw("room_count_changed"), ChangeKind::Rooms);
    }

    #[test]
    fn test_unrecognized_kind_maps_to_other() {
        assert_eq!(ChangeKind::from_raw("deposit_changed"), ChangeKind::Other);
        assert_eq!(ChangeKind::from_raw(""), ChangeKind::Other);
    }

    #[test]
    fn test_price_direction_convention() {
        assert!(PriceDirection::Increase.is_unfavorable());
        assert!(!PriceDirection::Decrease.is_unfavorable());
        assert!(!PriceDirection::Unchanged.is_unfavorable());
    }
}
