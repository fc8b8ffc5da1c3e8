//! Change aggregation
//!
//! Normalizes the backend's heterogeneous change feed into `ChangeEvent`s:
//! four raw buckets, several tag spellings, dates in whatever encoding the
//! site rendered. Every input record produces exactly one output event —
//! malformed records degrade to the `Other` kind with best-effort fields,
//! they are never dropped.
//!
//! The aggregator is pure and stateless; it may be invoked from any call
//! site without coordination.

use kw_common::temporal::normalize_date;
use serde::Deserialize;
use serde_json::Value;

use crate::models::change_event::{
    ChangeEvent, ChangeKind, PriceDelta, PriceDirection, RoomDelta,
};

/// Raw change record, tolerant of the tag/field spellings the backend has
/// used over time
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChangeRecord {
    /// Sub-kind tag; bucket default applies when absent
    #[serde(default, alias = "changeType", alias = "type")]
    pub change_type: Option<String>,

    #[serde(default, alias = "propertyId")]
    pub property_id: Option<String>,

    #[serde(default)]
    pub address: Option<String>,

    #[serde(default, alias = "oldValue", alias = "old_price")]
    pub old_value: Option<Value>,

    #[serde(default, alias = "newValue", alias = "new_price")]
    pub new_value: Option<Value>,

    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default, alias = "detectedAt", alias = "change_date", alias = "date")]
    pub detected_at: Option<String>,

    #[serde(default, alias = "roomNumber")]
    pub room_number: Option<String>,
}

/// Raw change feed for one property, grouped by source category
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChangeBatch {
    #[serde(default)]
    pub status_changes: Vec<RawChangeRecord>,

    #[serde(default)]
    pub price_changes: Vec<RawChangeRecord>,

    #[serde(default)]
    pub unavailable_properties: Vec<RawChangeRecord>,

    #[serde(default)]
    pub other_changes: Vec<RawChangeRecord>,
}

impl RawChangeBatch {
    /// Total records across all buckets
    pub fn len(&self) -> usize {
        self.status_changes.len()
            + self.price_changes.len()
            + self.unavailable_properties.len()
            + self.other_changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-kind counts for a batch, for the "N price changes, N status
/// changes..." summary line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ChangeCounts {
    pub status: usize,
    pub price: usize,
    pub availability: usize,
    pub rooms: usize,
    pub other: usize,
    pub total: usize,
    /// Records whose kind is not in the caller-provided irrelevant set
    pub relevant: usize,
}

/// Normalize a raw batch into change events.
///
/// Output order is insertion order: status, price, unavailable, other
/// buckets in that sequence, records in bucket order. The count of output
/// events always equals `batch.len()`.
pub fn aggregate_changes(batch: &RawChangeBatch) -> Vec<ChangeEvent> {
    let mut events = Vec::with_capacity(batch.len());

    for (records, bucket_default) in [
        (&batch.status_changes, ChangeKind::Status),
        (&batch.price_changes, ChangeKind::Price),
        // A listing disappearing from the site is a status transition.
        (&batch.unavailable_properties, ChangeKind::Status),
        (&batch.other_changes, ChangeKind::Other),
    ] {
        for record in records {
            events.push(normalize_record(record, bucket_default));
        }
    }

    events
}

/// Normalize one record. The tag wins over the bucket default when present;
/// an unrecognized tag means `Other`, not an error.
fn normalize_record(record: &RawChangeRecord, bucket_default: ChangeKind) -> ChangeEvent {
    let kind = match record.change_type.as_deref() {
        Some(tag) if !tag.trim().is_empty() => ChangeKind::from_raw(tag),
        _ => bucket_default,
    };

    if kind == ChangeKind::Other && record.change_type.is_some() {
        tracing::debug!(
            tag = record.change_type.as_deref().unwrap_or(""),
            "Unrecognized change tag, keeping as catch-all event"
        );
    }

    ChangeEvent {
        property_id: record.property_id.clone(),
        address: record.address.clone(),
        kind,
        old_value: record.old_value.clone().unwrap_or(Value::Null),
        new_value: record.new_value.clone().unwrap_or(Value::Null),
        summary: record.summary.clone(),
        detected_at: normalize_date(record.detected_at.as_deref()),
        room_number: record.room_number.clone(),
    }
}

/// Signed price delta for a price event.
///
/// `new - old`; an increase in rent is the unfavourable direction. Values
/// that cannot be read as numbers yield `Unknown`.
pub fn price_delta(event: &ChangeEvent) -> PriceDelta {
    let (Some(old), Some(new)) = (parse_amount(&event.old_value), parse_amount(&event.new_value))
    else {
        return PriceDelta::Unknown;
    };

    let amount = new - old;
    let direction = if amount > 0.0 {
        PriceDirection::Increase
    } else if amount < 0.0 {
        PriceDirection::Decrease
    } else {
        PriceDirection::Unchanged
    };

    PriceDelta::Known { amount, direction }
}

/// Signed room-count delta for an availability event
pub fn room_delta(event: &ChangeEvent) -> RoomDelta {
    let (Some(old), Some(new)) = (parse_amount(&event.old_value), parse_amount(&event.new_value))
    else {
        return RoomDelta::Unknown;
    };

    RoomDelta::Known {
        count: (new - old).round() as i64,
    }
}

/// Best-effort numeric read of an opaque value.
///
/// Accepts JSON numbers, and strings like "550", "€ 550" or "550,50"
/// (the site renders Dutch decimal commas).
fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || *c == '-')
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned
                .parse::<f64>()
                .or_else(|_| cleaned.replace(',', ".").parse::<f64>())
                .ok()
        }
        _ => None,
    }
}

/// Count events per kind; `irrelevant` is the backend-defined set of kinds
/// excluded from the relevant total.
pub fn change_counts(events: &[ChangeEvent], irrelevant: &[ChangeKind]) -> ChangeCounts {
    let mut counts = ChangeCounts::default();

    for event in events {
        match event.kind {
            ChangeKind::Status => counts.status += 1,
            ChangeKind::Price => counts.price += 1,
            ChangeKind::Availability => counts.availability += 1,
            ChangeKind::Rooms => counts.rooms += 1,
            ChangeKind::Other => counts.other += 1,
        }
        counts.total += 1;
        if !irrelevant.contains(&event.kind) {
            counts.relevant += 1;
        }
    }

    counts
}

/// Stable sort by detection time, oldest first unless `newest_first`.
/// Ties keep insertion order; nothing ever re-sorts by magnitude.
pub fn sort_by_detected_at(events: &mut [ChangeEvent], newest_first: bool) {
    if newest_first {
        events.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
    } else {
        events.sort_by(|a, b| a.detected_at.cmp(&b.detected_at));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch_from_json(json: serde_json::Value) -> RawChangeBatch {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_every_input_record_yields_one_event() {
        let batch = batch_from_json(json!({
            "status_changes": [{"summary": "went offline"}],
            "price_changes": [{"old_value": 500, "new_value": 550}],
            "unavailable_properties": [{"address": "Oudegracht 1"}],
            "other_changes": [
                {"change_type": "room_became_available"},
                {"change_type": "???", "summary": "mystery"}
            ]
        }));

        let events = aggregate_changes(&batch);
        assert_eq!(events.len(), batch.len());
        assert_eq!(events.len(), 5);
        // Closed taxonomy: every event carries one of the five kinds.
        for event in &events {
            assert!(matches!(
                event.kind,
                ChangeKind::Status
                    | ChangeKind::Price
                    | ChangeKind::Availability
                    | ChangeKind::Rooms
                    | ChangeKind::Other
            ));
        }
    }

    #[test]
    fn test_bucket_defaults_apply_without_tags() {
        let batch = batch_from_json(json!({
            "status_changes": [{}],
            "price_changes": [{}],
            "unavailable_properties": [{}],
            "other_changes": [{}]
        }));

        let kinds: Vec<ChangeKind> = aggregate_changes(&batch).iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::Status,
                ChangeKind::Price,
                ChangeKind::Status,
                ChangeKind::Other
            ]
        );
    }

    #[test]
    fn test_tag_spellings_are_tolerated() {
        let batch = batch_from_json(json!({
            "other_changes": [
                {"change_type": "room_became_available"},
                {"changeType": "ROOM_AVAILABLE"},
                {"type": "room_count_changed"}
            ]
        }));

        let kinds: Vec<ChangeKind> = aggregate_changes(&batch).iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::Availability,
                ChangeKind::Availability,
                ChangeKind::Rooms
            ]
        );
    }

    #[test]
    fn test_price_change_scenario() {
        let batch = batch_from_json(json!({
            "other_changes": [{
                "change_type": "PRICE",
                "old_value": 500,
                "new_value": 550
            }]
        }));

        let events = aggregate_changes(&batch);
        assert_eq!(events[0].kind, ChangeKind::Price);

        match price_delta(&events[0]) {
            PriceDelta::Known { amount, direction } => {
                assert_eq!(amount, 50.0);
                assert_eq!(direction, PriceDirection::Increase);
                assert!(direction.is_unfavorable());
            }
            PriceDelta::Unknown => panic!("numeric values must produce a known delta"),
        }
    }

    #[test]
    fn test_price_delta_parses_formatted_strings() {
        let batch = batch_from_json(json!({
            "price_changes": [{
                "old_value": "€ 550,50",
                "new_value": "€ 525"
            }]
        }));

        let events = aggregate_changes(&batch);
        match price_delta(&events[0]) {
            PriceDelta::Known { amount, direction } => {
                assert!((amount - (-25.5)).abs() < 1e-9);
                assert_eq!(direction, PriceDirection::Decrease);
            }
            PriceDelta::Unknown => panic!("formatted prices should still parse"),
        }
    }

    #[test]
    fn test_unparseable_values_degrade_to_unknown() {
        let batch = batch_from_json(json!({
            "price_changes": [{"old_value": "on request", "new_value": 550}]
        }));

        let events = aggregate_changes(&batch);
        assert_eq!(price_delta(&events[0]), PriceDelta::Unknown);
        assert_eq!(room_delta(&events[0]), RoomDelta::Unknown);
    }

    #[test]
    fn test_room_delta() {
        let batch = batch_from_json(json!({
            "other_changes": [{
                "change_type": "room_count_changed",
                "old_value": 3,
                "new_value": 5
            }]
        }));

        let events = aggregate_changes(&batch);
        assert_eq!(room_delta(&events[0]), RoomDelta::Known { count: 2 });
    }

    #[test]
    fn test_counts_and_relevant_set() {
        let batch = batch_from_json(json!({
            "status_changes": [{}, {}],
            "price_changes": [{}],
            "other_changes": [{"change_type": "mystery"}]
        }));

        let events = aggregate_changes(&batch);
        let counts = change_counts(&events, &[ChangeKind::Other]);

        assert_eq!(counts.status, 2);
        assert_eq!(counts.price, 1);
        assert_eq!(counts.other, 1);
        assert_eq!(counts.total, 4);
        assert_eq!(counts.relevant, 3);
    }

    #[test]
    fn test_sort_is_stable_for_ties() {
        let batch = batch_from_json(json!({
            "status_changes": [
                {"summary": "first", "detected_at": "2024-03-01"},
                {"summary": "second", "detected_at": "2024-03-01"},
                {"summary": "earlier", "detected_at": "2024-02-01"}
            ]
        }));

        let mut events = aggregate_changes(&batch);
        sort_by_detected_at(&mut events, false);

        let summaries: Vec<&str> = events
            .iter()
            .map(|e| e.summary.as_deref().unwrap())
            .collect();
        assert_eq!(summaries, vec!["earlier", "first", "second"]);

        sort_by_detected_at(&mut events, true);
        let summaries: Vec<&str> = events
            .iter()
            .map(|e| e.summary.as_deref().unwrap())
            .collect();
        // Ties keep their relative order under the reversed comparator too.
        assert_eq!(summaries, vec!["first", "second", "earlier"]);
    }

    #[test]
    fn test_unknown_dates_sort_oldest() {
        let batch = batch_from_json(json!({
            "status_changes": [
                {"summary": "dated", "detected_at": "2024-03-01"},
                {"summary": "undated"}
            ]
        }));

        let mut events = aggregate_changes(&batch);
        sort_by_detected_at(&mut events, false);
        assert_eq!(events[0].summary.as_deref(), Some("undated"));
    }
}
