//! Availability history reconstruction
//!
//! Rebuilds a room's availability periods from the raw snapshot history the
//! backend returns. Pure function of its inputs: recomputing with the same
//! snapshots and the same "now" yields the same history, so the projection
//! is recomputed on demand and never stored.

use chrono::{DateTime, Utc};
use kw_common::temporal::{normalize_date, whole_days_between};

use crate::models::availability::{
    AvailabilityHistory, AvailabilityPeriod, RawRoomHistory, RoomAvailabilitySummary, RoomStatus,
};

/// Reconstruct availability with an explicit clock, for deterministic tests
pub fn reconstruct_availability(room: &RawRoomHistory, now: DateTime<Utc>) -> AvailabilityHistory {
    let mut periods = build_periods(room, now);
    let summary = summarize(room, &periods, now);

    // Presentation order: newest first.
    periods.sort_by(|a, b| b.start_date.cmp(&a.start_date));

    AvailabilityHistory { periods, summary }
}

/// Reconstruct availability against the current time
pub fn reconstruct_availability_now(room: &RawRoomHistory) -> AvailabilityHistory {
    reconstruct_availability(room, Utc::now())
}

/// Build non-overlapping periods from raw snapshots, oldest first.
///
/// Snapshot quirks handled here rather than upstream:
/// - multiple open-ended snapshots: only the latest stays ongoing, earlier
///   ones are closed at the next period's start (at most one current);
/// - overlapping ranges: an end past the next start is clamped to it.
fn build_periods(room: &RawRoomHistory, now: DateTime<Utc>) -> Vec<AvailabilityPeriod> {
    let mut periods: Vec<AvailabilityPeriod> = room
        .snapshots
        .iter()
        .enumerate()
        .map(|(index, snapshot)| {
            let start_date = normalize_date(snapshot.start_date.as_deref());
            let end_date = snapshot
                .end_date
                .as_deref()
                .filter(|raw| !raw.trim().is_empty())
                .map(|raw| normalize_date(Some(raw)));

            let period_id = snapshot
                .period_id
                .clone()
                .unwrap_or_else(|| format!("{}-{}", room.room_id, index));

            AvailabilityPeriod {
                period_id,
                room_id: room.room_id.clone(),
                start_date,
                end_date,
                duration_days: 0, // filled in below, after clamping
                price_text_at_start: snapshot.price_text.clone(),
                is_current: end_date.is_none(),
            }
        })
        .collect();

    periods.sort_by(|a, b| a.start_date.cmp(&b.start_date));

    for i in 0..periods.len() {
        let next_start = periods.get(i + 1).map(|p| p.start_date);

        if let Some(next_start) = next_start {
            match periods[i].end_date {
                // Earlier open-ended snapshot: close it where the next begins.
                None => {
                    periods[i].end_date = Some(next_start);
                    periods[i].is_current = false;
                }
                Some(end) if end > next_start => {
                    periods[i].end_date = Some(next_start);
                }
                _ => {}
            }
        }

        let effective_end = periods[i].end_date.unwrap_or(now);
        periods[i].duration_days = whole_days_between(periods[i].start_date, effective_end);
    }

    periods
}

fn summarize(
    room: &RawRoomHistory,
    periods: &[AvailabilityPeriod],
    now: DateTime<Utc>,
) -> RoomAvailabilitySummary {
    let completed: Vec<&AvailabilityPeriod> = periods.iter().filter(|p| !p.is_current).collect();
    let times_changed = completed.len();

    let average_duration_days = if completed.is_empty() {
        None
    } else {
        let total: i64 = completed.iter().map(|p| p.duration_days).sum();
        Some(total as f64 / completed.len() as f64)
    };

    let has_current_period = periods.iter().any(|p| p.is_current);
    let explicitly_offline = room.is_currently_listed == Some(false)
        || RoomStatus::from_raw(room.current_status.as_deref()) == RoomStatus::Offline;

    // Precedence: explicit offline beats available beats taken. A room with
    // no history at all degrades to a direct read of its raw status.
    let current_status = if periods.is_empty() {
        RoomStatus::from_raw(room.current_status.as_deref())
    } else if explicitly_offline {
        RoomStatus::Offline
    } else if has_current_period {
        RoomStatus::Available
    } else {
        RoomStatus::Taken
    };

    let is_currently_listed = current_status == RoomStatus::Available && has_current_period;

    let discovered_at = room
        .first_seen
        .as_deref()
        .map(|raw| normalize_date(Some(raw)))
        .or_else(|| periods.iter().map(|p| p.start_date).min())
        .unwrap_or_else(|| normalize_date(None));

    RoomAvailabilitySummary {
        total_periods: periods.len(),
        average_duration_days,
        times_changed,
        current_status,
        is_currently_listed,
        days_since_discovered: whole_days_between(discovered_at, now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::availability::RawAvailabilitySnapshot;
    use chrono::TimeZone;

    fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap()
    }

    fn snapshot(start: &str, end: Option<&str>) -> RawAvailabilitySnapshot {
        RawAvailabilitySnapshot {
            period_id: None,
            start_date: Some(start.to_string()),
            end_date: end.map(|e| e.to_string()),
            is_current: None,
            price_text: Some("€ 550 per maand".to_string()),
        }
    }

    fn room(snapshots: Vec<RawAvailabilitySnapshot>) -> RawRoomHistory {
        RawRoomHistory {
            room_id: "room-1".to_string(),
            room_number: Some("2A".to_string()),
            current_status: Some("available".to_string()),
            is_currently_listed: Some(true),
            first_seen: None,
            snapshots,
        }
    }

    #[test]
    fn test_two_snapshot_scenario() {
        let room = room(vec![
            snapshot("2024-01-01", Some("2024-03-01")),
            snapshot("2024-03-15", None),
        ]);

        let history = reconstruct_availability(&room, test_now());

        assert_eq!(history.periods.len(), 2);
        // Newest first in presentation order; the ongoing one leads.
        assert!(history.periods[0].is_current);
        assert!(history.periods[0].end_date.is_none());
        assert!(!history.periods[1].is_current);
        assert_eq!(history.summary.times_changed, 1);
        assert_eq!(history.summary.total_periods, 2);
        // Completed period: Jan 1 to Mar 1 = 60 whole days.
        assert_eq!(history.periods[1].duration_days, 60);
        assert_eq!(history.summary.average_duration_days, Some(60.0));
    }

    #[test]
    fn test_at_most_one_current_period() {
        // Backend glitch: two open-ended snapshots.
        let room = room(vec![snapshot("2024-01-01", None), snapshot("2024-02-01", None)]);

        let history = reconstruct_availability(&room, test_now());

        let current: Vec<_> = history.periods.iter().filter(|p| p.is_current).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(
            current[0].start_date,
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
        );
        // The earlier one was closed at the next period's start.
        assert_eq!(
            history.periods[1].end_date,
            Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_periods_do_not_overlap() {
        let room = room(vec![
            snapshot("2024-01-01", Some("2024-02-15")),
            snapshot("2024-02-01", Some("2024-03-01")),
        ]);

        let history = reconstruct_availability(&room, test_now());

        // Oldest period was clamped to end where the next starts.
        let older = &history.periods[1];
        let newer = &history.periods[0];
        assert!(older.end_date.unwrap() <= newer.start_date);
    }

    #[test]
    fn test_ongoing_duration_measured_against_now() {
        let room = room(vec![snapshot("2024-03-15", None)]);

        let history = reconstruct_availability(&room, test_now());

        // Mar 15 to Apr 1 12:00 = 17 whole days.
        assert_eq!(history.periods[0].duration_days, 17);
    }

    #[test]
    fn test_zero_periods_degrades_to_raw_status() {
        let mut empty = room(vec![]);
        empty.current_status = Some("taken".to_string());

        let history = reconstruct_availability(&empty, test_now());

        assert_eq!(history.summary.total_periods, 0);
        assert_eq!(history.summary.times_changed, 0);
        assert!(history.summary.average_duration_days.is_none());
        assert_eq!(history.summary.current_status, RoomStatus::Taken);
        assert!(!history.summary.is_currently_listed);
    }

    #[test]
    fn test_offline_beats_current_period() {
        let mut offline = room(vec![snapshot("2024-03-15", None)]);
        offline.is_currently_listed = Some(false);

        let history = reconstruct_availability(&offline, test_now());

        assert_eq!(history.summary.current_status, RoomStatus::Offline);
        assert!(!history.summary.is_currently_listed);
    }

    #[test]
    fn test_no_current_period_means_taken() {
        let room = room(vec![snapshot("2024-01-01", Some("2024-03-01"))]);

        let history = reconstruct_availability(&room, test_now());

        assert_eq!(history.summary.current_status, RoomStatus::Taken);
        assert!(!history.summary.is_currently_listed);
    }

    #[test]
    fn test_days_since_discovered_uses_first_seen() {
        let mut with_first_seen = room(vec![snapshot("2024-03-15", None)]);
        with_first_seen.first_seen = Some("01/03/24".to_string());

        let history = reconstruct_availability(&with_first_seen, test_now());

        // Mar 1 to Apr 1 12:00 = 31 whole days.
        assert_eq!(history.summary.days_since_discovered, 31);
    }

    #[test]
    fn test_day_first_dates_in_snapshots() {
        let room = room(vec![snapshot("15/03/24", None)]);

        let history = reconstruct_availability(&room, test_now());

        assert_eq!(
            history.periods[0].start_date,
            Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
        );
    }
}
