//! Temporal normalization for scraped dates
//!
//! The scraper backend forwards dates exactly as the listing site renders
//! them, so the same field may arrive as RFC 3339, a bare ISO date,
//! `dd/mm/yyyy`, `dd/mm/yy`, or `dd-mm-yyyy`. Everything is normalized into
//! a canonical `DateTime<Utc>` at ingestion; nothing downstream parses date
//! strings.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Fallback instant for missing or unparseable dates: 2020-01-01T00:00:00Z.
///
/// Deliberately "very old" rather than "now": listings with unknown dates
/// sort to the oldest position and stay out of recent-activity windows.
/// Callers compare against this value to detect unknown dates; do not
/// change it without migrating those comparisons.
pub fn sentinel_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
        .single()
        .expect("sentinel date is a valid instant")
}

/// Normalize a raw date value into a canonical UTC instant.
///
/// Accepted encodings, tried in order:
/// 1. RFC 3339 / ISO-8601 with offset (`2024-03-05T10:00:00+02:00`)
/// 2. Naive ISO date-time (`2024-03-05T10:00:00`, space separator allowed)
/// 3. Day-first slash or dash dates (`05/03/2024`, `05/03/24`, `05-03-24`);
///    two-digit years are expanded by adding 2000, never into the 1900s
/// 4. Bare ISO date (`2024-03-05`)
///
/// Missing, empty, or unparseable input yields [`sentinel_date`]. The
/// function is total and deterministic: it never fails, and equal inputs
/// always produce identical instants.
pub fn normalize_date(raw: Option<&str>) -> DateTime<Utc> {
    let Some(raw) = raw else {
        return sentinel_date();
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return sentinel_date();
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt.with_timezone(&Utc);
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return naive.and_utc();
        }
    }

    // Day-first must run before the bare ISO parse: chrono would happily
    // read "05-03-20" as year 5, silently corrupting ordering.
    if let Some(date) = parse_day_first(trimmed) {
        return midnight_utc(date);
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return midnight_utc(date);
    }

    sentinel_date()
}

/// Day-first parse of slash- or dash-delimited dates.
///
/// First segment = day, second = month, third = year. A leading segment
/// longer than two digits is a year, so the input is not day-first and is
/// left for the ISO parser.
fn parse_day_first(s: &str) -> Option<NaiveDate> {
    let sep = if s.contains('/') {
        '/'
    } else if s.contains('-') {
        '-'
    } else {
        return None;
    };

    let parts: Vec<&str> = s.split(sep).collect();
    if parts.len() != 3 || parts[0].len() > 2 {
        return None;
    }

    let day: u32 = parts[0].trim().parse().ok()?;
    let month: u32 = parts[1].trim().parse().ok()?;
    let mut year: i32 = parts[2].trim().parse().ok()?;
    if year < 100 {
        year += 2000;
    }

    NaiveDate::from_ymd_opt(year, month, day)
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    // from_ymd_opt already validated the date; midnight always exists in UTC.
    date.and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}

/// Whole days elapsed from `start` to `end`, floored, clamped at zero.
///
/// Shared by availability durations and "days since" displays so every
/// consumer rounds the same way.
pub fn whole_days_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_days().max(0)
}
