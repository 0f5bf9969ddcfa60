/// Utility helpers shared by the fetcher and the aggregator.
///
/// This module contains:
/// - Time range computation in the configured zone
/// - Photo URL normalization
///
/// IMPORTANT:
/// - Everything here is pure and deterministic.
/// - "now" is always passed in, never read from the clock.
///
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};

/// Half-open time interval `[start, end)` in the configured zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl TimeRange {
    pub fn start_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_millis(&self) -> i64 {
        self.end.timestamp_millis()
    }

    pub fn duration_millis(&self) -> i64 {
        (self.end - self.start).num_milliseconds()
    }
}

/// Returns the ISO week containing `now`, as seen in `zone`.
///
/// Range:
///     [Monday 00:00, Monday 00:00 + 7 days)
///
/// Examples (zone +05:30):
/// - Sun 2024-03-10 23:59:59 -> [Mon 2024-03-04 00:00, Mon 2024-03-11 00:00)
/// - Mon 2024-03-11 00:00:01 -> [Mon 2024-03-11 00:00, Mon 2024-03-18 00:00)
///
pub fn week_range(now: DateTime<Utc>, zone: FixedOffset) -> TimeRange {
    let today = now.with_timezone(&zone).date_naive();
    let days_since_monday = i64::from(today.weekday().num_days_from_monday());
    let start = local_midnight(today - Duration::days(days_since_monday), zone);

    TimeRange {
        start,
        end: start + Duration::days(7),
    }
}

/// Returns the calendar day containing `now`, as seen in `zone`.
pub fn day_range(now: DateTime<Utc>, zone: FixedOffset) -> TimeRange {
    let start = local_midnight(now.with_timezone(&zone).date_naive(), zone);

    TimeRange {
        start,
        end: start + Duration::days(1),
    }
}

// A fixed offset has no gaps or folds, so the local midnight
// always maps to exactly one instant.
fn local_midnight(date: NaiveDate, zone: FixedOffset) -> DateTime<FixedOffset> {
    let local = date.and_time(NaiveTime::MIN);
    let utc = local - Duration::seconds(i64::from(zone.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, zone)
}

/// Strips a trailing image size directive from a profile photo URL.
///
/// Examples:
/// - ".../photo.jpg=s100" -> ".../photo.jpg"
/// - ".../photo.jpg"      -> ".../photo.jpg"
/// - ".../photo=small"    -> ".../photo=small"
///
pub fn strip_photo_size_suffix(url: &str) -> &str {
    match url.rsplit_once('=') {
        Some((base, directive)) if is_size_directive(directive) => base,
        _ => url,
    }
}

fn is_size_directive(directive: &str) -> bool {
    directive
        .strip_prefix('s')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}
