//! Timestamp encoding shared by every SQLite table.
//!
//! All instants are stored as RFC 3339 UTC strings at second precision
//! (`2026-10-16T02:00:00Z`). A fixed width and a fixed `Z` suffix keep lexical
//! order identical to chronological order, so `WHERE next_run <= ?` works on
//! plain TEXT columns.

use chrono::{DateTime, SecondsFormat, Utc};

/// Encode `dt` in the canonical storage format.
pub fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Decode a stored timestamp. Accepts any RFC 3339 offset and normalises to UTC.
pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Current instant truncated to whole seconds, matching what a round trip
/// through storage would yield.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_is_fixed_width_utc() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_ts(dt), "2026-01-02T03:04:05Z");
    }

    #[test]
    fn parse_normalises_offsets() {
        let parsed = parse_ts("2026-01-02T05:04:05+02:00").unwrap();
        assert_eq!(format_ts(parsed), "2026-01-02T03:04:05Z");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_ts("yesterday").is_none());
    }

    #[test]
    fn lexical_order_matches_time_order() {
        let a = format_ts(Utc.with_ymd_and_hms(2026, 9, 30, 23, 59, 59).unwrap());
        let b = format_ts(Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap());
        assert!(a < b);
    }

    #[test]
    fn now_has_no_subsecond_part() {
        assert_eq!(now().timestamp_subsec_nanos(), 0);
    }
}
