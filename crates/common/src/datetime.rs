//! DateTime utilities.

use chrono::{DateTime, SecondsFormat, Utc};

/// Get the current UTC time.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for log entries: RFC 3339, millisecond precision, `Z` suffix.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use panic_recovery_common::datetime::format_timestamp;
///
/// let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
/// assert_eq!(format_timestamp(&ts), "2024-01-02T03:04:05.000Z");
/// ```
pub fn format_timestamp(datetime: &DateTime<Utc>) -> String {
    datetime.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_utc_is_monotonic_enough() {
        let a = now_utc();
        let b = now_utc();
        assert!(b >= a);
    }

    #[test]
    fn test_format_timestamp_parses_back() {
        let now = now_utc();
        let formatted = format_timestamp(&now);
        let parsed = DateTime::parse_from_rfc3339(&formatted).unwrap();
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }
}
