//! Wall-clock time utilities for rollcall
//!
//! Sessions are scheduled on the local calendar, so everything here works in
//! `DateTime<Local>`.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `ROLLCALL_MOCK_TIME` environment variable can be set
//! to override the system time for all time-sensitive operations. This is
//! useful for rehearsing a timetable without waiting for the real clock.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-09-01 08:55:00`)
//!
//! Example:
//! ```bash
//! ROLLCALL_MOCK_TIME="2025-09-01 08:55:00" rollcalld
//! ```

use chrono::{DateTime, Local, LocalResult, NaiveDateTime, TimeZone};
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "ROLLCALL_MOCK_TIME";

/// Format accepted by the mock clock
const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Offset between mock time and real time, computed once at first use.
/// Mock time keeps advancing at the real rate from there.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            let mock_time_str = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
            let Ok(naive_dt) = NaiveDateTime::parse_from_str(&mock_time_str, MOCK_TIME_FORMAT) else {
                tracing::warn!(
                    mock_time = %mock_time_str,
                    expected_format = MOCK_TIME_FORMAT,
                    "Invalid mock time format"
                );
                return None;
            };
            let Some(mock_dt) = local_from_naive(naive_dt) else {
                tracing::warn!(
                    mock_time = %mock_time_str,
                    "Failed to convert mock time to local timezone"
                );
                return None;
            };
            let offset = mock_dt.signed_duration_since(chrono::Local::now());
            tracing::info!(
                mock_time = %mock_time_str,
                offset_secs = offset.num_seconds(),
                "Mock time enabled"
            );
            Some(offset)
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Resolve a naive local date-time to an instant.
///
/// Ambiguous times (clocks going back) resolve to the earlier instant.
/// Times inside a DST gap do not exist and return `None`.
pub fn local_from_naive(naive: NaiveDateTime) -> Option<DateTime<Local>> {
    resolve_in(&Local, naive)
}

/// [`local_from_naive`] for an explicit zone
pub fn resolve_in<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => None,
    }
}

/// Parse a timestamp given either as RFC 3339 or as local `YYYY-MM-DD HH:MM[:SS]`.
pub fn parse_local_datetime(s: &str) -> Result<DateTime<Local>, String> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Local));
    }

    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .map_err(|_| format!("Invalid timestamp '{}': expected RFC 3339 or YYYY-MM-DD HH:MM", s))?;

    local_from_naive(naive)
        .ok_or_else(|| format!("Timestamp '{}' does not exist in the local timezone", s))
}

/// Format a DateTime with full date and time.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, FixedOffset, NaiveDate, Timelike};

    /// +01:00 in winter, +02:00 from 2024-03-31 02:00 to 2024-10-27 03:00 local
    #[derive(Clone)]
    struct CentralEurope;

    fn winter() -> FixedOffset {
        FixedOffset::east_opt(3600).unwrap()
    }

    fn summer() -> FixedOffset {
        FixedOffset::east_opt(7200).unwrap()
    }

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    impl TimeZone for CentralEurope {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            CentralEurope
        }

        fn offset_from_local_date(&self, _local: &NaiveDate) -> LocalResult<FixedOffset> {
            LocalResult::Single(winter())
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let local = *local;
            if local >= naive(2024, 3, 31, 2, 0) && local < naive(2024, 3, 31, 3, 0) {
                LocalResult::None
            } else if local >= naive(2024, 10, 27, 2, 0) && local < naive(2024, 10, 27, 3, 0) {
                LocalResult::Ambiguous(summer(), winter())
            } else if local >= naive(2024, 3, 31, 3, 0) && local < naive(2024, 10, 27, 2, 0) {
                LocalResult::Single(summer())
            } else {
                LocalResult::Single(winter())
            }
        }

        fn offset_from_utc_date(&self, _utc: &NaiveDate) -> FixedOffset {
            winter()
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            if *utc >= naive(2024, 3, 31, 1, 0) && *utc < naive(2024, 10, 27, 1, 0) {
                summer()
            } else {
                winter()
            }
        }
    }

    #[test]
    fn test_dst_gap_has_no_instant() {
        assert!(resolve_in(&CentralEurope, naive(2024, 3, 31, 2, 30)).is_none());

        let after_gap = resolve_in(&CentralEurope, naive(2024, 3, 31, 3, 0)).unwrap();
        assert_eq!(after_gap.naive_utc(), naive(2024, 3, 31, 1, 0));
    }

    #[test]
    fn test_ambiguous_time_takes_earlier_instant() {
        let resolved = resolve_in(&CentralEurope, naive(2024, 10, 27, 2, 30)).unwrap();
        assert_eq!(resolved.naive_utc(), naive(2024, 10, 27, 0, 30));
        assert_eq!(resolved.offset(), &summer());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_format_datetime_full() {
        let dt = Local.with_ymd_and_hms(2025, 9, 1, 8, 55, 7).unwrap();
        assert_eq!(format_datetime_full(&dt), "2025-09-01 08:55:07");
    }

    #[test]
    fn test_parse_local_datetime_short_form() {
        let dt = parse_local_datetime("2024-01-01 09:30").unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 1);
        assert_eq!(dt.day(), 1);
        assert_eq!(dt.hour(), 9);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn test_parse_local_datetime_rfc3339() {
        let dt = parse_local_datetime("2024-01-01T09:30:00Z").unwrap();
        let expected = DateTime::parse_from_rfc3339("2024-01-01T09:30:00Z").unwrap();
        assert_eq!(dt, expected.with_timezone(&Local));
    }

    #[test]
    fn test_parse_local_datetime_rejects_garbage() {
        for input in ["", "tomorrow", "2024/01/01 09:00", "01-01-2024 09:00"] {
            assert!(parse_local_datetime(input).is_err(), "accepted {:?}", input);
        }
    }

    #[test]
    fn test_now_returns_time() {
        let t = now();
        assert!(t.year() >= 2020);
        assert!(t.year() <= 2100);
    }

    #[test]
    fn test_mock_time_env_var_name() {
        assert_eq!(MOCK_TIME_ENV_VAR, "ROLLCALL_MOCK_TIME");
    }

    #[test]
    #[cfg(debug_assertions)]
    fn test_is_mock_time_active_in_debug() {
        // OnceLock means the env var can't be toggled per test; just make sure it doesn't panic
        let _ = is_mock_time_active();
    }
}
