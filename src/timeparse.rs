//! Human-friendly time bounds for the query endpoint.
//!
//! Accepted forms, tried in order:
//! - relative offsets into the past: `30s`, `5m`, `1h`, `2d`
//! - ISO-8601 / RFC 3339 timestamps, with or without an offset (naive means UTC)
//! - raw Unix seconds, integer or fractional

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use thiserror::Error;

use crate::model::unix_now;

/// Added to an integral Unix-seconds end bound so the whole second is included.
pub const END_OF_SECOND: f64 = 0.999_999;

/// Offsets without a colon, such as `+0700`.
const COMPACT_OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse time: {0}")]
pub struct TimeParseError(pub String);

fn relative_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(\d+)([smhd])$").expect("failed to compile relative time regex")
    })
}

/// Parse a `since`/`until` value into Unix seconds (UTC), relative to now.
pub fn parse_time_param(value: &str, is_end: bool) -> Result<f64, TimeParseError> {
    parse_time_param_at(value, is_end, unix_now())
}

/// Same as [`parse_time_param`] with an explicit reference time.
pub fn parse_time_param_at(value: &str, is_end: bool, now: f64) -> Result<f64, TimeParseError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TimeParseError(value.to_string()));
    }

    if let Some(caps) = relative_regex().captures(value) {
        let amount: f64 = caps[1]
            .parse()
            .map_err(|_| TimeParseError(value.to_string()))?;
        let unit = match caps[2].to_ascii_lowercase().as_str() {
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3_600.0,
            _ => 86_400.0,
        };
        return Ok(now - amount * unit);
    }

    if let Some(ts) = parse_iso(value) {
        return Ok(ts);
    }

    if let Ok(ts) = value.parse::<f64>() {
        if !ts.is_finite() {
            return Err(TimeParseError(value.to_string()));
        }
        if is_end && ts.fract() == 0.0 {
            return Ok(ts + END_OF_SECOND);
        }
        return Ok(ts);
    }

    Err(TimeParseError(value.to_string()))
}

fn parse_iso(value: &str) -> Option<f64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(to_unix(dt.with_timezone(&Utc)));
    }
    for format in COMPACT_OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(to_unix(dt.with_timezone(&Utc)));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(to_unix(naive.and_utc()));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| to_unix(naive.and_utc()))
}

fn to_unix(dt: DateTime<Utc>) -> f64 {
    dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_micros()) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: f64 = 1_767_149_043.0;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_relative_units() {
        assert!(close(parse_time_param_at("30s", false, NOW).unwrap(), NOW - 30.0));
        assert!(close(parse_time_param_at("5m", false, NOW).unwrap(), NOW - 300.0));
        assert!(close(parse_time_param_at("1H", false, NOW).unwrap(), NOW - 3600.0));
        assert!(close(parse_time_param_at("2d", true, NOW).unwrap(), NOW - 172_800.0));
    }

    #[test]
    fn test_iso_naive_is_utc() {
        let ts = parse_time_param_at("2025-12-31T02:44:03", false, NOW).unwrap();
        assert!(close(ts, 1_767_149_043.0));

        let spaced = parse_time_param_at("2025-12-31 02:44:03.5", false, NOW).unwrap();
        assert!(close(spaced, 1_767_149_043.5));
    }

    #[test]
    fn test_iso_with_offset() {
        let ts = parse_time_param_at("2025-12-31T09:44:03+07:00", false, NOW).unwrap();
        assert!(close(ts, 1_767_149_043.0));

        let zulu = parse_time_param_at("2025-12-31T02:44:03Z", false, NOW).unwrap();
        assert!(close(zulu, 1_767_149_043.0));

        let compact = parse_time_param_at("2025-12-31T09:44:03+0700", false, NOW).unwrap();
        assert!(close(compact, 1_767_149_043.0));

        let spaced = parse_time_param_at("2025-12-30 21:44:03.25-0500", false, NOW).unwrap();
        assert!(close(spaced, 1_767_149_043.25));
    }

    #[test]
    fn test_date_only_is_midnight_utc() {
        let ts = parse_time_param_at("2025-12-31", false, NOW).unwrap();
        assert!(close(ts, 1_767_139_200.0));
    }

    #[test]
    fn test_unix_seconds() {
        assert!(close(parse_time_param_at("1767149043", false, NOW).unwrap(), 1_767_149_043.0));
        assert!(close(parse_time_param_at("1767149043.5", true, NOW).unwrap(), 1_767_149_043.5));
    }

    #[test]
    fn test_integer_end_covers_whole_second() {
        let end = parse_time_param_at("1767149043", true, NOW).unwrap();
        assert!(close(end, 1_767_149_043.999_999));

        let end = parse_time_param_at("1767149043.0", true, NOW).unwrap();
        assert!(close(end, 1_767_149_043.999_999));

        let start = parse_time_param_at("1767149043.0", false, NOW).unwrap();
        assert!(close(start, 1_767_149_043.0));
    }

    #[test]
    fn test_rejects_garbage() {
        for bad in ["", "yesterday", "5w", "12:00", "nan", "inf"] {
            assert!(parse_time_param_at(bad, false, NOW).is_err(), "{bad} should fail");
        }
    }
}
