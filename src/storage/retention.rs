//! Retention window arithmetic.

use crate::model::unix_now;

pub const DEFAULT_RETENTION_DAYS: u32 = 7;
pub const MIN_RETENTION_DAYS: u32 = 1;
pub const MAX_RETENTION_DAYS: u32 = 365;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Turn a raw configured value into a usable retention period.
///
/// Missing or non-integer input falls back to [`DEFAULT_RETENTION_DAYS`];
/// integers are clamped to `[MIN_RETENTION_DAYS, MAX_RETENTION_DAYS]`.
pub fn normalize_retention_days(raw: Option<&str>) -> u32 {
    let Some(raw) = raw else {
        return DEFAULT_RETENTION_DAYS;
    };
    match raw.trim().parse::<i64>() {
        Ok(days) => days.clamp(
            i64::from(MIN_RETENTION_DAYS),
            i64::from(MAX_RETENTION_DAYS),
        ) as u32,
        Err(_) => {
            tracing::warn!(raw, default = DEFAULT_RETENTION_DAYS, "Invalid retention days, using default");
            DEFAULT_RETENTION_DAYS
        }
    }
}

/// Timestamp below which records are eligible for deletion, relative to now.
pub fn retention_cutoff(retention_days: u32) -> f64 {
    retention_cutoff_at(retention_days, unix_now())
}

pub fn retention_cutoff_at(retention_days: u32, now: f64) -> f64 {
    now - f64::from(retention_days) * SECONDS_PER_DAY
}
