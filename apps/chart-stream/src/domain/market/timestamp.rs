//! Feed timestamp handling.
//!
//! Upstream frames carry epoch times in seconds or milliseconds. Values above
//! `1e10` cannot be plausible seconds (year 2286) and are read as milliseconds.

use chrono::Utc;

/// Magnitude above which a raw epoch value is taken to be milliseconds.
const MILLIS_THRESHOLD: f64 = 1e10;

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current wall-clock time in epoch seconds.
#[must_use]
pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Convert a raw epoch value (seconds or milliseconds) to milliseconds.
///
/// Returns `None` for NaN or infinite input.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn normalize_epoch_millis(raw: f64) -> Option<i64> {
    if !raw.is_finite() {
        return None;
    }
    let millis = if raw.abs() > MILLIS_THRESHOLD {
        raw
    } else {
        raw * 1000.0
    };
    Some(millis.floor() as i64)
}

/// Resolve an optional raw epoch value, falling back to the current time.
#[must_use]
pub fn resolve_epoch_millis(raw: Option<f64>) -> i64 {
    raw.and_then(normalize_epoch_millis)
        .unwrap_or_else(now_millis)
}
