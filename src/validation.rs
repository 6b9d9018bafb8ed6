//! Query parameter validation shared by the route handlers.
//!
//! Every function here is total: it never panics on arbitrary input and
//! reports failures as `AppError::BadRequest` with the message the client
//! sees.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{AppError, AppResult};
use crate::geo::Coordinate;

// =============================================================================
// Validation Constants
// =============================================================================

/// Radius used by `/api/routes?nearPoint=` when none is given, in meters.
pub const DEFAULT_NEAR_POINT_RADIUS_M: f64 = 20.0;

/// Longest radius accepted for proximity queries, in meters.
///
/// Half the earth's circumference; anything larger covers the whole globe.
pub const MAX_RADIUS_M: f64 = 20_037_508.0;

/// Maximum length of a YouTube video id.
pub const MAX_VIDEO_ID_LENGTH: usize = 64;

/// Whether `raw` is a real calendar date in `yyyy-MM-dd` form.
pub fn is_iso_date(raw: &str) -> bool {
    raw.len() == 10 && NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
}

/// Whether `raw` is a month in `yyyy-MM` form.
pub fn is_month(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    if bytes.len() != 7 || bytes[4] != b'-' {
        return false;
    }
    if !bytes[..4].iter().chain(&bytes[5..]).all(u8::is_ascii_digit) {
        return false;
    }
    matches!(raw[5..].parse::<u8>(), Ok(1..=12))
}

/// The `yyyy-MM` month of a validated `yyyy-MM-dd` date.
pub fn month_of(date: &str) -> &str {
    date.get(..7).unwrap_or(date)
}

/// Epoch milliseconds from a number or an ISO date/datetime.
///
/// Date-only and zone-less values are read as UTC.
pub fn parse_time_bound(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<f64>() {
        return ms.is_finite().then_some(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis() as f64);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc().timestamp_millis() as f64);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis() as f64)
}

/// Parse a `lat,lon` parameter.
pub fn parse_point(raw: &str, name: &str) -> AppResult<Coordinate> {
    Coordinate::parse_pair(raw).map_err(|e| {
        AppError::BadRequest(format!("{name} must be a latitude,longitude pair: {e}"))
    })
}

/// Parse a non-negative radius in meters.
pub fn parse_radius(raw: &str, name: &str) -> AppResult<f64> {
    match raw.trim().parse::<f64>() {
        Ok(r) if r.is_finite() && (0.0..=MAX_RADIUS_M).contains(&r) => Ok(r),
        _ => Err(AppError::BadRequest(format!(
            "{name} must be a number of meters between 0 and {MAX_RADIUS_M}"
        ))),
    }
}

/// Parse a route index.
pub fn parse_index(raw: &str) -> AppResult<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| AppError::BadRequest("idx must be at least 0".to_string()))
}

/// Parse a count that must be at least one.
pub fn parse_positive_count(raw: &str, name: &str) -> AppResult<usize> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(AppError::BadRequest(format!(
            "{name} must be a number greater than 0"
        ))),
    }
}

/// A YouTube video id is a short run of URL-safe base64 characters.
pub fn validate_video_id(raw: &str) -> AppResult<()> {
    let valid = !raw.is_empty()
        && raw.len() <= MAX_VIDEO_ID_LENGTH
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("videoId {raw:?} is not a valid video id")))
    }
}

/// Seconds from the first `HH:MM:SS` found in `raw`.
pub fn parse_offset_seconds(raw: &str) -> Option<u64> {
    let bytes = raw.as_bytes();
    bytes.windows(8).find_map(|w| {
        let digits = |i: usize| -> Option<u64> {
            let (a, b) = (w[i], w[i + 1]);
            (a.is_ascii_digit() && b.is_ascii_digit())
                .then(|| u64::from(a - b'0') * 10 + u64::from(b - b'0'))
        };
        if w[2] != b':' || w[5] != b':' {
            return None;
        }
        Some(digits(0)? * 3600 + digits(3)? * 60 + digits(6)?)
    })
}

/// Lowercased comma-separated terms, blanks dropped.
pub fn comma_terms(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Letters and digits only, as plates are compared.
pub fn plate_key(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_alphanumeric).collect()
}
