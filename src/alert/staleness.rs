//! Sensor reading staleness detection.
//!
//! The pond controller pushes a reading every few seconds while powered
//! and online. When it drops off the network the dashboard keeps showing
//! the last values, which may look healthy while the water is not. This
//! module lets the monitor flag that gap.
//!
//! # Clock injection
//! All functions accept a `now: DateTime<Utc>` parameter rather than calling
//! `Utc::now()` internally, keeping staleness deterministic in tests.

use chrono::{DateTime, Utc};

use crate::model::SensorReading;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StalenessError {
    #[error("reading has no timestamp")]
    MissingTimestamp,
    #[error("reading timestamp '{0}' is not ISO 8601")]
    InvalidTimestamp(String),
}

// ---------------------------------------------------------------------------
// Staleness check
// ---------------------------------------------------------------------------

/// Returns `true` if the reading's timestamp is older than `max_age_minutes`
/// relative to `now`.
///
/// Staleness is strictly greater than the threshold:
///   age > max_age_minutes  →  stale
///   age == max_age_minutes →  not stale
///
/// Readings stamped in the future (controller clock drift) are not stale.
/// Callers should treat errors as stale.
pub fn is_stale_at(
    reading: &SensorReading,
    max_age_minutes: u64,
    now: DateTime<Utc>,
) -> Result<bool, StalenessError> {
    let raw = reading
        .timestamp
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or(StalenessError::MissingTimestamp)?;
    let taken_at = DateTime::parse_from_rfc3339(raw.trim())
        .map_err(|_| StalenessError::InvalidTimestamp(raw.to_string()))?
        .with_timezone(&Utc);

    let age_minutes = (now - taken_at).num_minutes();
    Ok(age_minutes > 0 && age_minutes as u64 > max_age_minutes)
}

/// Convenience wrapper that uses the real current time.
/// Use `is_stale_at` in tests to keep them deterministic.
pub fn is_stale(reading: &SensorReading, max_age_minutes: u64) -> Result<bool, StalenessError> {
    is_stale_at(reading, max_age_minutes, Utc::now())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
