//! Water-quality threshold classification.
//!
//! Maps a parameter value onto a severity band from
//! `thresholds::THRESHOLD_TABLE`. Everything here is pure: no clock, no
//! store, no logging. The notification evaluator builds on top of it.

use crate::model::{AlertLevel, Parameter, RawValue, Severity};
use crate::thresholds::{entry_for, Bounds, ThresholdSpec, GRAMS_PER_KILOGRAM};

// ---------------------------------------------------------------------------
// Value normalization
// ---------------------------------------------------------------------------

/// Characters the feed's serializer leaves wrapped around numeric values.
const DECORATION_CHARS: &[char] = &['"', '{', '}'];

/// Parses a raw feed value into a number.
///
/// Strips quote and brace decoration, trims, and reads the leading
/// floating-point number (trailing garbage is ignored, so `"7.2 pH"` is
/// 7.2). Missing, unparsable, zero and non-finite input all resolve to
/// `0.0`. This never fails: a broken probe shows up as an alarming zero
/// reading instead of disappearing from the dashboard.
pub fn parse_sensor_value(raw: Option<&RawValue>) -> f64 {
    let parsed = match raw {
        None => None,
        Some(RawValue::Number(n)) => Some(*n),
        Some(RawValue::Text(text)) => {
            let cleaned: String = text.chars().filter(|c| !DECORATION_CHARS.contains(c)).collect();
            leading_float(cleaned.trim())
        }
    };
    finite_or_zero(parsed.unwrap_or(0.0))
}

/// Reads the longest numeric prefix of `s` (`[+-]digits[.digits][e[+-]digits]`).
fn leading_float(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }
    if digits == 0 {
        return None;
    }
    // Exponent only counts when at least one digit follows it.
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+') | Some(b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    s[..end].parse::<f64>().ok()
}

fn finite_or_zero(value: f64) -> f64 {
    // `value == 0.0` also folds -0.0 into 0.0.
    if !value.is_finite() || value == 0.0 { 0.0 } else { value }
}

/// Converts a raw scale reading in grams to kilograms.
pub fn grams_to_kilograms(grams: f64) -> f64 {
    grams / GRAMS_PER_KILOGRAM
}

/// Parses a raw field and converts it into the unit the threshold table
/// uses for that parameter (kilograms for feed weight, as-is otherwise).
pub fn normalize(parameter: Parameter, raw: Option<&RawValue>) -> f64 {
    let value = parse_sensor_value(raw);
    match parameter {
        Parameter::FeedWeight => grams_to_kilograms(value),
        _ => value,
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Which side of a band a value fell out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Low,
    High,
}

/// A non-optimal classification with enough context to word a message.
#[derive(Debug, Clone, PartialEq)]
pub struct Breach {
    pub parameter: Parameter,
    pub level: AlertLevel,
    pub direction: Direction,
    /// Normalized value (kilograms for feed weight).
    pub value: f64,
}

/// Classifies a normalized value for `parameter`.
///
/// Critical is checked before warning, so a value outside both bands is
/// reported as critical only. Non-finite values are classified as `0.0`.
pub fn classify(parameter: Parameter, value: f64) -> Severity {
    assess(parameter, value)
        .map(|breach| match breach.level {
            AlertLevel::Warning => Severity::Warning,
            AlertLevel::Critical => Severity::Critical,
            AlertLevel::Refill => Severity::Refill,
        })
        .unwrap_or(Severity::Optimal)
}

/// Classifies a value and, when it breaches a band, reports which band and
/// on which side. Returns `None` for optimal values.
pub fn assess(parameter: Parameter, value: f64) -> Option<Breach> {
    let value = finite_or_zero(value);
    let (level, direction) = match entry_for(parameter).spec {
        ThresholdSpec::Tiered(t) => {
            if !t.critical.contains(value) {
                (AlertLevel::Critical, direction_of(&t.critical, value))
            } else if !t.warning.contains(value) {
                (AlertLevel::Warning, direction_of(&t.warning, value))
            } else {
                return None;
            }
        }
        ThresholdSpec::Refill(r) => match r.refill.max {
            Some(max) if value <= max => (AlertLevel::Refill, Direction::Low),
            _ => return None,
        },
    };
    Some(Breach { parameter, level, direction, value })
}

/// Low vs. high relative to the midpoint of the violated band.
fn direction_of(band: &Bounds, value: f64) -> Direction {
    match band.midpoint() {
        Some(mid) if value < mid => Direction::Low,
        Some(_) => Direction::High,
        None if band.max.is_none() => Direction::Low,
        None => Direction::High,
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

impl Breach {
    /// Human-readable message stored with the notification.
    pub fn message(&self) -> String {
        let label = entry_for(self.parameter).label;
        let value = format_value(self.parameter, self.value);
        match (self.level, self.direction) {
            (AlertLevel::Refill, _) => format!("{} is low ({} kg), refill needed", label, value),
            (AlertLevel::Critical, Direction::Low) => format!("{} is critically low: {}", label, value),
            (AlertLevel::Critical, Direction::High) => format!("{} is critically high: {}", label, value),
            (AlertLevel::Warning, Direction::Low) => format!("{} is below optimal range: {}", label, value),
            (AlertLevel::Warning, Direction::High) => format!("{} is above optimal range: {}", label, value),
        }
    }
}

/// Formats a value with its unit the way the dashboard shows it:
/// `7.2`, `4 mg/L`, `33°C`, `2100 µS/cm`, feed weight to two decimals.
fn format_value(parameter: Parameter, value: f64) -> String {
    match parameter {
        Parameter::Ph => format!("{}", value),
        Parameter::DissolvedOxygen => format!("{} mg/L", value),
        Parameter::Temperature => format!("{}°C", value),
        Parameter::Conductivity => format!("{} µS/cm", value),
        Parameter::FeedWeight => format!("{:.2}", round_half_away(value, 2)),
    }
}

/// Rounds ties away from zero (`0.125` → `0.13`); `{:.N}` alone would
/// round them to even.
fn round_half_away(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
