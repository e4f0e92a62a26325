//! Core data types for the aquaponics monitoring service.
//!
//! This module defines the shared domain model imported by all other modules:
//! the monitored parameters, raw sensor readings, severity levels and the
//! persisted notification record. It contains no I/O.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// One monitored physical quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parameter {
    Ph,
    DissolvedOxygen,
    Temperature,
    Conductivity,
    FeedWeight,
}

impl Parameter {
    /// Evaluation order. Notifications for one reading are persisted in
    /// this order.
    pub const ALL: [Parameter; 5] = [
        Parameter::Ph,
        Parameter::DissolvedOxygen,
        Parameter::Temperature,
        Parameter::Conductivity,
        Parameter::FeedWeight,
    ];

    /// Threshold table key (`pH`, `DO`, `temperature`, `EC`, `weight`).
    pub fn key(&self) -> &'static str {
        match self {
            Parameter::Ph => "pH",
            Parameter::DissolvedOxygen => "DO",
            Parameter::Temperature => "temperature",
            Parameter::Conductivity => "EC",
            Parameter::FeedWeight => "weight",
        }
    }

    /// Name written into the `parameter` field of stored notifications.
    ///
    /// Differs from [`Parameter::key`] for temperature and weight; existing
    /// notification rows use the capitalized form.
    pub fn record_name(&self) -> &'static str {
        match self {
            Parameter::Ph => "pH",
            Parameter::DissolvedOxygen => "DO",
            Parameter::Temperature => "Temperature",
            Parameter::Conductivity => "EC",
            Parameter::FeedWeight => "Weight",
        }
    }

    /// Unit of the value after normalization.
    pub fn unit(&self) -> &'static str {
        match self {
            Parameter::Ph => "",
            Parameter::DissolvedOxygen => "mg/L",
            Parameter::Temperature => "°C",
            Parameter::Conductivity => "µS/cm",
            Parameter::FeedWeight => "kg",
        }
    }

    /// Resolves a parameter from a table key, record name, or feed field
    /// name. Matching ignores ASCII case; `Temp` is accepted as the
    /// relational column name for temperature.
    pub fn from_name(name: &str) -> Option<Parameter> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("temp") {
            return Some(Parameter::Temperature);
        }
        Parameter::ALL.into_iter().find(|p| {
            p.key().eq_ignore_ascii_case(name) || p.record_name().eq_ignore_ascii_case(name)
        })
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.record_name())
    }
}

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// A raw field value as delivered by the sensor feed.
///
/// The feed sometimes wraps numbers in quote or brace characters left over
/// from an upstream serialization step, so a field may be either a JSON
/// number or a string such as `"\"7.2\""` or `"1500}"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

/// One snapshot of every monitored instrument.
///
/// Owned by the sensor feed; evaluation only borrows it. Feed weight is in
/// grams exactly as the scale reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub ph: Option<RawValue>,
    pub dissolved_oxygen: Option<RawValue>,
    pub temperature: Option<RawValue>,
    pub conductivity: Option<RawValue>,
    pub weight_grams: Option<RawValue>,
    /// ISO 8601, e.g. "2024-05-01T12:00:00.000Z". Absent when the device
    /// did not stamp the reading.
    pub timestamp: Option<String>,
}

impl SensorReading {
    /// Raw field for a parameter.
    pub fn raw(&self, parameter: Parameter) -> Option<&RawValue> {
        match parameter {
            Parameter::Ph => self.ph.as_ref(),
            Parameter::DissolvedOxygen => self.dissolved_oxygen.as_ref(),
            Parameter::Temperature => self.temperature.as_ref(),
            Parameter::Conductivity => self.conductivity.as_ref(),
            Parameter::FeedWeight => self.weight_grams.as_ref(),
        }
    }

    /// Mutable slot for a parameter, used by feed parsers.
    pub fn raw_mut(&mut self, parameter: Parameter) -> &mut Option<RawValue> {
        match parameter {
            Parameter::Ph => &mut self.ph,
            Parameter::DissolvedOxygen => &mut self.dissolved_oxygen,
            Parameter::Temperature => &mut self.temperature,
            Parameter::Conductivity => &mut self.conductivity,
            Parameter::FeedWeight => &mut self.weight_grams,
        }
    }
}

// ---------------------------------------------------------------------------
// Severity types
// ---------------------------------------------------------------------------

/// Classification outcome for a single parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Optimal,
    Warning,
    Critical,
    Refill,
}

impl Severity {
    /// The notification level for a breach, or `None` when optimal.
    pub fn alert_level(&self) -> Option<AlertLevel> {
        match self {
            Severity::Optimal => None,
            Severity::Warning => Some(AlertLevel::Warning),
            Severity::Critical => Some(AlertLevel::Critical),
            Severity::Refill => Some(AlertLevel::Refill),
        }
    }
}

/// The `threshold` field of a stored notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
    Refill,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
            AlertLevel::Refill => "refill",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertLevel {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warning" => Ok(AlertLevel::Warning),
            "critical" => Ok(AlertLevel::Critical),
            "refill" => Ok(AlertLevel::Refill),
            other => Err(StoreError::Invalid(format!("unknown threshold level '{}'", other))),
        }
    }
}

// ---------------------------------------------------------------------------
// Notification record
// ---------------------------------------------------------------------------

/// A record of one parameter breaching one band at one point in time.
///
/// Serializes to the shape existing consumers read:
/// `{ id, parameter, value, threshold, message, timestamp, read }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Assigned by the store on append; `None` before persistence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub parameter: String,
    pub value: f64,
    pub threshold: AlertLevel,
    pub message: String,
    pub timestamp: String, // ISO 8601, e.g. "2024-05-01T13:00:00.000Z"
    #[serde(default)]
    pub read: bool,
}

impl Notification {
    /// Builds an unsaved, unread notification.
    pub fn new(
        parameter: impl Into<String>,
        value: f64,
        threshold: AlertLevel,
        message: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            parameter: parameter.into(),
            value,
            threshold,
            message: message.into(),
            timestamp: timestamp.into(),
            read: false,
        }
    }

    /// Equality on every field except `id`.
    pub fn same_content(&self, other: &Notification) -> bool {
        self.parameter == other.parameter
            && self.value == other.value
            && self.threshold == other.threshold
            && self.message == other.message
            && self.timestamp == other.timestamp
            && self.read == other.read
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by a notification store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    /// No notification exists with the given identifier.
    #[error("Notification not found: {0}")]
    NotFound(String),
    /// The record cannot be represented by the backing store.
    #[error("Invalid notification record: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_from_name_accepts_keys_and_record_names() {
        assert_eq!(Parameter::from_name("pH"), Some(Parameter::Ph));
        assert_eq!(Parameter::from_name("do"), Some(Parameter::DissolvedOxygen));
        assert_eq!(Parameter::from_name("temperature"), Some(Parameter::Temperature));
        assert_eq!(Parameter::from_name("Temperature"), Some(Parameter::Temperature));
        assert_eq!(Parameter::from_name("Temp"), Some(Parameter::Temperature));
        assert_eq!(Parameter::from_name("EC"), Some(Parameter::Conductivity));
        assert_eq!(Parameter::from_name("Weight"), Some(Parameter::FeedWeight));
        assert_eq!(Parameter::from_name("salinity"), None);
    }

    #[test]
    fn test_notification_serializes_to_stored_shape() {
        let n = Notification::new(
            "pH",
            9.5,
            AlertLevel::Critical,
            "pH level is critically high: 9.5",
            "2024-05-01T13:00:00.000Z",
        );
        let json = serde_json::to_value(&n).expect("notification should serialize");
        assert_eq!(json["parameter"], "pH");
        assert_eq!(json["value"], 9.5);
        assert_eq!(json["threshold"], "critical");
        assert_eq!(json["read"], false);
        assert!(json.get("id").is_none(), "unsaved notification must not carry an id");
    }

    #[test]
    fn test_notification_without_read_flag_deserializes_unread() {
        let json = r#"{
            "parameter": "Weight",
            "value": 0.8,
            "threshold": "refill",
            "message": "Feed level is low (0.80 kg), refill needed",
            "timestamp": "2024-05-01T13:00:00.000Z"
        }"#;
        let n: Notification = serde_json::from_str(json).expect("stored record should parse");
        assert!(!n.read);
        assert_eq!(n.threshold, AlertLevel::Refill);
    }

    #[test]
    fn test_alert_level_rejects_unknown_text() {
        assert_eq!("warning".parse::<AlertLevel>(), Ok(AlertLevel::Warning));
        assert!(matches!("optimal".parse::<AlertLevel>(), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn test_optimal_has_no_alert_level() {
        assert_eq!(Severity::Optimal.alert_level(), None);
        assert_eq!(Severity::Refill.alert_level(), Some(AlertLevel::Refill));
    }
}
