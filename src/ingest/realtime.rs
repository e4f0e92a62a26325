//! Realtime database sensor feed client.
//!
//! The pond controller pushes one record per tick under `sensor_data`,
//! keyed by a push id. Push ids sort chronologically, so the last key is
//! the latest reading.
//!
//! The controller serializes its JSON payload in a way that leaves quote
//! and brace characters in both keys and values, so a record looks like:
//!
//! ```json
//! { "{\"pH\"": "\"7.10\"", "\"DO\"": "5.4", "\"Temperature\"": "27.5",
//!   "\"EC\"": "910", "\"Weight\"": "1840}" }
//! ```
//!
//! Keys are cleaned here; values are kept raw and normalized by
//! `alert::classify::parse_sensor_value` at evaluation time.
//!
//! REST docs: https://firebase.google.com/docs/reference/rest/database

use serde_json::Value;

use crate::ingest::FeedError;
use crate::logging::{self, Component};
use crate::model::{Parameter, RawValue, SensorReading};

/// Default node the controller writes to.
pub const SENSOR_DATA_PATH: &str = "sensor_data";

// ============================================================================
// URL construction
// ============================================================================

/// Builds the REST URL for a database node, e.g.
/// `https://pond.firebaseio.com/sensor_data.json?auth=...`.
pub fn build_snapshot_url(base_url: &str, path: &str, auth_token: Option<&str>) -> String {
    let mut url = format!(
        "{}/{}.json",
        base_url.trim_end_matches('/'),
        path.trim_matches('/')
    );
    if let Some(token) = auth_token.filter(|t| !t.is_empty()) {
        url.push_str("?auth=");
        url.push_str(token);
    }
    url
}

// ============================================================================
// API client
// ============================================================================

/// Fetches and parses the full snapshot at `url`, oldest reading first.
pub fn fetch_snapshot(
    client: &reqwest::blocking::Client,
    url: &str,
) -> Result<Vec<SensorReading>, FeedError> {
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()?;

    if !response.status().is_success() {
        return Err(FeedError::Status(response.status().as_u16()));
    }

    let body = response.text()?;
    parse_snapshot(&body)
}

/// The most recent reading of a snapshot, if any.
pub fn latest_reading(readings: &[SensorReading]) -> Option<&SensorReading> {
    readings.last()
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses a `sensor_data` snapshot body.
///
/// `null` (node absent) yields no readings. Entries that are not objects
/// are skipped with a debug log; a top level that is neither `null` nor an
/// object is malformed.
pub fn parse_snapshot(body: &str) -> Result<Vec<SensorReading>, FeedError> {
    let json: Value = serde_json::from_str(body)?;
    let entries = match json {
        Value::Null => return Ok(Vec::new()),
        Value::Object(entries) => entries,
        other => {
            return Err(FeedError::Malformed(format!(
                "expected an object of readings, got {}",
                json_kind(&other)
            )));
        }
    };

    let mut readings = Vec::with_capacity(entries.len());
    for (push_id, record) in entries {
        match record {
            Value::Object(fields) => readings.push(parse_record(&fields)),
            other => logging::debug(
                Component::Feed,
                None,
                &format!("skipping entry {}: {} is not a reading", push_id, json_kind(&other)),
            ),
        }
    }
    Ok(readings)
}

/// Maps one record's decorated keys onto a `SensorReading`.
///
/// Unknown keys are ignored; a missing field stays `None`.
pub fn parse_record(fields: &serde_json::Map<String, Value>) -> SensorReading {
    let mut reading = SensorReading::default();
    for (key, value) in fields {
        let name = clean_key(key);
        if name.eq_ignore_ascii_case("timestamp") {
            reading.timestamp = value.as_str().map(|s| clean_key(s));
            continue;
        }
        if let Some(parameter) = Parameter::from_name(&name) {
            *reading.raw_mut(parameter) = raw_value(value);
        }
    }
    reading
}

/// Strips quote and brace decoration plus surrounding whitespace.
fn clean_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '"' | '{' | '}'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn raw_value(value: &Value) -> Option<RawValue> {
    match value {
        Value::Number(n) => n.as_f64().map(RawValue::Number),
        Value::String(s) => Some(RawValue::Text(s.clone())),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const DECORATED_SNAPSHOT: &str = r#"{
        "-NxA1": { "{\"pH\"": "\"7.10\"", "\"DO\"": "5.4", "\"Temperature\"": "27.5",
                   "\"EC\"": "910", "\"Weight\"": "1840}" },
        "-NxA2": { "{\"pH\"": "\"9.60\"", "\"DO\"": "2.1", "\"Temperature\"": "27.0",
                   "\"EC\"": "905", "\"Weight\"": "760}" }
    }"#;

    #[test]
    fn test_build_snapshot_url() {
        assert_eq!(
            build_snapshot_url("https://pond.firebaseio.com/", "sensor_data", None),
            "https://pond.firebaseio.com/sensor_data.json"
        );
        assert_eq!(
            build_snapshot_url("https://pond.firebaseio.com", "/sensor_data/", Some("s3cret")),
            "https://pond.firebaseio.com/sensor_data.json?auth=s3cret"
        );
        assert_eq!(
            build_snapshot_url("https://pond.firebaseio.com", "sensor_data", Some("")),
            "https://pond.firebaseio.com/sensor_data.json"
        );
    }

    #[test]
    fn test_parse_decorated_snapshot_keeps_raw_values() {
        let readings = parse_snapshot(DECORATED_SNAPSHOT).expect("fixture should parse");
        assert_eq!(readings.len(), 2);

        let first = &readings[0];
        assert_eq!(first.ph, Some(RawValue::Text("\"7.10\"".to_string())));
        assert_eq!(first.dissolved_oxygen, Some(RawValue::Text("5.4".to_string())));
        assert_eq!(first.weight_grams, Some(RawValue::Text("1840}".to_string())));
        assert_eq!(first.timestamp, None);
    }

    #[test]
    fn test_latest_reading_is_last_push_id() {
        let readings = parse_snapshot(DECORATED_SNAPSHOT).unwrap();
        let latest = latest_reading(&readings).expect("snapshot has readings");
        assert_eq!(latest.ph, Some(RawValue::Text("\"9.60\"".to_string())));
    }

    #[test]
    fn test_plain_numeric_record_with_timestamp() {
        let body = r#"{ "-NxB1": { "pH": 6.9, "DO": 5.5, "Temp": 26.5, "EC": 700,
                                  "Weight": 2000, "timestamp": "2024-05-01T12:59:00.000Z" } }"#;
        let readings = parse_snapshot(body).unwrap();
        let reading = &readings[0];
        assert_eq!(reading.ph, Some(RawValue::Number(6.9)));
        assert_eq!(reading.temperature, Some(RawValue::Number(26.5)));
        assert_eq!(reading.conductivity, Some(RawValue::Number(700.0)));
        assert_eq!(reading.timestamp.as_deref(), Some("2024-05-01T12:59:00.000Z"));
    }

    #[test]
    fn test_missing_and_null_fields_stay_none() {
        let body = r#"{ "-NxC1": { "pH": null, "EC": 800, "battery": 3.7 } }"#;
        let reading = &parse_snapshot(body).unwrap()[0];
        assert_eq!(reading.ph, None);
        assert_eq!(reading.dissolved_oxygen, None);
        assert_eq!(reading.conductivity, Some(RawValue::Number(800.0)));
    }

    #[test]
    fn test_null_snapshot_has_no_readings() {
        assert!(parse_snapshot("null").unwrap().is_empty());
        assert!(latest_reading(&[]).is_none());
    }

    #[test]
    fn test_non_object_entries_are_skipped() {
        let body = r#"{ "-NxD1": "garbage", "-NxD2": { "pH": 7.0 } }"#;
        let readings = parse_snapshot(body).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].ph, Some(RawValue::Number(7.0)));
    }

    #[test]
    fn test_top_level_array_is_malformed() {
        let result = parse_snapshot("[1, 2, 3]");
        assert!(matches!(result, Err(FeedError::Malformed(_))), "got {:?}", result);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        assert!(matches!(parse_snapshot("{not json"), Err(FeedError::Parse(_))));
    }
}
