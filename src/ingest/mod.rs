//! Sensor data ingestion.
//!
//! Submodules:
//! - `realtime`: reads the controller's `sensor_data` node from the
//!   realtime database REST endpoint.

pub mod realtime;

/// Errors that can arise when fetching or decoding sensor feed data.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The request never produced a response (DNS, TLS, timeout...).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-2xx HTTP response from the feed.
    #[error("HTTP error: {0}")]
    Status(u16),
    /// The response body is not JSON.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// JSON, but not shaped like a sensor snapshot.
    #[error("Malformed snapshot: {0}")]
    Malformed(String),
}
