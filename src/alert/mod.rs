//! Threshold alerting.
//!
//! - `classify`: pure severity classification and value normalization.
//! - `evaluate`: turns breaches into persisted notifications.
//! - `staleness`: flags sensor readings that stopped updating.

pub mod classify;
pub mod evaluate;
pub mod staleness;

pub use classify::{assess, classify, normalize, parse_sensor_value, Breach, Direction};
pub use evaluate::{AlertPolicy, Evaluator};
