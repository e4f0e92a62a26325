pub mod alert;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod store;
pub mod thresholds;
