//! Structured logging for the aquaponics monitoring service
//!
//! Provides context-rich logging with component and parameter identifiers,
//! timestamps, and severity levels. Events go through `tracing`; console
//! output and an optional append-only log file are configured once at
//! startup by `init_logger`.

use std::fmt;
use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt as tracing_fmt};

use crate::ingest::FeedError;
use crate::model::StoreError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Parses a configured level name (`debug`, `info`, `warn`/`warning`,
    /// `error`). Unknown names fall back to `Info`.
    pub fn from_name(name: &str) -> LogLevel {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    fn filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Feed,
    Evaluator,
    Store,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Feed => write!(f, "FEED"),
            Component::Evaluator => write!(f, "EVAL"),
            Component::Store => write!(f, "STORE"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - caller asked for something that does not exist
    Expected,
    /// Unexpected failure - indicates service degradation or configuration issue
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Setup
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LogInitError {
    #[error("cannot open log file {path}: {source}")]
    LogFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("global logger already installed: {0}")]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG`, when set, overrides `min_level`. With `console_timestamps`
/// off, console lines carry only level, fields and message; the log file
/// (if any) always gets timestamps and never ANSI colors.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<&str>,
    console_timestamps: bool,
) -> Result<(), LogInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(min_level.filter_directive()));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console = tracing_fmt::layer().with_target(false);
    if console_timestamps {
        layers.push(console.boxed());
    } else {
        layers.push(console.without_time().boxed());
    }

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| LogInitError::LogFile { path: path.to_string(), source })?;
        layers.push(
            tracing_fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).with(filter).try_init()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Log a general informational message
pub fn info(component: Component, parameter: Option<&str>, message: &str) {
    tracing::info!(component = %component, parameter = parameter.unwrap_or("-"), "{}", message);
}

/// Log a warning message
pub fn warn(component: Component, parameter: Option<&str>, message: &str) {
    tracing::warn!(component = %component, parameter = parameter.unwrap_or("-"), "{}", message);
}

/// Log an error message
pub fn error(component: Component, parameter: Option<&str>, message: &str) {
    tracing::error!(component = %component, parameter = parameter.unwrap_or("-"), "{}", message);
}

/// Log a debug message
pub fn debug(component: Component, parameter: Option<&str>, message: &str) {
    tracing::debug!(component = %component, parameter = parameter.unwrap_or("-"), "{}", message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a store failure.
pub fn classify_store_failure(err: &StoreError) -> FailureType {
    match err {
        // Unknown ids usually come from a stale UI list.
        StoreError::NotFound(_) => FailureType::Expected,
        StoreError::Unavailable(_) => FailureType::Unexpected,
        StoreError::Invalid(_) => FailureType::Unknown,
    }
}

/// Classify a sensor feed failure.
pub fn classify_feed_failure(err: &FeedError) -> FailureType {
    match err {
        // 5xx from the realtime database is usually transient.
        FeedError::Status(code) if *code >= 500 => FailureType::Unknown,
        FeedError::Status(_) | FeedError::Http(_) => FailureType::Unexpected,
        FeedError::Parse(_) | FeedError::Malformed(_) => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a store failure with automatic classification
pub fn log_store_failure(parameter: Option<&str>, operation: &str, err: &StoreError) {
    let failure_type = classify_store_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(Component::Store, parameter, &message),
        FailureType::Unexpected => error(Component::Store, parameter, &message),
        FailureType::Unknown => warn(Component::Store, parameter, &message),
    }
}

/// Log a feed failure with classification
pub fn log_feed_failure(operation: &str, err: &FeedError) {
    let failure_type = classify_feed_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(Component::Feed, None, &message),
        FailureType::Unexpected => error(Component::Feed, None, &message),
        FailureType::Unknown => warn(Component::Feed, None, &message),
    }
}

// ---------------------------------------------------------------------------
// Evaluation Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one reading's evaluation
pub fn log_evaluation_summary(checked: usize, breaches: usize, persisted: usize) {
    let message = format!(
        "Evaluation complete: {} parameters checked, {} breaches, {} notifications persisted",
        checked, breaches, persisted
    );

    if breaches == 0 {
        info(Component::Evaluator, None, &message);
    } else if persisted < breaches {
        warn(Component::Evaluator, None, &message);
    } else {
        info(Component::Evaluator, None, &message);
    }
}
