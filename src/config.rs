//! Service configuration.
//!
//! Loaded from a TOML file (default `aquamon.toml`) with every section
//! optional, then overlaid with environment variables (a `.env` file is
//! honored by `main` via `dotenv`):
//!
//! | Variable            | Overrides            |
//! |---------------------|----------------------|
//! | `DATABASE_URL`      | `store.database_url` |
//! | `AQUAMON_FEED_URL`  | `feed.base_url`      |
//! | `AQUAMON_FEED_AUTH` | `feed.auth_token`    |

use std::fs;
use std::path::Path;

use chrono::Duration;
use serde::Deserialize;

use crate::alert::AlertPolicy;
use crate::ingest::realtime::{self, SENSOR_DATA_PATH};
use crate::logging::LogLevel;

pub const DEFAULT_CONFIG_PATH: &str = "aquamon.toml";

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_FEED_URL: &str = "AQUAMON_FEED_URL";
pub const ENV_FEED_AUTH: &str = "AQUAMON_FEED_AUTH";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Realtime database root, e.g. `https://pond-default-rtdb.firebaseio.com`.
    pub base_url: String,
    pub path: String,
    pub auth_token: Option<String>,
    pub poll_interval_secs: u64,
    pub max_reading_age_minutes: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            base_url: String::new(),
            path: SENSOR_DATA_PATH.to_string(),
            auth_token: None,
            poll_interval_secs: 60,
            max_reading_age_minutes: 15,
        }
    }
}

impl FeedConfig {
    pub fn snapshot_url(&self) -> String {
        realtime::build_snapshot_url(&self.base_url, &self.path, self.auth_token.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Unset means every breaching reading is persisted.
    pub min_realert_interval_secs: Option<u64>,
}

impl AlertsConfig {
    pub fn policy(&self) -> AlertPolicy {
        match self.min_realert_interval_secs {
            Some(secs) if secs > 0 => {
                AlertPolicy::with_min_realert_interval(Duration::seconds(secs as i64))
            }
            _ => AlertPolicy::every_reading(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: None,
            timestamps: true,
        }
    }
}

impl LoggingConfig {
    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_name(&self.level)
    }
}

// ---------------------------------------------------------------------------
// MonitorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub feed: FeedConfig,
    pub store: StoreConfig,
    pub alerts: AlertsConfig,
    pub logging: LoggingConfig,
}

impl MonitorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads `path`, applies environment overrides and validates.
    ///
    /// A missing file is not an error: the service can run purely from
    /// environment variables.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            Self::from_toml_str(&text)?
        } else {
            MonitorConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_DATABASE_URL) {
            self.store.database_url = Some(url);
        }
        if let Some(url) = get(ENV_FEED_URL) {
            self.feed.base_url = url;
        }
        if let Some(token) = get(ENV_FEED_AUTH) {
            self.feed.auth_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "feed.base_url is empty (set it or {})",
                ENV_FEED_URL
            )));
        }
        if self.feed.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "feed.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.store.backend == StoreBackend::Postgres
            && self.store.database_url.as_deref().is_none_or(|u| u.trim().is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "store.backend = \"postgres\" needs store.database_url or {}",
                ENV_DATABASE_URL
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
