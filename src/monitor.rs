//! Poll loop tying the sensor feed to the evaluator.
//!
//! One poll fetches the `sensor_data` snapshot, takes the latest reading,
//! warns if it is stale, and evaluates it. Stale readings are still
//! evaluated; the dashboard shows them as current, so their alerts stand.

use std::thread;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};

use crate::alert::staleness::{is_stale_at, StalenessError};
use crate::alert::Evaluator;
use crate::config::FeedConfig;
use crate::ingest::realtime::{fetch_snapshot, latest_reading};
use crate::ingest::FeedError;
use crate::logging::{self, Component};
use crate::model::{Notification, SensorReading, StoreError};

const HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a single poll did.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The feed had no readings.
    NoData,
    Evaluated {
        stale: bool,
        notifications: Vec<Notification>,
    },
}

pub struct Monitor {
    client: reqwest::blocking::Client,
    snapshot_url: String,
    poll_interval: StdDuration,
    max_reading_age_minutes: u64,
    evaluator: Evaluator,
}

impl Monitor {
    pub fn new(feed: &FeedConfig, evaluator: Evaluator) -> Result<Self, FeedError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(StdDuration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Monitor {
            client,
            snapshot_url: feed.snapshot_url(),
            poll_interval: StdDuration::from_secs(feed.poll_interval_secs),
            max_reading_age_minutes: feed.max_reading_age_minutes,
            evaluator,
        })
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Fetches the feed once and evaluates its latest reading.
    pub fn poll_once(&self) -> Result<PollOutcome, MonitorError> {
        let readings = match fetch_snapshot(&self.client, &self.snapshot_url) {
            Ok(readings) => readings,
            Err(err) => {
                logging::log_feed_failure("fetch sensor snapshot", &err);
                return Err(err.into());
            }
        };
        Ok(process_snapshot_at(
            &self.evaluator,
            &readings,
            self.max_reading_age_minutes,
            Utc::now(),
        )?)
    }

    /// Polls forever at the configured interval. Failures are logged and
    /// the next poll goes ahead as scheduled.
    pub fn run(&self) -> ! {
        logging::info(
            Component::System,
            None,
            &format!("polling sensor feed every {}s", self.poll_interval.as_secs()),
        );
        loop {
            // Errors are already logged where they occur.
            let _ = self.poll_once();
            thread::sleep(self.poll_interval);
        }
    }
}

/// Evaluates the latest reading of an already fetched snapshot.
pub fn process_snapshot_at(
    evaluator: &Evaluator,
    readings: &[SensorReading],
    max_reading_age_minutes: u64,
    now: DateTime<Utc>,
) -> Result<PollOutcome, StoreError> {
    let Some(reading) = latest_reading(readings) else {
        logging::debug(Component::Feed, None, "sensor snapshot is empty");
        return Ok(PollOutcome::NoData);
    };

    let stale = check_staleness(reading, max_reading_age_minutes, now);
    let notifications = evaluator.evaluate_at(reading, now)?;
    Ok(PollOutcome::Evaluated { stale, notifications })
}

fn check_staleness(reading: &SensorReading, max_age_minutes: u64, now: DateTime<Utc>) -> bool {
    match is_stale_at(reading, max_age_minutes, now) {
        Ok(false) => false,
        Ok(true) => {
            logging::warn(
                Component::Feed,
                None,
                &format!(
                    "latest reading ({}) is older than {} minutes; controller may be offline",
                    reading.timestamp.as_deref().unwrap_or("?"),
                    max_age_minutes
                ),
            );
            true
        }
        // The controller does not always stamp its records.
        Err(StalenessError::MissingTimestamp) => {
            logging::debug(Component::Feed, None, "latest reading has no timestamp");
            false
        }
        Err(err) => {
            logging::warn(Component::Feed, None, &err.to_string());
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawValue;
    use crate::store::{InMemoryStore, NotificationStore};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
    }

    fn healthy(timestamp: Option<&str>) -> SensorReading {
        SensorReading {
            ph: Some(RawValue::from(7.0)),
            dissolved_oxygen: Some(RawValue::from(6.0)),
            temperature: Some(RawValue::from(26.0)),
            conductivity: Some(RawValue::from(800.0)),
            weight_grams: Some(RawValue::from(2500.0)),
            timestamp: timestamp.map(str::to_string),
        }
    }

    fn evaluator() -> (Arc<InMemoryStore>, Evaluator) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), Evaluator::new(store))
    }

    #[test]
    fn test_empty_snapshot_is_no_data() {
        let (store, evaluator) = evaluator();
        let outcome = process_snapshot_at(&evaluator, &[], 15, fixed_now()).unwrap();
        assert_eq!(outcome, PollOutcome::NoData);
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_only_latest_reading_is_evaluated() {
        let (store, evaluator) = evaluator();
        let mut bad = healthy(None);
        bad.ph = Some(RawValue::from(9.6));
        let readings = vec![bad, healthy(None)];

        let outcome = process_snapshot_at(&evaluator, &readings, 15, fixed_now()).unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Evaluated { stale: false, notifications: vec![] },
            "earlier out-of-range reading must not alert"
        );
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_stale_reading_is_flagged_but_still_evaluated() {
        let (store, evaluator) = evaluator();
        let mut reading = healthy(Some("2024-05-01T12:00:00.000Z"));
        reading.dissolved_oxygen = Some(RawValue::from(2.0));

        let outcome = process_snapshot_at(&evaluator, &[reading], 15, fixed_now()).unwrap();
        match outcome {
            PollOutcome::Evaluated { stale, notifications } => {
                assert!(stale, "60-minute-old reading should be stale");
                assert_eq!(notifications.len(), 1);
            }
            other => panic!("expected evaluation, got {:?}", other),
        }
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_unparseable_timestamp_counts_as_stale() {
        let (_store, evaluator) = evaluator();
        let reading = healthy(Some("yesterday"));
        let outcome = process_snapshot_at(&evaluator, &[reading], 15, fixed_now()).unwrap();
        assert_eq!(outcome, PollOutcome::Evaluated { stale: true, notifications: vec![] });
    }
}
