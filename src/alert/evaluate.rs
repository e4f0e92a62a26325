//! Reading evaluation and notification emission.
//!
//! Runs the classifier over every monitored parameter of one reading,
//! turns each breach into a [`Notification`], and appends it to the store.
//!
//! There is no de-duplication by default: a parameter that stays out of
//! range produces a new notification on every evaluated reading.
//! `AlertPolicy::min_realert_interval` can throttle that per parameter and
//! level, but is off unless configured.
//!
//! # Clock injection
//! `evaluate_at` takes `now` explicitly; `evaluate` uses the real clock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::alert::classify::{assess, normalize, Breach};
use crate::logging::{self, Component};
use crate::model::{AlertLevel, Notification, Parameter, SensorReading, StoreError};
use crate::store::NotificationStore;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Re-alert throttling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertPolicy {
    /// Minimum time between two notifications for the same parameter and
    /// level. `None` emits on every evaluation.
    pub min_realert_interval: Option<Duration>,
}

impl AlertPolicy {
    /// Emit on every breaching evaluation.
    pub fn every_reading() -> Self {
        Self::default()
    }

    pub fn with_min_realert_interval(interval: Duration) -> Self {
        Self { min_realert_interval: Some(interval) }
    }
}

// ---------------------------------------------------------------------------
// Pure construction
// ---------------------------------------------------------------------------

/// Formats `now` like the dashboard's stored timestamps,
/// e.g. `2024-05-01T13:00:00.000Z`.
pub fn iso_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Every breach in `reading`, in `Parameter::ALL` order.
///
/// Missing or malformed fields count as zero, so a reading with no usable
/// values reports every parameter as breached.
pub fn detect_breaches(reading: &SensorReading) -> Vec<Breach> {
    Parameter::ALL
        .into_iter()
        .filter_map(|parameter| assess(parameter, normalize(parameter, reading.raw(parameter))))
        .collect()
}

/// Unsaved notification for one breach.
pub fn notification_for(breach: &Breach, timestamp: &str) -> Notification {
    Notification::new(
        breach.parameter.record_name(),
        breach.value,
        breach.level,
        breach.message(),
        timestamp,
    )
}

/// Unsaved notifications for every breach in `reading`, all stamped with
/// `timestamp`.
pub fn build_notifications(reading: &SensorReading, timestamp: &str) -> Vec<Notification> {
    detect_breaches(reading)
        .iter()
        .map(|breach| notification_for(breach, timestamp))
        .collect()
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Classifies readings and persists one notification per breach.
///
/// Safe to share across threads; concurrent `evaluate` calls for different
/// readings only ever append.
pub struct Evaluator {
    store: Arc<dyn NotificationStore>,
    policy: AlertPolicy,
    last_alerted: Mutex<HashMap<(Parameter, AlertLevel), DateTime<Utc>>>,
}

impl Evaluator {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self::with_policy(store, AlertPolicy::default())
    }

    pub fn with_policy(store: Arc<dyn NotificationStore>, policy: AlertPolicy) -> Self {
        Self {
            store,
            policy,
            last_alerted: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    /// Evaluates `reading` against the real clock.
    pub fn evaluate(&self, reading: &SensorReading) -> Result<Vec<Notification>, StoreError> {
        self.evaluate_at(reading, Utc::now())
    }

    /// Evaluates `reading`, stamping notifications with `now`.
    ///
    /// Appends one notification per breach, in parameter order, and returns
    /// the stored records with their ids. The first store error is returned
    /// unchanged; notifications appended before it stay persisted and the
    /// rest of the reading is not attempted.
    pub fn evaluate_at(
        &self,
        reading: &SensorReading,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, StoreError> {
        let timestamp = iso_timestamp(now);
        let breaches = detect_breaches(reading);
        let mut stored = Vec::with_capacity(breaches.len());

        for breach in &breaches {
            let name = breach.parameter.record_name();
            let Some(reservation) = self.reserve(breach, now) else {
                logging::debug(
                    Component::Evaluator,
                    Some(name),
                    &format!("{} alert suppressed by re-alert interval", breach.level),
                );
                continue;
            };

            let saved = match self.store.append(notification_for(breach, &timestamp)) {
                Ok(saved) => saved,
                Err(err) => {
                    self.release(breach, reservation);
                    logging::log_store_failure(Some(name), "append notification", &err);
                    return Err(err);
                }
            };
            log_emitted(&saved);
            stored.push(saved);
        }

        logging::log_evaluation_summary(Parameter::ALL.len(), breaches.len(), stored.len());
        Ok(stored)
    }

    /// Claims the re-alert slot for `breach` at `now`.
    ///
    /// Check and claim happen under one lock, so concurrent evaluations
    /// cannot both pass the interval. Returns `None` when throttled, else
    /// the previous alert time to restore if the append fails.
    fn reserve(&self, breach: &Breach, now: DateTime<Utc>) -> Option<Reservation> {
        let Some(interval) = self.policy.min_realert_interval else {
            return Some(Reservation::Unthrottled);
        };
        let Ok(mut last_alerted) = self.last_alerted.lock() else {
            return Some(Reservation::Unthrottled);
        };
        let key = (breach.parameter, breach.level);
        if last_alerted.get(&key).is_some_and(|last| now - *last < interval) {
            return None;
        }
        Some(Reservation::Claimed { previous: last_alerted.insert(key, now) })
    }

    fn release(&self, breach: &Breach, reservation: Reservation) {
        let Reservation::Claimed { previous } = reservation else {
            return;
        };
        if let Ok(mut last_alerted) = self.last_alerted.lock() {
            let key = (breach.parameter, breach.level);
            match previous {
                Some(previous) => last_alerted.insert(key, previous),
                None => last_alerted.remove(&key),
            };
        }
    }
}

enum Reservation {
    /// No re-alert interval configured.
    Unthrottled,
    Claimed { previous: Option<DateTime<Utc>> },
}

fn log_emitted(notification: &Notification) {
    let id = notification.id.as_deref().unwrap_or("?");
    let message = format!("[{}] {} (id {})", notification.threshold, notification.message, id);
    match notification.threshold {
        AlertLevel::Critical => logging::warn(Component::Evaluator, Some(&notification.parameter), &message),
        AlertLevel::Warning | AlertLevel::Refill => {
            logging::info(Component::Evaluator, Some(&notification.parameter), &message)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawValue;
    use crate::store::{InMemoryStore, Subscriber, SubscriptionId};
    use chrono::TimeZone;

    /// A fixed "now" used across all tests: 2024-05-01 13:00:00 UTC.
    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
    }

    fn healthy_reading() -> SensorReading {
        SensorReading {
            ph: Some(RawValue::Text("\"7.2\"".to_string())),
            dissolved_oxygen: Some(RawValue::Number(6.0)),
            temperature: Some(RawValue::Number(28.0)),
            conductivity: Some(RawValue::Number(900.0)),
            weight_grams: Some(RawValue::Text("2500}".to_string())),
            timestamp: None,
        }
    }

    fn evaluator() -> (Arc<InMemoryStore>, Evaluator) {
        let store = Arc::new(InMemoryStore::new());
        let evaluator = Evaluator::new(store.clone());
        (store, evaluator)
    }

    /// Store that accepts `remaining` appends, then reports itself down.
    struct FlakyStore {
        inner: InMemoryStore,
        remaining: Mutex<usize>,
    }

    impl NotificationStore for FlakyStore {
        fn append(&self, notification: Notification) -> Result<Notification, StoreError> {
            let mut remaining = self.remaining.lock().unwrap();
            if *remaining == 0 {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            *remaining -= 1;
            self.inner.append(notification)
        }
        fn list_all(&self) -> Result<Vec<Notification>, StoreError> {
            self.inner.list_all()
        }
        fn mark_read(&self, id: &str) -> Result<(), StoreError> {
            self.inner.mark_read(id)
        }
        fn subscribe(&self, callback: Subscriber) -> Result<SubscriptionId, StoreError> {
            self.inner.subscribe(callback)
        }
        fn unsubscribe(&self, id: SubscriptionId) -> bool {
            self.inner.unsubscribe(id)
        }
    }

    // --- Emission -----------------------------------------------------------

    #[test]
    fn test_healthy_reading_emits_nothing() {
        let (store, evaluator) = evaluator();
        let emitted = evaluator.evaluate_at(&healthy_reading(), fixed_now()).unwrap();
        assert!(emitted.is_empty(), "all-optimal reading should not notify, got {:?}", emitted);
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_breaches_are_persisted_in_parameter_order() {
        let (store, evaluator) = evaluator();
        let reading = SensorReading {
            ph: Some(RawValue::Number(9.5)),
            temperature: Some(RawValue::Number(23.0)),
            weight_grams: Some(RawValue::Number(800.0)),
            ..healthy_reading()
        };

        let emitted = evaluator.evaluate_at(&reading, fixed_now()).unwrap();
        let summary: Vec<_> = emitted
            .iter()
            .map(|n| (n.parameter.as_str(), n.threshold))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("pH", AlertLevel::Critical),
                ("Temperature", AlertLevel::Warning),
                ("Weight", AlertLevel::Refill),
            ]
        );
        for n in &emitted {
            assert!(n.id.is_some(), "returned notifications carry store ids");
            assert!(!n.read);
            assert_eq!(n.timestamp, "2024-05-01T13:00:00.000Z");
        }
        assert_eq!(emitted[2].value, 0.8, "weight is reported in kilograms");
        assert_eq!(emitted[2].message, "Feed level is low (0.80 kg), refill needed");
        assert_eq!(store.list_all().unwrap(), emitted);
    }

    #[test]
    fn test_empty_reading_breaches_every_parameter_as_zero() {
        let (_, evaluator) = evaluator();
        let emitted = evaluator.evaluate_at(&SensorReading::default(), fixed_now()).unwrap();
        assert_eq!(emitted.len(), 5, "every missing field degrades to 0 and breaches");
        assert!(emitted.iter().all(|n| n.value == 0.0));
        assert_eq!(emitted[0].message, "pH level is critically low: 0");
        assert_eq!(emitted[4].threshold, AlertLevel::Refill);
    }

    #[test]
    fn test_repeated_breach_is_not_deduplicated() {
        let (store, evaluator) = evaluator();
        let reading = SensorReading { ph: Some(RawValue::Number(9.5)), ..healthy_reading() };

        let first = evaluator.evaluate_at(&reading, fixed_now()).unwrap();
        let second = evaluator.evaluate_at(&reading, fixed_now()).unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_ne!(first[0].id, second[0].id, "each evaluation must create a new record");
        assert_eq!(store.list_all().unwrap().len(), 2);
    }

    // --- Re-alert policy ----------------------------------------------------

    #[test]
    fn test_realert_interval_suppresses_within_window_only() {
        let store = Arc::new(InMemoryStore::new());
        let evaluator = Evaluator::with_policy(
            store.clone(),
            AlertPolicy::with_min_realert_interval(Duration::minutes(30)),
        );
        let reading = SensorReading { ph: Some(RawValue::Number(9.5)), ..healthy_reading() };

        assert_eq!(evaluator.evaluate_at(&reading, fixed_now()).unwrap().len(), 1);
        let ten_min_later = fixed_now() + Duration::minutes(10);
        assert!(evaluator.evaluate_at(&reading, ten_min_later).unwrap().is_empty());
        let hour_later = fixed_now() + Duration::minutes(60);
        assert_eq!(evaluator.evaluate_at(&reading, hour_later).unwrap().len(), 1);
        assert_eq!(store.list_all().unwrap().len(), 2);
    }

    #[test]
    fn test_realert_interval_is_per_level() {
        let store = Arc::new(InMemoryStore::new());
        let evaluator = Evaluator::with_policy(
            store.clone(),
            AlertPolicy::with_min_realert_interval(Duration::minutes(30)),
        );
        let warning = SensorReading { ph: Some(RawValue::Number(8.7)), ..healthy_reading() };
        let critical = SensorReading { ph: Some(RawValue::Number(9.5)), ..healthy_reading() };

        assert_eq!(evaluator.evaluate_at(&warning, fixed_now()).unwrap().len(), 1);
        let escalated = evaluator
            .evaluate_at(&critical, fixed_now() + Duration::minutes(1))
            .unwrap();
        assert_eq!(escalated.len(), 1, "escalation to critical must not be throttled");
    }

    #[test]
    fn test_concurrent_evaluations_share_one_realert_slot() {
        let store = Arc::new(InMemoryStore::new());
        let evaluator = Arc::new(Evaluator::with_policy(
            store.clone(),
            AlertPolicy::with_min_realert_interval(Duration::minutes(30)),
        ));
        let reading = SensorReading { ph: Some(RawValue::Number(9.5)), ..healthy_reading() };

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let evaluator = Arc::clone(&evaluator);
                let reading = reading.clone();
                std::thread::spawn(move || evaluator.evaluate_at(&reading, fixed_now()).unwrap().len())
            })
            .collect();
        let emitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(emitted, 1, "only one evaluation may claim the re-alert slot");
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_append_does_not_consume_realert_slot() {
        let store = Arc::new(FlakyStore { inner: InMemoryStore::new(), remaining: Mutex::new(0) });
        let evaluator = Evaluator::with_policy(
            store.clone(),
            AlertPolicy::with_min_realert_interval(Duration::minutes(30)),
        );
        let reading = SensorReading { ph: Some(RawValue::Number(9.5)), ..healthy_reading() };

        assert!(evaluator.evaluate_at(&reading, fixed_now()).is_err());
        *store.remaining.lock().unwrap() = 1;
        let retried = evaluator
            .evaluate_at(&reading, fixed_now() + Duration::minutes(1))
            .expect("store is back");
        assert_eq!(retried.len(), 1, "an alert that was never stored must not be throttled");
    }

    // --- Failure propagation ------------------------------------------------

    #[test]
    fn test_store_failure_is_propagated_unchanged() {
        let store = Arc::new(FlakyStore { inner: InMemoryStore::new(), remaining: Mutex::new(1) });
        let evaluator = Evaluator::new(store.clone());
        let reading = SensorReading {
            ph: Some(RawValue::Number(9.5)),
            conductivity: Some(RawValue::Number(2500.0)),
            weight_grams: Some(RawValue::Number(100.0)),
            ..healthy_reading()
        };

        let result = evaluator.evaluate_at(&reading, fixed_now());
        assert_eq!(result, Err(StoreError::Unavailable("connection reset".to_string())));

        let persisted = store.list_all().unwrap();
        assert_eq!(persisted.len(), 1, "the append before the failure stays persisted");
        assert_eq!(persisted[0].parameter, "pH");
    }

    // --- Pure helpers -------------------------------------------------------

    #[test]
    fn test_build_notifications_shares_timestamp_and_is_unread() {
        let reading = SensorReading {
            dissolved_oxygen: Some(RawValue::Number(2.0)),
            conductivity: Some(RawValue::Text("{\"1600\"}".to_string())),
            ..healthy_reading()
        };
        let built = build_notifications(&reading, "2024-05-01T13:00:00.000Z");
        assert_eq!(built.len(), 2);
        assert!(built.iter().all(|n| n.id.is_none() && !n.read));
        assert_eq!(built[0].message, "Dissolved Oxygen level is critically low: 2 mg/L");
        assert_eq!(built[1].message, "EC level is above optimal range: 1600 µS/cm");
    }

    #[test]
    fn test_iso_timestamp_uses_millisecond_utc_format() {
        assert_eq!(iso_timestamp(fixed_now()), "2024-05-01T13:00:00.000Z");
    }
}
