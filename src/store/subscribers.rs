//! Observer registry shared by the store backends.
//!
//! Writes go through [`SubscriberRegistry::deliver`], which holds a delivery
//! lock across the change and its broadcast. Registration takes the same
//! lock, so a new subscriber's initial snapshot cannot miss a concurrent
//! write and pushes never arrive out of order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::logging;
use crate::model::{Notification, StoreError};

/// Callback receiving the full notification set.
pub type Subscriber = Box<dyn Fn(&[Notification]) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Registered subscribers, in registration order.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    entries: Mutex<Vec<(SubscriptionId, Arc<Subscriber>)>>,
    delivery: Mutex<()>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` and hands it the set returned by `current`.
    ///
    /// `current` runs under the delivery lock, so no write can land between
    /// the snapshot and the registration.
    pub fn register<F>(&self, callback: Subscriber, current: F) -> Result<SubscriptionId, StoreError>
    where
        F: FnOnce() -> Result<Vec<Notification>, StoreError>,
    {
        let _delivery = self.delivery_lock();
        let current = current()?;
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let callback = Arc::new(callback);
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("subscriber registry lock poisoned".to_string()))?
            .push((id, Arc::clone(&callback)));
        callback(&current);
        Ok(id)
    }

    pub fn remove(&self, id: SubscriptionId) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies `change` and pushes the snapshot it returns, if any.
    ///
    /// Changes and their pushes are serialized, so subscribers see
    /// snapshots in the order the changes were made. An error from
    /// `change` is returned without a push.
    pub fn deliver<T, F>(&self, change: F) -> Result<T, StoreError>
    where
        F: FnOnce() -> Result<(T, Option<Vec<Notification>>), StoreError>,
    {
        let _delivery = self.delivery_lock();
        let (result, snapshot) = change()?;
        if let Some(snapshot) = snapshot {
            self.broadcast(&snapshot);
        }
        Ok(result)
    }

    /// Fetches a snapshot for subscribers after a write that already
    /// succeeded.
    ///
    /// Returns `None` without calling `fetch` when nobody is subscribed. A
    /// failed fetch is logged and skipped: the write stands, and the next
    /// successful change brings subscribers up to date.
    pub fn snapshot_after_write<F>(&self, fetch: F) -> Option<Vec<Notification>>
    where
        F: FnOnce() -> Result<Vec<Notification>, StoreError>,
    {
        if self.is_empty() {
            return None;
        }
        match fetch() {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                logging::log_store_failure(None, "refresh subscribers", &err);
                None
            }
        }
    }

    /// Callbacks run outside the registry lock, so a callback may itself
    /// subscribe or unsubscribe.
    fn broadcast(&self, snapshot: &[Notification]) {
        let callbacks: Vec<Arc<Subscriber>> = match self.entries.lock() {
            Ok(entries) => entries.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback(snapshot);
        }
    }

    fn delivery_lock(&self) -> MutexGuard<'_, ()> {
        // Guards no data; a panicking callback must not block later writes.
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
