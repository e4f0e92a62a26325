//! Process-local notification store.
//!
//! Records live in a `BTreeMap` keyed by a zero-padded sequence id, so
//! `list_all` returns them in append order.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::model::{Notification, StoreError};
use crate::store::{NotificationStore, Subscriber, SubscriberRegistry, SubscriptionId};

#[derive(Default)]
struct Records {
    next_seq: u64,
    by_id: BTreeMap<String, Notification>,
}

/// In-memory [`NotificationStore`].
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<Records>,
    subscribers: SubscriberRegistry,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Records>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    fn snapshot(records: &Records) -> Vec<Notification> {
        records.by_id.values().cloned().collect()
    }
}

impl NotificationStore for InMemoryStore {
    fn append(&self, mut notification: Notification) -> Result<Notification, StoreError> {
        self.subscribers.deliver(move || {
            let mut records = self.lock()?;
            records.next_seq += 1;
            let id = format!("{:012}", records.next_seq);
            notification.id = Some(id.clone());
            records.by_id.insert(id, notification.clone());
            let snapshot = Self::snapshot(&records);
            Ok((notification, Some(snapshot)))
        })
    }

    fn list_all(&self) -> Result<Vec<Notification>, StoreError> {
        let records = self.lock()?;
        Ok(Self::snapshot(&records))
    }

    fn mark_read(&self, id: &str) -> Result<(), StoreError> {
        self.subscribers.deliver(|| {
            let mut records = self.lock()?;
            let record = records
                .by_id
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            if record.read {
                // Nothing changed; no need to wake subscribers.
                return Ok(((), None));
            }
            record.read = true;
            Ok(((), Some(Self::snapshot(&records))))
        })
    }

    fn subscribe(&self, callback: Subscriber) -> Result<SubscriptionId, StoreError> {
        self.subscribers.register(callback, || self.list_all())
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
