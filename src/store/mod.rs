//! Notification persistence.
//!
//! The evaluator only talks to [`NotificationStore`]; which backend sits
//! behind it is a deployment choice:
//! - `memory`: process-local store, used by tests and single-node runs.
//! - `pg`: `notifications` table via the `postgres` crate.
//!
//! Every backend pushes the full notification set to subscribers after each
//! change it makes. Pushes are delivered in the order changes were made,
//! so a subscriber's latest push always matches the store.

pub mod memory;
pub mod pg;
mod subscribers;

pub use self::memory::InMemoryStore;
pub use self::pg::PgNotificationStore;
pub use self::subscribers::{Subscriber, SubscriberRegistry, SubscriptionId};

use crate::model::{Notification, StoreError};

/// Persistence and change-notification for notifications.
///
/// `append` must be atomic per call: concurrent evaluations append without
/// coordinating with each other.
pub trait NotificationStore: Send + Sync {
    /// Persists one notification and returns it with its assigned id.
    fn append(&self, notification: Notification) -> Result<Notification, StoreError>;

    /// All stored notifications, each carrying its id.
    fn list_all(&self) -> Result<Vec<Notification>, StoreError>;

    /// Flips `read` to true. Fails with `NotFound` for unknown ids and
    /// leaves every other field untouched.
    fn mark_read(&self, id: &str) -> Result<(), StoreError>;

    /// Registers a callback that receives the full notification set once
    /// immediately and again after every change.
    ///
    /// Callbacks may read from the store but must not write to it.
    fn subscribe(&self, callback: Subscriber) -> Result<SubscriptionId, StoreError>;

    /// Removes a subscription. Returns false if it was not registered.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

// ---------------------------------------------------------------------------
// Dashboard helpers
// ---------------------------------------------------------------------------

/// Number of notifications not yet marked read.
pub fn unread_count(store: &dyn NotificationStore) -> Result<usize, StoreError> {
    Ok(store.list_all()?.iter().filter(|n| !n.read).count())
}

/// Marks every unread notification read. Returns how many were changed.
///
/// Stops at the first store error; notifications already flipped stay read.
pub fn mark_all_read(store: &dyn NotificationStore) -> Result<usize, StoreError> {
    let mut changed = 0;
    for notification in store.list_all()?.into_iter().filter(|n| !n.read) {
        if let Some(id) = notification.id.as_deref() {
            store.mark_read(id)?;
            changed += 1;
        }
    }
    Ok(changed)
}

/// All notifications, most recent first.
///
/// ISO 8601 UTC timestamps sort lexically; ties keep store order.
pub fn list_newest_first(store: &dyn NotificationStore) -> Result<Vec<Notification>, StoreError> {
    let mut notifications = store.list_all()?;
    notifications.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(notifications)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
