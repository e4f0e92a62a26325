//! PostgreSQL notification store.
//!
//! Schema lives in `sql/001_notifications.sql`; this module only verifies
//! that the table exists. Timestamps are stored as `TIMESTAMPTZ` and read
//! back as millisecond-precision UTC ISO 8601 strings, the format the
//! evaluator writes.
//!
//! Subscribers are pushed after writes made through this store instance.
//! Rows written by other processes show up on the next push or `list_all`.
//! Once a write has committed it is reported as saved, even if re-reading
//! the table for subscribers fails.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use postgres::{Client, NoTls, Row};

use crate::model::{AlertLevel, Notification, StoreError};
use crate::store::{NotificationStore, Subscriber, SubscriberRegistry, SubscriptionId};

const INSERT_SQL: &str = "
    INSERT INTO notifications (parameter, value, threshold, message, created_at, read)
    VALUES ($1, $2, $3, $4, $5, $6)
    RETURNING id
";

const SELECT_ALL_SQL: &str = "
    SELECT id, parameter, value, threshold, message, created_at, read
    FROM notifications
    ORDER BY id
";

const MARK_READ_SQL: &str = "UPDATE notifications SET read = TRUE WHERE id = $1";

/// [`NotificationStore`] backed by the `notifications` table.
pub struct PgNotificationStore {
    client: Mutex<Client>,
    subscribers: SubscriberRegistry,
}

impl PgNotificationStore {
    /// Connects and checks that the `notifications` table exists.
    pub fn connect_and_verify(database_url: &str) -> Result<Self, StoreError> {
        let mut client = Client::connect(database_url, NoTls).map_err(unavailable)?;
        let row = client
            .query_one("SELECT to_regclass('notifications') IS NOT NULL", &[])
            .map_err(unavailable)?;
        let table_exists: bool = row.get(0);
        if !table_exists {
            return Err(StoreError::Unavailable(
                "table 'notifications' not found; apply sql/001_notifications.sql".to_string(),
            ));
        }
        Ok(Self::from_client(client))
    }

    /// Wraps an already-connected client without verification.
    pub fn from_client(client: Client) -> Self {
        Self {
            client: Mutex::new(client),
            subscribers: SubscriberRegistry::new(),
        }
    }

    fn client(&self) -> Result<MutexGuard<'_, Client>, StoreError> {
        self.client
            .lock()
            .map_err(|_| StoreError::Unavailable("postgres client lock poisoned".to_string()))
    }

    /// Current set for subscribers after a committed write. A failed
    /// re-read is logged, never reported as a failed write.
    fn snapshot_after_write(&self) -> Option<Vec<Notification>> {
        self.subscribers.snapshot_after_write(|| self.list_all())
    }
}

impl NotificationStore for PgNotificationStore {
    fn append(&self, mut notification: Notification) -> Result<Notification, StoreError> {
        let created_at = parse_timestamp(&notification.timestamp)?;
        self.subscribers.deliver(move || {
            let row = self
                .client()?
                .query_one(
                    INSERT_SQL,
                    &[
                        &notification.parameter,
                        &notification.value,
                        &notification.threshold.as_str(),
                        &notification.message,
                        &created_at,
                        &notification.read,
                    ],
                )
                .map_err(unavailable)?;
            let id: i64 = row.get(0);
            notification.id = Some(id.to_string());
            Ok((notification, self.snapshot_after_write()))
        })
    }

    fn list_all(&self) -> Result<Vec<Notification>, StoreError> {
        let rows = self.client()?.query(SELECT_ALL_SQL, &[]).map_err(unavailable)?;
        rows.iter().map(row_to_notification).collect()
    }

    fn mark_read(&self, id: &str) -> Result<(), StoreError> {
        // Ids are BIGSERIAL; anything non-numeric cannot exist.
        let numeric_id: i64 = id.parse().map_err(|_| StoreError::NotFound(id.to_string()))?;
        self.subscribers.deliver(|| {
            let updated = self
                .client()?
                .execute(MARK_READ_SQL, &[&numeric_id])
                .map_err(unavailable)?;
            if updated == 0 {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Ok(((), self.snapshot_after_write()))
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
// Row mapping
// ---------------------------------------------------------------------------

fn unavailable(err: postgres::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn parse_timestamp(timestamp: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Invalid(format!("timestamp '{}' is not ISO 8601: {}", timestamp, e)))
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn row_to_notification(row: &Row) -> Result<Notification, StoreError> {
    let id: i64 = row.get("id");
    let threshold: String = row.get("threshold");
    Ok(Notification {
        id: Some(id.to_string()),
        parameter: row.get("parameter"),
        value: row.get("value"),
        threshold: threshold.parse::<AlertLevel>()?,
        message: row.get("message"),
        timestamp: format_timestamp(row.get("created_at")),
        read: row.get("read"),
    })
}
