//! Notification sink — best-effort messages to workflow participants.
//!
//! The engine records who should hear about each transition; delivering
//! beyond the `notifications` table is the embedding application's
//! concern. Sink failures are logged and swallowed so a broken sink can
//! never fail a workflow operation.

use crate::db::{notification_repo, Database};

/// Receives workflow notifications. Implementations handle their own
/// failures; the engine never checks the outcome.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, sender_id: i64, recipient_id: i64, title: &str, message: &str);
}

/// Persists notifications into the `notifications` table.
pub struct DbNotifier {
    db: Database,
}

impl DbNotifier {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl NotificationSink for DbNotifier {
    fn notify(&self, sender_id: i64, recipient_id: i64, title: &str, message: &str) {
        let created_at = crate::db::now();
        let result = self.db.with_conn(|conn| {
            notification_repo::insert(conn, sender_id, recipient_id, title, message, &created_at)
                .map(|_| ())
        });
        if let Err(e) = result {
            log::warn!("Failed to record notification for user {}: {}", recipient_id, e);
        }
    }
}

/// Discards all notifications. Useful in tests and batch tooling.
pub struct NoopNotifier;

impl NotificationSink for NoopNotifier {
    fn notify(&self, _sender_id: i64, _recipient_id: i64, _title: &str, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{notification_repo, user_repo};

    #[test]
    fn test_db_notifier_persists() {
        let db = Database::open_in_memory().unwrap();
        let (sender, recipient) = db
            .with_conn(|conn| {
                let sender = user_repo::insert(conn, "s", "Sender", None)?;
                let recipient = user_repo::insert(conn, "r", "Recipient", None)?;
                Ok((sender, recipient))
            })
            .unwrap();

        let notifier = DbNotifier::new(db.clone());
        notifier.notify(sender, recipient, "Approval", "hello");

        let rows = db
            .with_conn(|conn| notification_repo::list_for_recipient(conn, recipient, false, 10))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Approval");
        assert_eq!(rows[0].message, "hello");
    }

    #[test]
    fn test_noop_notifier_discards() {
        // Nothing to observe; the call just must not panic.
        NoopNotifier.notify(1, 2, "Approval", "hello");
    }
}
