//! Notification repository — persisted best-effort notifications.

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::DatabaseError;

/// A notification row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRow {
    pub id: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
}

impl NotificationRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            sender_id: row.get("sender_id")?,
            recipient_id: row.get("recipient_id")?,
            title: row.get("title")?,
            message: row.get("message")?,
            is_read: row.get("is_read")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts a notification and returns its id.
pub fn insert(
    conn: &Connection,
    sender_id: i64,
    recipient_id: i64,
    title: &str,
    message: &str,
    created_at: &str,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO notifications (sender_id, recipient_id, title, message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![sender_id, recipient_id, title, message, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Lists a recipient's notifications, newest first.
pub fn list_for_recipient(
    conn: &Connection,
    recipient_id: i64,
    unread_only: bool,
    limit: u64,
) -> Result<Vec<NotificationRow>, DatabaseError> {
    let sql = if unread_only {
        "SELECT * FROM notifications
         WHERE recipient_id = ?1 AND is_read = 0
         ORDER BY created_at DESC, id DESC LIMIT ?2"
    } else {
        "SELECT * FROM notifications
         WHERE recipient_id = ?1
         ORDER BY created_at DESC, id DESC LIMIT ?2"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows: Vec<NotificationRow> = stmt
        .query_map(params![recipient_id, limit as i64], NotificationRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Marks a notification as read.
pub fn mark_read(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

/// Number of unread notifications for a recipient.
pub fn unread_count(conn: &Connection, recipient_id: i64) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND is_read = 0",
        params![recipient_id],
        |r| r.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{user_repo, Database};

    fn test_db() -> (Database, i64, i64) {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let (sender, recipient) = db
            .with_conn(|conn| {
                let sender = user_repo::insert(conn, "sender", "Sender", None)?;
                let recipient = user_repo::insert(conn, "recipient", "Recipient", None)?;
                Ok((sender, recipient))
            })
            .unwrap();
        (db, sender, recipient)
    }

    #[test]
    fn test_insert_and_list() {
        let (db, sender, recipient) = test_db();
        db.with_conn(|conn| {
            insert(conn, sender, recipient, "Approval", "First", "2026-01-01T00:00:00Z")?;
            insert(conn, sender, recipient, "Approval", "Second", "2026-01-02T00:00:00Z")?;

            let rows = list_for_recipient(conn, recipient, false, 10)?;
            assert_eq!(rows.len(), 2);
            // Newest first.
            assert_eq!(rows[0].message, "Second");
            assert!(!rows[0].is_read);

            assert!(list_for_recipient(conn, sender, false, 10)?.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_mark_read_and_unread_count() {
        let (db, sender, recipient) = test_db();
        db.with_conn(|conn| {
            let id = insert(conn, sender, recipient, "Approval", "One", "2026-01-01T00:00:00Z")?;
            insert(conn, sender, recipient, "Approval", "Two", "2026-01-01T00:00:00Z")?;

            assert_eq!(unread_count(conn, recipient)?, 2);

            mark_read(conn, id)?;
            assert_eq!(unread_count(conn, recipient)?, 1);

            let unread = list_for_recipient(conn, recipient, true, 10)?;
            assert_eq!(unread.len(), 1);
            assert_eq!(unread[0].message, "Two");
            Ok(())
        })
        .unwrap();
    }
}
