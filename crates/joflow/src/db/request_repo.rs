//! Job request repository — CRUD operations for the `requests` table.

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::DatabaseError;

/// A raw job request row from the database.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRow {
    pub id: i64,
    pub control_number: String,
    pub category: String,
    pub tool: String,
    pub nature: String,
    pub details: String,
    pub line: String,
    pub requested_for: String,
    pub requester_id: i64,
    pub status: String,
    pub current_stage: i64,
    pub assignee_id: Option<i64>,
    pub action_taken: Option<String>,
    pub created_at: String,
    pub received_at: Option<String>,
    pub target_date: Option<String>,
    pub target_date_reason: Option<String>,
    pub completed_at: Option<String>,
}

impl RequestRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            control_number: row.get("control_number")?,
            category: row.get("category")?,
            tool: row.get("tool")?,
            nature: row.get("nature")?,
            details: row.get("details")?,
            line: row.get("line")?,
            requested_for: row.get("requested_for")?,
            requester_id: row.get("requester_id")?,
            status: row.get("status")?,
            current_stage: row.get("current_stage")?,
            assignee_id: row.get("assignee_id")?,
            action_taken: row.get("action_taken")?,
            created_at: row.get("created_at")?,
            received_at: row.get("received_at")?,
            target_date: row.get("target_date")?,
            target_date_reason: row.get("target_date_reason")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Query filter parameters for request listing.
#[derive(Debug, Default, Clone)]
pub struct RequestFilter {
    pub status: Option<String>,
    pub category: Option<String>,
    pub requester_id: Option<i64>,
    pub assignee_id: Option<i64>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Allocates the next control number for a category by bumping its
/// counter row. Must run inside the submission transaction so numbers
/// are unique per category.
pub fn next_control_number(
    conn: &Connection,
    category: &str,
    prefix: char,
) -> Result<String, DatabaseError> {
    let value: i64 = conn.query_row(
        "INSERT INTO control_counters (category, last_value) VALUES (?1, 1)
         ON CONFLICT(category) DO UPDATE SET last_value = last_value + 1
         RETURNING last_value",
        params![category],
        |r| r.get(0),
    )?;
    Ok(format!("{}-{:04}", prefix, value))
}

/// Inserts a new request row. `id` on the argument is ignored; the
/// assigned rowid is returned.
pub fn insert(conn: &Connection, request: &RequestRow) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO requests (control_number, category, tool, nature, details, line,
         requested_for, requester_id, status, current_stage, assignee_id, action_taken,
         created_at, received_at, target_date, target_date_reason, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            request.control_number,
            request.category,
            request.tool,
            request.nature,
            request.details,
            request.line,
            request.requested_for,
            request.requester_id,
            request.status,
            request.current_stage,
            request.assignee_id,
            request.action_taken,
            request.created_at,
            request.received_at,
            request.target_date,
            request.target_date_reason,
            request.completed_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Finds a request by its id.
pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<RequestRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM requests WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], RequestRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Finds a request by its control number.
pub fn find_by_control_number(
    conn: &Connection,
    control_number: &str,
) -> Result<Option<RequestRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM requests WHERE control_number = ?1")?;
    let mut rows = stmt.query_map(params![control_number], RequestRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Updates the status and workflow pointer of a request.
pub fn update_status(
    conn: &Connection,
    id: i64,
    status: &str,
    current_stage: i64,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE requests SET status = ?2, current_stage = ?3 WHERE id = ?1",
        params![id, status, current_stage],
    )?;
    Ok(())
}

/// Records the execution owner and the hand-over timestamp.
pub fn set_assignment(
    conn: &Connection,
    id: i64,
    assignee_id: i64,
    received_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE requests SET assignee_id = ?2, received_at = ?3 WHERE id = ?1",
        params![id, assignee_id, received_at],
    )?;
    Ok(())
}

/// Sets the target completion date and its justification.
pub fn set_target(
    conn: &Connection,
    id: i64,
    target_date: &str,
    reason: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE requests SET target_date = ?2, target_date_reason = ?3 WHERE id = ?1",
        params![id, target_date, reason],
    )?;
    Ok(())
}

/// Records the executed work and its completion timestamp.
pub fn set_completion(
    conn: &Connection,
    id: i64,
    action_taken: &str,
    completed_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE requests SET action_taken = ?2, completed_at = ?3 WHERE id = ?1",
        params![id, action_taken, completed_at],
    )?;
    Ok(())
}

/// Clears the completion timestamp after a checker send-back. The
/// recorded action is kept for the rework round.
pub fn clear_completion(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE requests SET completed_at = NULL WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

/// Queries requests with filters, returning (rows, total_count).
pub fn query(
    conn: &Connection,
    filter: &RequestFilter,
) -> Result<(Vec<RequestRow>, u64), DatabaseError> {
    let mut conditions = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref status) = filter.status {
        conditions.push(format!("status = ?{}", param_values.len() + 1));
        param_values.push(Box::new(status.clone()));
    }
    if let Some(ref category) = filter.category {
        conditions.push(format!("category = ?{}", param_values.len() + 1));
        param_values.push(Box::new(category.clone()));
    }
    if let Some(requester_id) = filter.requester_id {
        conditions.push(format!("requester_id = ?{}", param_values.len() + 1));
        param_values.push(Box::new(requester_id));
    }
    if let Some(assignee_id) = filter.assignee_id {
        conditions.push(format!("assignee_id = ?{}", param_values.len() + 1));
        param_values.push(Box::new(assignee_id));
    }
    if let Some(ref from_date) = filter.from_date {
        conditions.push(format!("created_at >= ?{}", param_values.len() + 1));
        param_values.push(Box::new(from_date.clone()));
    }
    if let Some(ref to_date) = filter.to_date {
        conditions.push(format!("created_at <= ?{}", param_values.len() + 1));
        param_values.push(Box::new(to_date.clone()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    // Count total matching rows.
    let count_sql = format!("SELECT COUNT(*) FROM requests {}", where_clause);
    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

    // Fetch paginated results.
    let limit = filter.limit.unwrap_or(100) as i64;
    let offset = filter.offset.unwrap_or(0) as i64;
    param_values.push(Box::new(limit));
    param_values.push(Box::new(offset));
    let query_sql = format!(
        "SELECT * FROM requests {} ORDER BY created_at DESC, id DESC LIMIT ?{} OFFSET ?{}",
        where_clause,
        param_values.len() - 1,
        param_values.len()
    );

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&query_sql)?;
    let rows: Vec<RequestRow> = stmt
        .query_map(params_ref.as_slice(), RequestRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((rows, total))
}

/// Counts requests with the given status.
pub fn count_by_status(conn: &Connection, status: &str) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row(
        "SELECT COUNT(*) FROM requests WHERE status = ?1",
        params![status],
        |r| r.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{user_repo, Database};

    fn test_db() -> (Database, i64) {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let user = db
            .with_conn(|conn| user_repo::insert(conn, "req", "Requester", None))
            .unwrap();
        (db, user)
    }

    fn sample_request(requester_id: i64, control_number: &str) -> RequestRow {
        RequestRow {
            id: 0,
            control_number: control_number.to_string(),
            category: "green".to_string(),
            tool: "Press jig #3".to_string(),
            nature: "repair".to_string(),
            details: "Guide rail misaligned".to_string(),
            line: "Line 2".to_string(),
            requested_for: "R. Garcia".to_string(),
            requester_id,
            status: "Routing".to_string(),
            current_stage: 1,
            assignee_id: None,
            action_taken: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            received_at: None,
            target_date: None,
            target_date_reason: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let (db, user) = test_db();
        db.with_conn(|conn| {
            let id = insert(conn, &sample_request(user, "G-0001"))?;
            let found = find_by_id(conn, id)?.unwrap();
            assert_eq!(found.control_number, "G-0001");
            assert_eq!(found.status, "Routing");
            assert_eq!(found.current_stage, 1);

            let by_cn = find_by_control_number(conn, "G-0001")?.unwrap();
            assert_eq!(by_cn.id, id);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_find_nonexistent() {
        let (db, _) = test_db();
        db.with_conn(|conn| {
            assert!(find_by_id(conn, 42)?.is_none());
            assert!(find_by_control_number(conn, "G-9999")?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_control_numbers_count_per_category() {
        let (db, _) = test_db();
        db.with_conn(|conn| {
            assert_eq!(next_control_number(conn, "green", 'G')?, "G-0001");
            assert_eq!(next_control_number(conn, "green", 'G')?, "G-0002");
            assert_eq!(next_control_number(conn, "yellow", 'Y')?, "Y-0001");
            assert_eq!(next_control_number(conn, "green", 'G')?, "G-0003");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_update_status() {
        let (db, user) = test_db();
        db.with_conn(|conn| {
            let id = insert(conn, &sample_request(user, "G-0001"))?;
            update_status(conn, id, "Completed", 7)?;
            let found = find_by_id(conn, id)?.unwrap();
            assert_eq!(found.status, "Completed");
            assert_eq!(found.current_stage, 7);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_assignment_and_completion() {
        let (db, user) = test_db();
        db.with_conn(|conn| {
            let owner = user_repo::insert(conn, "mnt", "Maintenance", None)?;
            let id = insert(conn, &sample_request(user, "G-0001"))?;

            set_assignment(conn, id, owner, "2026-01-02T08:00:00Z")?;
            set_target(conn, id, "2026-01-10", "Waiting for spare parts")?;
            set_completion(conn, id, "Rail realigned", "2026-01-05T12:00:00Z")?;

            let found = find_by_id(conn, id)?.unwrap();
            assert_eq!(found.assignee_id, Some(owner));
            assert_eq!(found.received_at.as_deref(), Some("2026-01-02T08:00:00Z"));
            assert_eq!(found.target_date.as_deref(), Some("2026-01-10"));
            assert_eq!(
                found.target_date_reason.as_deref(),
                Some("Waiting for spare parts")
            );
            assert_eq!(found.action_taken.as_deref(), Some("Rail realigned"));
            assert!(found.completed_at.is_some());

            // Send-back clears the timestamp but keeps the recorded action.
            clear_completion(conn, id)?;
            let found = find_by_id(conn, id)?.unwrap();
            assert!(found.completed_at.is_none());
            assert_eq!(found.action_taken.as_deref(), Some("Rail realigned"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_query_with_filters() {
        let (db, user) = test_db();
        db.with_conn(|conn| {
            insert(conn, &sample_request(user, "G-0001"))?;

            let mut yellow = sample_request(user, "Y-0001");
            yellow.category = "yellow".to_string();
            yellow.status = "Closed".to_string();
            insert(conn, &yellow)?;

            let (rows, total) = query(conn, &RequestFilter::default())?;
            assert_eq!(total, 2);
            assert_eq!(rows.len(), 2);

            let (rows, total) = query(
                conn,
                &RequestFilter {
                    status: Some("Closed".to_string()),
                    ..Default::default()
                },
            )?;
            assert_eq!(total, 1);
            assert_eq!(rows[0].control_number, "Y-0001");

            let (rows, total) = query(
                conn,
                &RequestFilter {
                    category: Some("green".to_string()),
                    ..Default::default()
                },
            )?;
            assert_eq!(total, 1);
            assert_eq!(rows[0].control_number, "G-0001");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_query_pagination() {
        let (db, user) = test_db();
        db.with_conn(|conn| {
            for i in 0..10 {
                let mut request = sample_request(user, &format!("G-{:04}", i + 1));
                request.created_at = format!("2026-01-{:02}T00:00:00Z", i + 1);
                insert(conn, &request)?;
            }

            let (rows, total) = query(
                conn,
                &RequestFilter {
                    limit: Some(3),
                    offset: Some(0),
                    ..Default::default()
                },
            )?;
            assert_eq!(total, 10);
            assert_eq!(rows.len(), 3);
            // Newest first.
            assert_eq!(rows[0].control_number, "G-0010");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_count_by_status() {
        let (db, user) = test_db();
        db.with_conn(|conn| {
            insert(conn, &sample_request(user, "G-0001"))?;
            insert(conn, &sample_request(user, "G-0002"))?;
            let mut rejected = sample_request(user, "G-0003");
            rejected.status = "Rejected".to_string();
            insert(conn, &rejected)?;

            assert_eq!(count_by_status(conn, "Routing")?, 2);
            assert_eq!(count_by_status(conn, "Rejected")?, 1);
            assert_eq!(count_by_status(conn, "Closed")?, 0);
            Ok(())
        })
        .unwrap();
    }
}
