//! Routing step repository — the per-request approval chain rows.
//!
//! The step with status `Processing` is the workflow pointer; superseded
//! steps are frozen and never mutated again, except for the checker
//! send-back which reopens the execution step.

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::DatabaseError;

/// A raw routing step row from the database.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingStepRow {
    pub id: i64,
    pub request_id: i64,
    pub actor_id: i64,
    pub stage: i64,
    pub status: String,
    pub remarks: String,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl RoutingStepRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            request_id: row.get("request_id")?,
            actor_id: row.get("actor_id")?,
            stage: row.get("stage")?,
            status: row.get("status")?,
            remarks: row.get("remarks")?,
            created_at: row.get("created_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// One entry of an actor's approval queue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub step_id: i64,
    pub request_id: i64,
    pub control_number: String,
    pub category: String,
    pub request_status: String,
    pub stage: i64,
    pub created_at: String,
}

/// Appends a routing step and returns the created row.
pub fn insert(
    conn: &Connection,
    request_id: i64,
    actor_id: i64,
    stage: i64,
    status: &str,
    created_at: &str,
) -> Result<RoutingStepRow, DatabaseError> {
    conn.execute(
        "INSERT INTO routing_steps (request_id, actor_id, stage, status, remarks, created_at)
         VALUES (?1, ?2, ?3, ?4, '', ?5)",
        params![request_id, actor_id, stage, status, created_at],
    )?;
    Ok(RoutingStepRow {
        id: conn.last_insert_rowid(),
        request_id,
        actor_id,
        stage,
        status: status.to_string(),
        remarks: String::new(),
        created_at: created_at.to_string(),
        completed_at: None,
    })
}

/// Finds a step by its id.
pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<RoutingStepRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM routing_steps WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], RoutingStepRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// The step currently holding the workflow pointer, if any.
pub fn current_step(
    conn: &Connection,
    request_id: i64,
) -> Result<Option<RoutingStepRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM routing_steps WHERE request_id = ?1 AND status = 'Processing'",
    )?;
    let mut rows = stmt.query_map(params![request_id], RoutingStepRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// The `Processing` step held by `actor_id`, the authorization anchor
/// for every workflow mutation.
pub fn holder_step(
    conn: &Connection,
    request_id: i64,
    actor_id: i64,
) -> Result<Option<RoutingStepRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM routing_steps
         WHERE request_id = ?1 AND actor_id = ?2 AND status = 'Processing'",
    )?;
    let mut rows = stmt.query_map(params![request_id, actor_id], RoutingStepRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Finds a step of a request by stage and status.
pub fn find_by_stage(
    conn: &Connection,
    request_id: i64,
    stage: i64,
    status: &str,
) -> Result<Option<RoutingStepRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM routing_steps
         WHERE request_id = ?1 AND stage = ?2 AND status = ?3
         ORDER BY id DESC",
    )?;
    let mut rows = stmt.query_map(params![request_id, stage, status], RoutingStepRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Freezes a step with its final status, remarks, and completion time.
pub fn finish(
    conn: &Connection,
    id: i64,
    status: &str,
    remarks: &str,
    completed_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE routing_steps SET status = ?2, remarks = ?3, completed_at = ?4 WHERE id = ?1",
        params![id, status, remarks, completed_at],
    )?;
    Ok(())
}

/// Reopens a frozen step: back to `Processing` with the completion
/// timestamp cleared. Used by the checker send-back and by re-completion
/// after rework.
pub fn reopen(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE routing_steps SET status = 'Processing', completed_at = NULL WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

/// Marks every open (`Processing` or `Pending`) step of a request as
/// `Cancelled`. Rows are kept: cancellation never erases the audit trail.
pub fn cancel_open_steps(
    conn: &Connection,
    request_id: i64,
    completed_at: &str,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE routing_steps SET status = 'Cancelled', completed_at = ?2
         WHERE request_id = ?1 AND status IN ('Processing', 'Pending')",
        params![request_id, completed_at],
    )?;
    Ok(changed)
}

/// Full routing history of a request, in chain order.
pub fn history(conn: &Connection, request_id: i64) -> Result<Vec<RoutingStepRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM routing_steps WHERE request_id = ?1 ORDER BY stage ASC, id ASC",
    )?;
    let rows: Vec<RoutingStepRow> = stmt
        .query_map(params![request_id], RoutingStepRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Number of routing steps recorded for a request.
pub fn count_for_request(conn: &Connection, request_id: i64) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row(
        "SELECT COUNT(*) FROM routing_steps WHERE request_id = ?1",
        params![request_id],
        |r| r.get(0),
    )?;
    Ok(count)
}

/// An actor's pending approvals, oldest first.
pub fn pending_for_actor(
    conn: &Connection,
    actor_id: i64,
) -> Result<Vec<QueueEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.request_id, r.control_number, r.category, r.status, s.stage, s.created_at
         FROM routing_steps s
         JOIN requests r ON r.id = s.request_id
         WHERE s.actor_id = ?1 AND s.status = 'Processing'
         ORDER BY s.created_at ASC, s.id ASC",
    )?;
    let rows: Vec<QueueEntry> = stmt
        .query_map(params![actor_id], |row| {
            Ok(QueueEntry {
                step_id: row.get(0)?,
                request_id: row.get(1)?,
                control_number: row.get(2)?,
                category: row.get(3)?,
                request_status: row.get(4)?,
                stage: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
