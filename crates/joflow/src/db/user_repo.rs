//! User directory — users, configured approvers, and ordered role designees.
//!
//! Approver/checker lookups are per-user (`approver_assignments`);
//! facilitator and maintenance lookups resolve through the ordered
//! `role_designees` table so the result is deterministic.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;

/// Module tag written by this crate. The directory schema is shared with
/// the other portal modules; only this tag is read here.
pub const MODULE_JOB_ORDER: &str = "job-order";

pub const ROLE_APPROVER: &str = "approver";
pub const ROLE_CHECKER: &str = "checker";
pub const ROLE_FACILITATOR: &str = "facilitator";
pub const ROLE_MAINTENANCE: &str = "maintenance";

/// A user row from the directory.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub position: Option<String>,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            name: row.get("name")?,
            position: row.get("position")?,
        })
    }
}

/// Inserts a user and returns the assigned id.
pub fn insert(
    conn: &Connection,
    username: &str,
    name: &str,
    position: Option<&str>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO users (username, name, position) VALUES (?1, ?2, ?3)",
        params![username, name, position],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Finds a user by id.
pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id, username, name, position FROM users WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], UserRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Finds a user by username.
pub fn find_by_username(
    conn: &Connection,
    username: &str,
) -> Result<Option<UserRow>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT id, username, name, position FROM users WHERE username = ?1")?;
    let mut rows = stmt.query_map(params![username], UserRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Configures `approver_id` as the `role` counterpart for `user_id`
/// within `module`. Replaces any existing assignment.
pub fn set_approver(
    conn: &Connection,
    user_id: i64,
    module: &str,
    role: &str,
    approver_id: i64,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO approver_assignments (user_id, module, role, approver_id)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, module, role) DO UPDATE SET approver_id = excluded.approver_id",
        params![user_id, module, role, approver_id],
    )?;
    Ok(())
}

/// The configured approver (or checker) for a user, if any.
pub fn approver_for(
    conn: &Connection,
    user_id: i64,
    module: &str,
    role: &str,
) -> Result<Option<UserRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, u.name, u.position
         FROM users u
         JOIN approver_assignments a ON a.approver_id = u.id
         WHERE a.user_id = ?1 AND a.module = ?2 AND a.role = ?3",
    )?;
    let mut rows = stmt.query_map(params![user_id, module, role], UserRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Adds a user to the ordered designee list for a module role.
pub fn add_designee(
    conn: &Connection,
    module: &str,
    role: &str,
    user_id: i64,
    rank: i64,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO role_designees (module, role, user_id, rank)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(module, role, user_id) DO UPDATE SET rank = excluded.rank",
        params![module, role, user_id, rank],
    )?;
    Ok(())
}

/// The lowest-ranked designee for a module role. Ties break on user id,
/// so resolution is total and deterministic.
pub fn first_designee(
    conn: &Connection,
    module: &str,
    role: &str,
) -> Result<Option<UserRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, u.name, u.position
         FROM users u
         JOIN role_designees d ON d.user_id = u.id
         WHERE d.module = ?1 AND d.role = ?2
         ORDER BY d.rank ASC, u.id ASC
         LIMIT 1",
    )?;
    let mut rows = stmt.query_map(params![module, role], UserRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// All designees for a module role, in rank order.
pub fn designees(
    conn: &Connection,
    module: &str,
    role: &str,
) -> Result<Vec<UserRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, u.name, u.position
         FROM users u
         JOIN role_designees d ON d.user_id = u.id
         WHERE d.module = ?1 AND d.role = ?2
         ORDER BY d.rank ASC, u.id ASC",
    )?;
    let rows: Vec<UserRow> = stmt
        .query_map(params![module, role], UserRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Whether a user appears in the designee list for a module role.
pub fn is_designee(
    conn: &Connection,
    module: &str,
    role: &str,
    user_id: i64,
) -> Result<bool, DatabaseError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM role_designees
             WHERE module = ?1 AND role = ?2 AND user_id = ?3)",
        params![module, role, user_id],
        |r| r.get(0),
    )?;
    Ok(exists)
}
