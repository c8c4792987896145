//! Dashboard statistics repository — aggregate queries over requests.
//!
//! Read-only: nothing here mutates workflow state. Rows serialize with
//! camelCase keys for the JSON widget consumers.

use chrono::{DateTime, Datelike, Duration, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use super::user_repo;
use super::DatabaseError;

const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Request count for one status value.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

/// Request counts grouped by status.
pub fn status_summary(conn: &Connection) -> Result<Vec<StatusCount>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT status, COUNT(*) FROM requests GROUP BY status ORDER BY status")?;
    let rows: Vec<StatusCount> = stmt
        .query_map([], |row| {
            Ok(StatusCount {
                status: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// One month of the created/completed trend.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyTrendRow {
    pub label: String,
    pub total: i64,
    pub completed: i64,
}

/// Created and completed request counts per month for the trailing
/// `months` months ending at `until` (inclusive of its month).
pub fn monthly_trend(
    conn: &Connection,
    months: u32,
    until: DateTime<Utc>,
) -> Result<Vec<MonthlyTrendRow>, DatabaseError> {
    let mut year = until.year();
    let mut month = until.month() as i32 - (months as i32 - 1);
    while month < 1 {
        month += 12;
        year -= 1;
    }

    let mut rows = Vec::with_capacity(months as usize);
    for _ in 0..months {
        let start = format!("{:04}-{:02}-01", year, month);
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        let end = format!("{:04}-{:02}-01", next_year, next_month);

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM requests WHERE created_at >= ?1 AND created_at < ?2",
            params![start, end],
            |r| r.get(0),
        )?;
        let completed: i64 = conn.query_row(
            "SELECT COUNT(*) FROM requests
             WHERE created_at >= ?1 AND created_at < ?2 AND completed_at IS NOT NULL",
            params![start, end],
            |r| r.get(0),
        )?;

        rows.push(MonthlyTrendRow {
            label: MONTH_LABELS[(month - 1) as usize].to_string(),
            total,
            completed,
        });
        year = next_year;
        month = next_month;
    }

    Ok(rows)
}

/// Active load of one maintenance designee.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadRow {
    pub user_id: i64,
    pub name: String,
    pub active_requests: i64,
    pub workload_pct: i64,
}

/// Active request count per maintenance designee, as a percentage of
/// `capacity`. Active means assigned and not yet checked or closed.
pub fn maintenance_workload(
    conn: &Connection,
    capacity: u32,
) -> Result<Vec<WorkloadRow>, DatabaseError> {
    let staff = user_repo::designees(conn, user_repo::MODULE_JOB_ORDER, user_repo::ROLE_MAINTENANCE)?;

    let mut rows = Vec::with_capacity(staff.len());
    for member in staff {
        let active: i64 = conn.query_row(
            "SELECT COUNT(*) FROM requests
             WHERE assignee_id = ?1 AND status IN ('Routing', 'Completed')",
            params![member.id],
            |r| r.get(0),
        )?;
        let pct = if capacity == 0 {
            0
        } else {
            ((active * 100) / capacity as i64).min(100)
        };
        rows.push(WorkloadRow {
            user_id: member.id,
            name: member.name,
            active_requests: active,
            workload_pct: pct,
        });
    }
    Ok(rows)
}

/// An open request approaching (or past) its target date.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadlineRow {
    pub request_id: i64,
    pub control_number: String,
    pub assignee_id: Option<i64>,
    pub target_date: String,
    pub status: String,
}

/// Open requests whose target date falls within `within_days` of `now`,
/// soonest first.
pub fn upcoming_deadlines(
    conn: &Connection,
    within_days: i64,
    now: DateTime<Utc>,
) -> Result<Vec<DeadlineRow>, DatabaseError> {
    let from = now.format("%Y-%m-%d").to_string();
    let to = (now + Duration::days(within_days)).format("%Y-%m-%d").to_string();

    let mut stmt = conn.prepare(
        "SELECT id, control_number, assignee_id, target_date, status
         FROM requests
         WHERE target_date IS NOT NULL
           AND status IN ('Routing', 'Completed')
           AND target_date >= ?1 AND target_date <= ?2
         ORDER BY target_date ASC, id ASC",
    )?;
    let rows: Vec<DeadlineRow> = stmt
        .query_map(params![from, to], |row| {
            Ok(DeadlineRow {
                request_id: row.get(0)?,
                control_number: row.get(1)?,
                assignee_id: row.get(2)?,
                target_date: row.get(3)?,
                status: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Number of open requests whose target date has passed.
pub fn overdue_count(conn: &Connection, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
    let today = now.format("%Y-%m-%d").to_string();
    let count: u64 = conn.query_row(
        "SELECT COUNT(*) FROM requests
         WHERE target_date IS NOT NULL
           AND status IN ('Routing', 'Completed')
           AND target_date < ?1",
        params![today],
        |r| r.get(0),
    )?;
    Ok(count)
}
