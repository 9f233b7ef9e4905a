//! Ledger-wide maintenance: statistics and wiping rows.

use rusqlite::Connection;
use serde::Serialize;
use sf_core::{Error, Result};
use std::collections::BTreeMap;

/// Row counts across both stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub files: i64,
    pub files_by_status: BTreeMap<String, i64>,
    pub tasks: i64,
    /// Resolved tasks keyed by outcome.
    pub tasks_by_outcome: BTreeMap<String, i64>,
    pub live_tasks: i64,
}

/// Counts per status and outcome.
pub fn stats(conn: &Connection) -> Result<LedgerStats> {
    let files_by_status = grouped(conn, "SELECT status, COUNT(*) FROM files GROUP BY status")?;
    let tasks_by_outcome = grouped(
        conn,
        "SELECT outcome, COUNT(*) FROM tasks WHERE outcome IS NOT NULL GROUP BY outcome",
    )?;
    let live_tasks: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM tasks WHERE resolved_at IS NULL",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(LedgerStats {
        files: files_by_status.values().sum(),
        tasks: tasks_by_outcome.values().sum::<i64>() + live_tasks,
        files_by_status,
        tasks_by_outcome,
        live_tasks,
    })
}

/// Delete every file and task row, keeping the schema.
///
/// Returns the number of (files, tasks) removed.
pub fn clear(conn: &Connection) -> Result<(usize, usize)> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;
    let tasks = tx
        .execute("DELETE FROM tasks", [])
        .map_err(|e| Error::database(e.to_string()))?;
    let files = tx
        .execute("DELETE FROM files", [])
        .map_err(|e| Error::database(e.to_string()))?;
    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok((files, tasks))
}

fn grouped(conn: &Connection, q: &str) -> Result<BTreeMap<String, i64>> {
    let mut stmt = conn.prepare(q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<BTreeMap<_, _>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}
