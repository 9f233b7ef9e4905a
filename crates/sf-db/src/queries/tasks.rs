//! Task ledger: one row per dispatched task handle.
//!
//! A task is live until `resolve` stamps `resolved_at`. The partial unique
//! index `idx_tasks_live` guarantees at most one live task per fingerprint,
//! so `register` is a register-if-no-live-task conditional write.

use chrono::Utc;
use rusqlite::{Connection, ErrorCode};
use sf_core::{Error, Fingerprint, Result, Stage, TaskId, TaskOutcome};

use crate::models::TaskRecord;

const COLS: &str = "id, fingerprint, stage, seq, created_at, resolved_at, outcome,
    output_ref, error";

/// Record a new live task for `fp`.
///
/// Fails with [`Error::Conflict`] if a live task already exists for the
/// fingerprint or `seq` was already used.
pub fn register(
    conn: &Connection,
    id: TaskId,
    fp: &Fingerprint,
    stage: Stage,
    seq: i64,
) -> Result<TaskRecord> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO tasks (id, fingerprint, stage, seq, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![id.to_string(), fp.as_str(), stage.as_str(), seq, &now],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if err.code == ErrorCode::ConstraintViolation =>
        {
            Error::Conflict(format!("live task already registered for {fp}"))
        }
        other => Error::database(other.to_string()),
    })?;

    Ok(TaskRecord {
        id,
        fingerprint: fp.clone(),
        stage,
        seq,
        created_at: now,
        resolved_at: None,
        outcome: None,
        output_ref: None,
        error: None,
    })
}

/// Remove a task from the live set, keeping its row as history.
///
/// Returns `false` if the task was already resolved or never existed.
pub fn resolve(
    conn: &Connection,
    id: TaskId,
    outcome: TaskOutcome,
    output_ref: Option<&str>,
    error: Option<&str>,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE tasks SET resolved_at = ?1, outcome = ?2, output_ref = ?3, error = ?4
             WHERE id = ?5 AND resolved_at IS NULL",
            rusqlite::params![&now, outcome.as_str(), output_ref, error, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Get a task by handle, live or resolved.
pub fn get(conn: &Connection, id: TaskId) -> Result<Option<TaskRecord>> {
    let q = format!("SELECT {COLS} FROM tasks WHERE id = ?1");
    query_opt(conn, &q, [id.to_string()])
}

/// The live task for `fp`, if any.
pub fn find_live_task(conn: &Connection, fp: &Fingerprint) -> Result<Option<TaskRecord>> {
    let q = format!("SELECT {COLS} FROM tasks WHERE fingerprint = ?1 AND resolved_at IS NULL");
    query_opt(conn, &q, [fp.as_str()])
}

/// Reverse lookup from a task handle to the fingerprint it was dispatched for.
pub fn find_fingerprint(conn: &Connection, id: TaskId) -> Result<Option<Fingerprint>> {
    Ok(get(conn, id)?.map(|t| t.fingerprint))
}

/// Most recent successful task for `stage`, by stage counter.
pub fn latest_succeeded(
    conn: &Connection,
    fp: &Fingerprint,
    stage: Stage,
) -> Result<Option<TaskRecord>> {
    let q = format!(
        "SELECT {COLS} FROM tasks
         WHERE fingerprint = ?1 AND stage = ?2 AND outcome = 'succeeded'
         ORDER BY seq DESC LIMIT 1"
    );
    query_opt(conn, &q, [fp.as_str(), stage.as_str()])
}

/// Latest output reference of every stage that produced one.
pub fn outputs(conn: &Connection, fp: &Fingerprint) -> Result<Vec<(Stage, String)>> {
    let mut out = Vec::new();
    for stage in Stage::ALL {
        if let Some(output) = latest_succeeded(conn, fp, stage)?.and_then(|t| t.output_ref) {
            out.push((stage, output));
        }
    }
    Ok(out)
}

/// Every live task, oldest first.
pub fn list_live(conn: &Connection) -> Result<Vec<TaskRecord>> {
    let q = format!("SELECT {COLS} FROM tasks WHERE resolved_at IS NULL ORDER BY created_at ASC");
    query_all(conn, &q, [])
}

/// Full task history of `fp` in dispatch order.
pub fn history(conn: &Connection, fp: &Fingerprint) -> Result<Vec<TaskRecord>> {
    let q = format!("SELECT {COLS} FROM tasks WHERE fingerprint = ?1 ORDER BY seq ASC");
    query_all(conn, &q, [fp.as_str()])
}

fn query_opt<P: rusqlite::Params>(conn: &Connection, q: &str, params: P) -> Result<Option<TaskRecord>> {
    match conn.query_row(q, params, TaskRecord::from_row) {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

fn query_all<P: rusqlite::Params>(conn: &Connection, q: &str, params: P) -> Result<Vec<TaskRecord>> {
    let mut stmt = conn.prepare(q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(params, TaskRecord::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}
