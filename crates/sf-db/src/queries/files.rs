//! Fingerprint store: one lifecycle record per content fingerprint.
//!
//! `create` is the dedup gate (create-if-absent). Every other write targets an
//! existing record and fails with [`Error::NotFound`] when there is none.

use chrono::Utc;
use rusqlite::Connection;
use sf_core::{Error, FileStatus, Fingerprint, Result, Stage, StagePlan};

use crate::models::FileRecord;

const COLS: &str = "fingerprint, status, current_stage, plan, source_ref, error,
    stage_seq, created_at, updated_at";

/// Get the record for `fp`; `None` means the fingerprint is absent.
pub fn lookup(conn: &Connection, fp: &Fingerprint) -> Result<Option<FileRecord>> {
    let q = format!("SELECT {COLS} FROM files WHERE fingerprint = ?1");
    let result = conn.query_row(&q, [fp.as_str()], FileRecord::from_row);
    match result {
        Ok(f) => Ok(Some(f)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Atomically create a record if none exists.
///
/// Returns `false` without touching the existing row when `fp` is already
/// present.
pub fn create(
    conn: &Connection,
    fp: &Fingerprint,
    initial_status: FileStatus,
    plan: StagePlan,
    source_ref: &str,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "INSERT OR IGNORE INTO files
                (fingerprint, status, plan, source_ref, stage_seq, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
            rusqlite::params![fp.as_str(), initial_status.as_str(), plan.as_str(), source_ref, &now],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Set the lifecycle status. Any status other than `failed` clears the
/// stored reason.
pub fn set_status(conn: &Connection, fp: &Fingerprint, status: FileStatus) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE files
             SET status = ?1,
                 error = CASE WHEN ?1 = 'failed' THEN error ELSE NULL END,
                 updated_at = ?2
             WHERE fingerprint = ?3",
            rusqlite::params![status.as_str(), &now, fp.as_str()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    expect_one(n, fp)
}

/// Move the record to `stage` and bump its stage counter.
///
/// Returns the new counter value, which the caller copies onto the task it
/// registers for this stage.
pub fn advance(conn: &Connection, fp: &Fingerprint, stage: Stage) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    let result = conn.query_row(
        "UPDATE files
         SET status = 'in_progress', current_stage = ?1, error = NULL,
             stage_seq = stage_seq + 1, updated_at = ?2
         WHERE fingerprint = ?3
         RETURNING stage_seq",
        rusqlite::params![stage.as_str(), &now, fp.as_str()],
        |row| row.get(0),
    );
    match result {
        Ok(seq) => Ok(seq),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::not_found("file", fp)),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Terminal success: no stage owns the record any more.
pub fn mark_succeeded(conn: &Connection, fp: &Fingerprint) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE files
             SET status = 'succeeded', current_stage = NULL, error = NULL, updated_at = ?1
             WHERE fingerprint = ?2",
            rusqlite::params![&now, fp.as_str()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    expect_one(n, fp)
}

/// Terminal failure with a reason. `current_stage` is kept to show which
/// stage failed.
pub fn mark_failed(conn: &Connection, fp: &Fingerprint, reason: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE files SET status = 'failed', error = ?1, updated_at = ?2
             WHERE fingerprint = ?3",
            rusqlite::params![reason, &now, fp.as_str()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    expect_one(n, fp)
}

/// Replace the plan and source of an existing record before a reprocess.
pub fn restart(conn: &Connection, fp: &Fingerprint, plan: StagePlan, source_ref: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE files
             SET status = 'in_progress', plan = ?1, source_ref = ?2, current_stage = NULL,
                 error = NULL, updated_at = ?3
             WHERE fingerprint = ?4",
            rusqlite::params![plan.as_str(), source_ref, &now, fp.as_str()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    expect_one(n, fp)
}

/// List records, optionally filtered by status, most recently updated first.
pub fn list(conn: &Connection, status: Option<FileStatus>) -> Result<Vec<FileRecord>> {
    let q = format!(
        "SELECT {COLS} FROM files
         WHERE (?1 IS NULL OR status = ?1)
         ORDER BY updated_at DESC"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([status.map(|s| s.as_str())], FileRecord::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

fn expect_one(n: usize, fp: &Fingerprint) -> Result<()> {
    if n == 0 {
        Err(Error::not_found("file", fp))
    } else {
        Ok(())
    }
}
