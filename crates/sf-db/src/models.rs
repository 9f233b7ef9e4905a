//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row` selected with the owning query module's `COLS`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sf_core::{FileStatus, Fingerprint, Stage, StagePlan, TaskId, TaskOutcome};
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))?;
    Ok(T::from(uuid))
}

/// Parse a text column through `FromStr`.
fn parse_text<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e| conversion_error(idx, e))
}

fn parse_opt_text<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: Option<String> = row.get(idx)?;
    s.map(|v| v.parse().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

// ---------------------------------------------------------------------------
// FileRecord
// ---------------------------------------------------------------------------

/// One row of the fingerprint store.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub fingerprint: Fingerprint,
    pub status: FileStatus,
    /// Stage owning the record. Kept on failure to show where the run stopped.
    pub current_stage: Option<Stage>,
    pub plan: StagePlan,
    pub source_ref: String,
    /// Human-readable reason, set whenever `status` is `failed`.
    pub error: Option<String>,
    /// Monotonic stage counter, bumped on every task registration.
    pub stage_seq: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl FileRecord {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            fingerprint: parse_text(row, 0)?,
            status: parse_text(row, 1)?,
            current_stage: parse_opt_text(row, 2)?,
            plan: parse_text(row, 3)?,
            source_ref: row.get(4)?,
            error: row.get(5)?,
            stage_seq: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

// ---------------------------------------------------------------------------
// TaskRecord
// ---------------------------------------------------------------------------

/// One row of the task ledger.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub fingerprint: Fingerprint,
    pub stage: Stage,
    /// Value of the owning file's `stage_seq` when this task was registered.
    pub seq: i64,
    pub created_at: String,
    pub resolved_at: Option<String>,
    pub outcome: Option<TaskOutcome>,
    pub output_ref: Option<String>,
    pub error: Option<String>,
}

impl TaskRecord {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            fingerprint: parse_text(row, 1)?,
            stage: parse_text(row, 2)?,
            seq: row.get(3)?,
            created_at: row.get(4)?,
            resolved_at: row.get(5)?,
            outcome: parse_opt_text(row, 6)?,
            output_ref: row.get(7)?,
            error: row.get(8)?,
        })
    }

    /// Whether the outcome of this task has not been applied yet.
    pub fn is_live(&self) -> bool {
        self.resolved_at.is_none()
    }

    /// Whole seconds between dispatch and `now`.
    ///
    /// An unparseable timestamp counts as infinitely old so the task is
    /// timed out rather than left live forever.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        match DateTime::parse_from_rfc3339(&self.created_at) {
            Ok(created) => (now - created.with_timezone(&Utc)).num_seconds().max(0) as u64,
            Err(_) => u64::MAX,
        }
    }
}
