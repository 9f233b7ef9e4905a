//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order.  A
//! `schema_migrations` table tracks which versions have been applied.

use rusqlite::Connection;
use sf_core::{Error, Result};

/// V1: the fingerprint store and the task ledger.
const V1_INITIAL: &str = r#"
-- One row per content fingerprint
CREATE TABLE files (
    fingerprint   TEXT PRIMARY KEY,
    status        TEXT NOT NULL CHECK (status IN ('in_progress', 'succeeded', 'failed')),
    current_stage TEXT,
    plan          TEXT NOT NULL,
    source_ref    TEXT NOT NULL,
    error         TEXT,
    stage_seq     INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

-- One row per dispatched task handle; append-only history
CREATE TABLE tasks (
    id          TEXT PRIMARY KEY,
    fingerprint TEXT NOT NULL REFERENCES files(fingerprint) ON DELETE CASCADE,
    stage       TEXT NOT NULL,
    seq         INTEGER NOT NULL,
    created_at  TEXT NOT NULL,
    resolved_at TEXT,
    outcome     TEXT,
    output_ref  TEXT,
    error       TEXT
);

-- At most one live (unresolved) task per fingerprint
CREATE UNIQUE INDEX idx_tasks_live ON tasks(fingerprint) WHERE resolved_at IS NULL;

-- The stage counter never repeats for a fingerprint
CREATE UNIQUE INDEX idx_tasks_seq ON tasks(fingerprint, seq);
"#;

/// V2: lookup indexes for maintenance and output queries.
const V2_INDEXES: &str = r#"
CREATE INDEX idx_files_status ON files(status);
CREATE INDEX idx_tasks_stage ON tasks(fingerprint, stage, outcome);
"#;

/// Ordered list of (version, sql) pairs.
const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL), (2, V2_INDEXES)];

/// Run all pending migrations on `conn`.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        tx.commit()
            .map_err(|e| Error::database(e.to_string()))?;

        tracing::info!(version, "Applied ledger migration");
    }

    Ok(())
}

/// Highest applied migration version, or 0 on a fresh database.
pub fn current_version(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        // second call is a no-op
        run_migrations(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 2);
    }

    #[test]
    fn test_all_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();

        for t in ["files", "tasks", "schema_migrations"] {
            let exists: bool = conn
                .query_row(
                    "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                    [t],
                    |row| row.get(0),
                )
                .unwrap();
            assert!(exists, "table {t} should exist");
        }
    }

    #[test]
    fn test_live_index_rejects_second_live_task() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO files (fingerprint, status, plan, source_ref, created_at, updated_at)
             VALUES ('xyz', 'in_progress', 'speech_to_text', 'src', 't', 't');
             INSERT INTO tasks (id, fingerprint, stage, seq, created_at)
             VALUES ('a', 'xyz', 'extract_audio', 1, 't');",
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO tasks (id, fingerprint, stage, seq, created_at)
             VALUES ('b', 'xyz', 'extract_audio', 2, 't')",
            [],
        );
        assert!(dup.is_err());

        // Once resolved, a new live task is allowed.
        conn.execute("UPDATE tasks SET resolved_at = 't' WHERE id = 'a'", [])
            .unwrap();
        conn.execute(
            "INSERT INTO tasks (id, fingerprint, stage, seq, created_at)
             VALUES ('b', 'xyz', 'extract_audio', 2, 't')",
            [],
        )
        .unwrap();
    }
}
