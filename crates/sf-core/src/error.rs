//! Unified error type for the scribeforge ledger and pipeline.
//!
//! All crates funnel their failures into [`Error`]. Orchestration code uses
//! [`Error::is_stale_notification`] to tell harmless duplicate or late
//! notifications apart from real failures.

use std::fmt;

use crate::ids::TaskId;

/// Unified error type covering all failure modes in scribeforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "file", "task").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// A conditional write lost against an existing record or live task.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A completion or poll referenced a task that is not live.
    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),

    /// A stage executor reported a failure.
    #[error("Stage error [{stage}]: {message}")]
    StageExecution {
        /// The stage that failed.
        stage: String,
        /// Human-readable error description.
        message: String,
    },

    /// A live task exceeded its deadline.
    #[error("Stage {stage} timed out after {elapsed_secs}s")]
    Timeout {
        /// The stage whose task expired.
        stage: String,
        /// Seconds elapsed since the task was dispatched.
        elapsed_secs: u64,
    },

    /// Input or configuration failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, whisper, etc.) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error describes a stale, duplicate, or late notification
    /// that callers should treat as a no-op.
    pub fn is_stale_notification(&self) -> bool {
        matches!(self, Error::UnknownTask(_) | Error::NotFound { .. })
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::StageExecution`].
    pub fn stage(stage: impl fmt::Display, message: impl Into<String>) -> Self {
        Error::StageExecution {
            stage: stage.to_string(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
