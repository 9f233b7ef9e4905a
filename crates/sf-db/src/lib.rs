//! sf-db: ledger persistence layer.
//!
//! This crate provides SQLite-backed storage with connection pooling,
//! embedded migrations, typed models, and the two stores the orchestrator
//! coordinates: the fingerprint store ([`queries::files`]) and the task
//! ledger ([`queries::tasks`]).

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
