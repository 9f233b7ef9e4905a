//! sf-core: shared types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for all other sf-* crates,
//! providing content fingerprints and task handles, a unified error type,
//! pipeline-stage enums, the on-disk artifact layout, application
//! configuration, and a broadcast event bus.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod paths;
pub mod stage;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use stage::*;
