//! Database query modules.
//!
//! Every function takes a plain `&Connection`, so callers can run several of
//! them inside one transaction.

pub mod files;
pub mod maintenance;
pub mod tasks;
