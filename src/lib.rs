//! Scribeforge - content-addressed media-to-text pipeline
//!
//! This library crate exposes the orchestration core for the binary and for
//! integration testing.

pub mod broker;
pub mod config;
pub mod ingest;
pub mod orchestrator;
pub mod reconciler;
pub mod runtime;
pub mod watch;
