//! # sf-av
//!
//! External tool plumbing for the scribeforge stage executors.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg,
//!   ffprobe, and the configured vocal isolation and transcription programs.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   and cancellation support for running external processes.
//! - **Staged outputs** ([`StagedOutput`]) -- scratch space next to an
//!   artifact with atomic finalization.
//! - **Probing** ([`probe`]) -- subtitle stream discovery via ffprobe.
//! - **Action functions** ([`actions`]) -- audio extraction, subtitle
//!   extraction, and templated command execution.

pub mod actions;
pub mod command;
pub mod probe;
pub mod staging;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use probe::SubtitleStream;
pub use staging::StagedOutput;
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};

pub use actions::{exec_command, extract_audio, extract_subtitle, render_args};
