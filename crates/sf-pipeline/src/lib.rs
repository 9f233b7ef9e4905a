//! # sf-pipeline
//!
//! Stage execution for the transcription pipeline.
//!
//! This crate provides:
//!
//! - **[`StageExecutor`]** trait -- one pipeline stage with validate / execute
//!   semantics.
//! - **[`StageContext`]** -- per-task context (request, artifact layout,
//!   cancellation).
//! - **Built-in stages** ([`stages`]) -- subtitle extraction, audio
//!   extraction and configurable command stages.
//! - **[`plan`]** -- the stage-order policy and subtitle fallback rule.
//! - **[`build_executors`]** -- factory that builds the executor set from
//!   [`PipelineConfig`](sf_core::config::PipelineConfig).

pub mod context;
pub mod executor;
pub mod factory;
pub mod plan;
pub mod stages;

// Re-export key types at the crate root.
pub use context::{StageContext, StageRequest};
pub use executor::{run_stage, ExecutorSet, StageExecutor};
pub use factory::build_executors;
