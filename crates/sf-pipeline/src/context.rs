//! Request and execution context handed to every stage executor.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sf_core::paths::StoragePaths;
use sf_core::{Fingerprint, Stage, TaskId};
use tokio_util::sync::CancellationToken;

/// What one dispatched task should do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRequest {
    /// Handle the result is reported under.
    pub task: TaskId,
    pub fingerprint: Fingerprint,
    pub stage: Stage,
    /// Output reference of the previous stage, or the source reference for
    /// stages that read the source.
    pub input: String,
}

/// Context passed to an executor for one task.
#[derive(Clone)]
pub struct StageContext {
    pub request: StageRequest,
    /// Artifact layout, used to place this stage's output.
    pub paths: Arc<StoragePaths>,
    /// Cancelled when the task is revoked; executors stop at the next
    /// opportunity.
    pub cancellation: CancellationToken,
}

impl StageContext {
    /// Create a new context with a fresh cancellation token.
    pub fn new(request: StageRequest, paths: Arc<StoragePaths>) -> Self {
        Self {
            request,
            paths,
            cancellation: CancellationToken::new(),
        }
    }

    /// Builder: attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Final location of this stage's artifact with extension `ext`.
    pub fn output_path(&self, ext: &str) -> std::path::PathBuf {
        self.paths
            .stage_output(&self.request.fingerprint, self.request.stage, ext)
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("request", &self.request)
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}
