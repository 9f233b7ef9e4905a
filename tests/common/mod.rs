//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which opens a file-backed ledger in a temporary
//! directory and wires an [`Orchestrator`] to a [`ManualBroker`] that only
//! records dispatches. Tests play the executor by feeding results back via
//! `on_stage_complete` or by setting broker status for the reconciler.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use scribeforge::broker::{Broker, BrokerStatus};
use scribeforge::orchestrator::Orchestrator;
use sf_core::config::PipelineConfig;
use sf_core::events::EventBus;
use sf_core::{Fingerprint, StageResult, TaskId};
use sf_db::pool::{init_pool, DbPool};
use sf_pipeline::StageRequest;
use tempfile::TempDir;

/// Broker that records every call and reports whatever status a test sets.
#[derive(Default)]
pub struct ManualBroker {
    dispatched: Mutex<Vec<StageRequest>>,
    statuses: Mutex<HashMap<TaskId, BrokerStatus>>,
    revoked: Mutex<Vec<TaskId>>,
}

impl ManualBroker {
    pub fn dispatched(&self) -> Vec<StageRequest> {
        self.dispatched.lock().clone()
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatched.lock().len()
    }

    pub fn last(&self) -> StageRequest {
        self.dispatched
            .lock()
            .last()
            .cloned()
            .expect("nothing dispatched")
    }

    /// Make the broker report `task` as finished with `result`.
    pub fn finish(&self, task: TaskId, result: StageResult) {
        self.statuses
            .lock()
            .insert(task, BrokerStatus::Finished(result));
    }

    pub fn revoked(&self) -> Vec<TaskId> {
        self.revoked.lock().clone()
    }
}

impl Broker for ManualBroker {
    fn dispatch(&self, request: StageRequest) -> sf_core::Result<()> {
        self.statuses.lock().insert(request.task, BrokerStatus::Queued);
        self.dispatched.lock().push(request);
        Ok(())
    }

    fn status(&self, task: TaskId) -> BrokerStatus {
        self.statuses
            .lock()
            .get(&task)
            .cloned()
            .unwrap_or(BrokerStatus::Unknown)
    }

    fn revoke(&self, task: TaskId) {
        self.revoked.lock().push(task);
    }

    fn forget(&self, task: TaskId) {
        self.statuses.lock().remove(&task);
    }
}

/// Orchestrator over a temporary file-backed ledger.
pub struct TestHarness {
    pub orchestrator: Orchestrator,
    pub broker: Arc<ManualBroker>,
    pub events: Arc<EventBus>,
    pub db: DbPool,
    pub dir: TempDir,
}

impl TestHarness {
    /// Speech-to-text plan: extract_audio → isolate_vocal → transcribe.
    pub fn new() -> Self {
        Self::with_pipeline(PipelineConfig {
            prefer_embedded_subtitles: false,
            ..PipelineConfig::default()
        })
    }

    /// Subtitles-first plan.
    pub fn subtitles_first() -> Self {
        Self::with_pipeline(PipelineConfig::default())
    }

    pub fn with_pipeline(pipeline: PipelineConfig) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let db = open_db(&dir);
        Self::with_db(db, dir, pipeline)
    }

    pub fn with_db(db: DbPool, dir: TempDir, pipeline: PipelineConfig) -> Self {
        let broker = Arc::new(ManualBroker::default());
        let events = Arc::new(EventBus::default());
        let orchestrator = Orchestrator::new(db.clone(), broker.clone(), events.clone(), pipeline);
        Self {
            orchestrator,
            broker,
            events,
            db,
            dir,
        }
    }

    /// Get a database connection from the pool.
    pub fn conn(&self) -> sf_db::pool::PooledConnection {
        sf_db::pool::get_conn(&self.db).expect("failed to get db connection")
    }

    /// Source reference a real ingest would have produced.
    pub fn source_ref(&self, fp: &Fingerprint) -> String {
        self.dir
            .path()
            .join(fp.as_str())
            .join("source")
            .join(format!("{fp}.mkv"))
            .to_string_lossy()
            .to_string()
    }
}

/// File-backed ledger in `dir` (WAL, busy timeout).
pub fn open_db(dir: &TempDir) -> DbPool {
    let path = dir.path().join("ledger.db");
    init_pool(&path.to_string_lossy(), 8).expect("failed to open ledger")
}

pub fn fp(s: &str) -> Fingerprint {
    Fingerprint::parse(s).expect("invalid fingerprint")
}
