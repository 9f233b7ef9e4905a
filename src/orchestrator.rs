//! The pipeline state machine.
//!
//! The [`Orchestrator`] owns no authoritative state. Every transition reads
//! and writes the file records and the task ledger inside one `BEGIN
//! IMMEDIATE` transaction, and the follow-up stage is handed to the broker
//! only after that transaction has committed. The partial unique index on
//! live tasks backs up the transaction: whichever writer registers the live
//! task for a fingerprint acts, everyone else observes.

use std::fmt;
use std::sync::Arc;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use sf_core::config::PipelineConfig;
use sf_core::events::{EventBus, EventPayload};
use sf_core::{
    Error, FileStatus, Fingerprint, Result, Stage, StagePlan, StageResult, TaskId, TaskOutcome,
};
use sf_db::models::{FileRecord, TaskRecord};
use sf_db::pool::{get_conn, DbPool, PooledConnection};
use sf_db::queries::{files, tasks};
use sf_pipeline::{plan, StageRequest};

use crate::broker::{Broker, BrokerStatus};
use crate::reconciler::Reconciler;

/// Lifecycle status as callers see it. `Absent` means no record exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Absent,
    InProgress,
    Succeeded,
    Failed,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Whether nothing more will happen without a new request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl From<FileStatus> for Lifecycle {
    fn from(status: FileStatus) -> Self {
        match status {
            FileStatus::InProgress => Self::InProgress,
            FileStatus::Succeeded => Self::Succeeded,
            FileStatus::Failed => Self::Failed,
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply to [`Orchestrator::submit`] and [`Orchestrator::reprocess`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitOutcome {
    pub status: Lifecycle,
    /// The live task, when the fingerprint is in progress.
    pub task: Option<TaskId>,
    /// True only for the call that registered `task`.
    pub dispatched: bool,
}

impl SubmitOutcome {
    fn in_flight(task: TaskId) -> Self {
        Self {
            status: Lifecycle::InProgress,
            task: Some(task),
            dispatched: false,
        }
    }
}

/// Reply to [`Orchestrator::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub fingerprint: Fingerprint,
    pub status: Lifecycle,
    /// Stage owning the record. Kept on failure to show where the run stopped.
    pub stage: Option<Stage>,
    pub task: Option<TaskId>,
    pub plan: Option<StagePlan>,
    /// Reason of the last failure.
    pub error: Option<String>,
    /// Number of tasks ever registered for the fingerprint.
    pub stage_seq: i64,
}

impl StatusReport {
    fn absent(fp: &Fingerprint) -> Self {
        Self {
            fingerprint: fp.clone(),
            status: Lifecycle::Absent,
            stage: None,
            task: None,
            plan: None,
            error: None,
            stage_seq: 0,
        }
    }

    fn from_record(record: FileRecord, live: Option<TaskRecord>) -> Self {
        Self {
            fingerprint: record.fingerprint,
            status: record.status.into(),
            stage: record.current_stage,
            task: live.map(|t| t.id),
            plan: Some(record.plan),
            error: record.error,
            stage_seq: record.stage_seq,
        }
    }
}

/// What applying a task outcome did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The next stage was registered and dispatched.
    Advanced { next: Stage, task: TaskId },
    /// The final stage succeeded.
    Succeeded,
    /// The run stopped with a reason.
    Failed { reason: String },
    /// The task was not live; nothing changed.
    Ignored,
}

/// How a live task ended.
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Completed(StageResult),
    TimedOut { elapsed_secs: u64 },
}

/// Coordinates the file records, the task ledger and the broker.
#[derive(Clone)]
pub struct Orchestrator {
    pool: DbPool,
    broker: Arc<dyn Broker>,
    events: Arc<EventBus>,
    pipeline: Arc<PipelineConfig>,
}

impl Orchestrator {
    pub fn new(
        pool: DbPool,
        broker: Arc<dyn Broker>,
        events: Arc<EventBus>,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            pool,
            broker,
            events,
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub(crate) fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Deadline of a live task in seconds.
    pub fn stage_timeout_secs(&self) -> u64 {
        self.pipeline.stage_timeout_secs
    }

    /// Reconciler sharing this orchestrator's stores and broker.
    pub fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(self)
    }

    // -- Entry points ---------------------------------------------------------

    /// Start processing `fp` unless it is done or already in flight.
    ///
    /// * succeeded: returned as is, nothing is dispatched.
    /// * live task: `in_progress` with the existing handle.
    /// * absent: a record is created with the configured plan and its first
    ///   stage is dispatched.
    /// * failed: the chain restarts from the first stage of the stored plan.
    pub fn submit(&self, fp: &Fingerprint, source_ref: &str) -> Result<SubmitOutcome> {
        self.start_or_observe(fp, source_ref, false)
    }

    /// Explicit reprocessing: restart `fp` from the first stage of a freshly
    /// chosen plan, even if it succeeded. A live run is left alone.
    pub fn reprocess(&self, fp: &Fingerprint, source_ref: &str) -> Result<SubmitOutcome> {
        self.start_or_observe(fp, source_ref, true)
    }

    /// Apply a completion report from an executor.
    ///
    /// Reports for tasks that are not live (duplicates, late reports after a
    /// timeout, unknown handles) are ignored.
    pub fn on_stage_complete(&self, task: TaskId, result: StageResult) -> Result<Transition> {
        self.apply_outcome(task, Outcome::Completed(result))
    }

    /// Current status of `fp`. In-progress records are reconciled against
    /// the broker first.
    pub fn status(&self, fp: &Fingerprint) -> Result<StatusReport> {
        let record = {
            let conn = get_conn(&self.pool)?;
            files::lookup(&conn, fp)?
        };
        match record {
            Some(r) if r.status == FileStatus::InProgress => self.reconciler().reconcile(fp),
            Some(r) => Ok(StatusReport::from_record(r, None)),
            None => Ok(StatusReport::absent(fp)),
        }
    }

    /// Latest output reference of every stage that produced one.
    pub fn outputs(&self, fp: &Fingerprint) -> Result<Vec<(Stage, String)>> {
        let conn = get_conn(&self.pool)?;
        tasks::outputs(&conn, fp)
    }

    /// Latest output reference of `stage`, if it produced one.
    pub fn output(&self, fp: &Fingerprint, stage: Stage) -> Result<Option<String>> {
        let conn = get_conn(&self.pool)?;
        Ok(tasks::latest_succeeded(&conn, fp, stage)?.and_then(|t| t.output_ref))
    }

    /// Every task ever registered for `fp`, in dispatch order.
    pub fn history(&self, fp: &Fingerprint) -> Result<Vec<TaskRecord>> {
        let conn = get_conn(&self.pool)?;
        tasks::history(&conn, fp)
    }

    /// Re-dispatch tasks left live by a previous process.
    ///
    /// A live task is stale when the broker has never heard of it. Each one
    /// is resolved as abandoned and its stage is registered again under a
    /// fresh handle, resuming from the last stage boundary. Tasks the broker
    /// is tracking are left alone, so repeated calls are harmless.
    pub fn recover(&self) -> Result<usize> {
        let stale = {
            let conn = get_conn(&self.pool)?;
            tasks::list_live(&conn)?
        };

        let mut recovered = 0;
        for task in stale {
            match self.redispatch(&task) {
                Ok(true) => recovered += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    fingerprint = %task.fingerprint,
                    task = %task.id,
                    error = %e,
                    "Failed to recover task"
                ),
            }
        }
        if recovered > 0 {
            tracing::info!(recovered, "Re-dispatched tasks from previous run");
        }
        Ok(recovered)
    }

    // -- Transitions ----------------------------------------------------------

    fn start_or_observe(
        &self,
        fp: &Fingerprint,
        source_ref: &str,
        restart: bool,
    ) -> Result<SubmitOutcome> {
        match self.start(fp, source_ref, restart) {
            Err(Error::Conflict(msg)) => {
                // Lost the conditional write: report the winner's task.
                tracing::debug!(fingerprint = %fp, conflict = %msg, "Submit lost to a live task");
                let conn = get_conn(&self.pool)?;
                match tasks::find_live_task(&conn, fp)? {
                    Some(live) => Ok(SubmitOutcome::in_flight(live.id)),
                    None => Err(Error::Conflict(msg)),
                }
            }
            other => other,
        }
    }

    fn start(&self, fp: &Fingerprint, source_ref: &str, restart: bool) -> Result<SubmitOutcome> {
        let mut conn = get_conn(&self.pool)?;
        let tx = begin(&mut conn)?;

        if let Some(live) = tasks::find_live_task(&tx, fp)? {
            return Ok(SubmitOutcome::in_flight(live.id));
        }

        let request = match files::lookup(&tx, fp)? {
            Some(record) if record.status == FileStatus::Succeeded && !restart => {
                tracing::debug!(fingerprint = %fp, "Already succeeded; nothing to do");
                return Ok(SubmitOutcome {
                    status: Lifecycle::Succeeded,
                    task: None,
                    dispatched: false,
                });
            }
            Some(_) if restart => {
                let plan = self.pipeline.plan();
                files::restart(&tx, fp, plan, source_ref)?;
                self.register_stage(&tx, fp, plan.first_stage(), source_ref)?
            }
            Some(record) => {
                let stage = record.plan.first_stage();
                tracing::info!(
                    fingerprint = %fp,
                    failed_at = ?record.current_stage,
                    "Retrying failed run from {}",
                    stage
                );
                self.register_stage(&tx, fp, stage, &record.source_ref)?
            }
            None => {
                let plan = self.pipeline.plan();
                if !files::create(&tx, fp, FileStatus::InProgress, plan, source_ref)? {
                    return Err(Error::Conflict(format!("record for {fp} created concurrently")));
                }
                self.register_stage(&tx, fp, plan.first_stage(), source_ref)?
            }
        };
        commit(tx)?;

        let task = request.task;
        self.events.broadcast(EventPayload::FileSubmitted {
            fingerprint: fp.clone(),
        });
        self.dispatch(request);

        Ok(SubmitOutcome {
            status: Lifecycle::InProgress,
            task: Some(task),
            dispatched: true,
        })
    }

    /// Apply `outcome` to `task` exactly once.
    ///
    /// Shared by completion callbacks and the reconciler; whichever gets
    /// here first resolves the task and the other sees it as not live.
    pub(crate) fn apply_outcome(&self, task: TaskId, outcome: Outcome) -> Result<Transition> {
        match self.try_apply(task, outcome) {
            Err(e) if e.is_stale_notification() => {
                tracing::debug!(task = %task, error = %e, "Ignoring stale notification");
                Ok(Transition::Ignored)
            }
            other => other,
        }
    }

    fn try_apply(&self, task: TaskId, outcome: Outcome) -> Result<Transition> {
        let mut conn = get_conn(&self.pool)?;
        let tx = begin(&mut conn)?;

        let fp = tasks::find_fingerprint(&tx, task)?.ok_or(Error::UnknownTask(task))?;
        let live = tasks::find_live_task(&tx, &fp)?
            .filter(|t| t.id == task)
            .ok_or(Error::UnknownTask(task))?;
        let record = files::lookup(&tx, &fp)?.ok_or_else(|| Error::not_found("file", &fp))?;
        let stage = live.stage;

        let mut events = Vec::new();
        let mut next_request = None;
        let timed_out = matches!(outcome, Outcome::TimedOut { .. });

        let transition = match outcome {
            Outcome::TimedOut { elapsed_secs } => {
                let reason = Error::Timeout {
                    stage: stage.to_string(),
                    elapsed_secs,
                }
                .to_string();
                tasks::resolve(&tx, task, TaskOutcome::TimedOut, None, Some(&reason))?;
                files::mark_failed(&tx, &fp, &reason)?;
                events.push(EventPayload::TaskTimedOut {
                    fingerprint: fp.clone(),
                    task_id: task,
                    stage,
                });
                Transition::Failed { reason }
            }
            Outcome::Completed(result) => {
                let result = require_output(stage, result);
                events.push(EventPayload::StageCompleted {
                    fingerprint: fp.clone(),
                    task_id: task,
                    stage,
                    success: result.success,
                });

                if result.success {
                    tasks::resolve(&tx, task, TaskOutcome::Succeeded, result.output.as_deref(), None)?;
                    let transcript = has_subtitle_transcript(&tx, &fp)?;
                    match plan::next_stage(record.plan, stage, transcript) {
                        Some(next) => {
                            let request = self.register_stage(&tx, &fp, next, &record.source_ref)?;
                            let transition = Transition::Advanced {
                                next,
                                task: request.task,
                            };
                            next_request = Some(request);
                            transition
                        }
                        None => {
                            files::mark_succeeded(&tx, &fp)?;
                            Transition::Succeeded
                        }
                    }
                } else {
                    let reason = result.reason();
                    tasks::resolve(&tx, task, TaskOutcome::Failed, None, Some(&reason))?;
                    files::mark_failed(&tx, &fp, &reason)?;
                    Transition::Failed { reason }
                }
            }
        };
        commit(tx)?;

        if timed_out {
            self.broker.revoke(task);
        }
        self.broker.forget(task);

        match &transition {
            Transition::Succeeded => {
                tracing::info!(fingerprint = %fp, "File succeeded");
                events.push(EventPayload::FileSucceeded {
                    fingerprint: fp.clone(),
                });
            }
            Transition::Failed { reason } => {
                tracing::warn!(fingerprint = %fp, stage = %stage, reason = %reason, "File failed");
                events.push(EventPayload::FileFailed {
                    fingerprint: fp.clone(),
                    stage,
                    error: reason.clone(),
                });
            }
            Transition::Advanced { .. } | Transition::Ignored => {}
        }
        for payload in events {
            self.events.broadcast(payload);
        }
        if let Some(request) = next_request {
            self.dispatch(request);
        }

        Ok(transition)
    }

    fn redispatch(&self, stale: &TaskRecord) -> Result<bool> {
        // Tasks this broker accepted are not stale.
        if !matches!(self.broker.status(stale.id), BrokerStatus::Unknown) {
            return Ok(false);
        }

        let mut conn = get_conn(&self.pool)?;
        let tx = begin(&mut conn)?;

        let fp = &stale.fingerprint;
        let still_live = tasks::find_live_task(&tx, fp)?.is_some_and(|t| t.id == stale.id);
        if !still_live {
            return Ok(false);
        }
        let record = files::lookup(&tx, fp)?.ok_or_else(|| Error::not_found("file", fp))?;

        tasks::resolve(
            &tx,
            stale.id,
            TaskOutcome::Abandoned,
            None,
            Some("superseded after restart"),
        )?;
        let request = self.register_stage(&tx, fp, stale.stage, &record.source_ref)?;
        commit(tx)?;

        tracing::info!(
            fingerprint = %fp,
            stage = %stale.stage,
            old_task = %stale.id,
            task = %request.task,
            "Recovering stage"
        );
        self.dispatch(request);
        Ok(true)
    }

    /// Point the record at `stage` and register a live task for it.
    ///
    /// The old live task, if any, must already be resolved.
    fn register_stage(
        &self,
        conn: &Connection,
        fp: &Fingerprint,
        stage: Stage,
        source_ref: &str,
    ) -> Result<StageRequest> {
        let input = stage_input(conn, fp, stage, source_ref)?;
        let seq = files::advance(conn, fp, stage)?;
        let task = TaskId::new();
        tasks::register(conn, task, fp, stage, seq)?;

        Ok(StageRequest {
            task,
            fingerprint: fp.clone(),
            stage,
            input,
        })
    }

    /// Hand a committed request to the broker.
    fn dispatch(&self, request: StageRequest) {
        let payload = EventPayload::StageDispatched {
            fingerprint: request.fingerprint.clone(),
            task_id: request.task,
            stage: request.stage,
        };
        tracing::info!(
            fingerprint = %request.fingerprint,
            task = %request.task,
            stage = %request.stage,
            "Dispatching stage"
        );

        let task = request.task;
        if let Err(e) = self.broker.dispatch(request) {
            // The task stays live until the reconciler times it out.
            tracing::error!(task = %task, error = %e, "Broker rejected task");
        }
        self.events.broadcast(payload);
    }

    /// Read the record and its live task without consulting the broker.
    pub(crate) fn read_status(&self, fp: &Fingerprint) -> Result<StatusReport> {
        let conn = get_conn(&self.pool)?;
        match files::lookup(&conn, fp)? {
            Some(record) => {
                let live = tasks::find_live_task(&conn, fp)?;
                Ok(StatusReport::from_record(record, live))
            }
            None => Ok(StatusReport::absent(fp)),
        }
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

fn begin(conn: &mut PooledConnection) -> Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| Error::database(e.to_string()))
}

fn commit(tx: Transaction<'_>) -> Result<()> {
    tx.commit().map_err(|e| Error::database(e.to_string()))
}

/// The subtitle stage may succeed without output; every other stage must
/// hand something to its successor.
fn require_output(stage: Stage, result: StageResult) -> StageResult {
    if result.success && result.output.is_none() && stage != Stage::ExtractSubtitles {
        StageResult::failed(format!("{stage} reported success without output"))
    } else {
        result
    }
}

fn has_subtitle_transcript(conn: &Connection, fp: &Fingerprint) -> Result<bool> {
    Ok(tasks::latest_succeeded(conn, fp, Stage::ExtractSubtitles)?
        .is_some_and(|t| t.output_ref.is_some()))
}

fn stage_input(conn: &Connection, fp: &Fingerprint, stage: Stage, source_ref: &str) -> Result<String> {
    match plan::input_stage(stage) {
        None => Ok(source_ref.to_string()),
        Some(prev) => tasks::latest_succeeded(conn, fp, prev)?
            .and_then(|t| t.output_ref)
            .ok_or_else(|| Error::stage(stage, format!("no output from {prev} to read"))),
    }
}
