//! Repair drift between the ledger and the broker.
//!
//! The ledger only changes through the orchestrator, but the broker learns
//! about finished tasks first. A status query or the periodic sweep may
//! therefore find a task the broker reports as finished while the ledger
//! still has it live. The reconciler applies the broker's result through the
//! same transition the completion callback uses, so whichever path runs
//! first wins and the other is a no-op. Live tasks past their deadline are
//! failed with a timeout and revoked.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sf_core::{FileStatus, Fingerprint, Result, StageResult};
use sf_db::models::TaskRecord;
use sf_db::pool::get_conn;
use sf_db::queries::{files, tasks};

use crate::broker::BrokerStatus;
use crate::orchestrator::{Orchestrator, Outcome, StatusReport, Transition};

/// Totals of one [`Reconciler::sweep`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Live tasks inspected.
    pub checked: usize,
    /// Broker results applied on behalf of a missing callback.
    pub applied: usize,
    /// Tasks failed for exceeding the deadline.
    pub timed_out: usize,
    /// Tasks that could not be checked.
    pub errors: usize,
}

enum Repair {
    Nothing,
    Applied,
    TimedOut,
}

/// Cross-checks live tasks against the broker.
pub struct Reconciler<'a> {
    orchestrator: &'a Orchestrator,
}

impl<'a> Reconciler<'a> {
    pub(crate) fn new(orchestrator: &'a Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Bring `fp` up to date with the broker and return its status.
    pub fn reconcile(&self, fp: &Fingerprint) -> Result<StatusReport> {
        self.reconcile_at(fp, Utc::now())
    }

    /// [`reconcile`](Self::reconcile) with an explicit clock.
    pub fn reconcile_at(&self, fp: &Fingerprint, now: DateTime<Utc>) -> Result<StatusReport> {
        let live = {
            let conn = get_conn(self.orchestrator.pool())?;
            match files::lookup(&conn, fp)? {
                Some(record) if record.status == FileStatus::InProgress => {
                    tasks::find_live_task(&conn, fp)?
                }
                _ => None,
            }
        };

        if let Some(live) = live {
            self.check(&live, now)?;
        }
        self.orchestrator.read_status(fp)
    }

    /// Reconcile every live task.
    pub fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now())
    }

    /// [`sweep`](Self::sweep) with an explicit clock.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let live = {
            let conn = get_conn(self.orchestrator.pool())?;
            tasks::list_live(&conn)?
        };

        let mut report = SweepReport::default();
        for task in &live {
            report.checked += 1;
            match self.check(task, now) {
                Ok(Repair::Nothing) => {}
                Ok(Repair::Applied) => report.applied += 1,
                Ok(Repair::TimedOut) => report.timed_out += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(
                        fingerprint = %task.fingerprint,
                        task = %task.id,
                        error = %e,
                        "Failed to reconcile task"
                    );
                }
            }
        }

        if report.applied > 0 || report.timed_out > 0 {
            tracing::info!(
                checked = report.checked,
                applied = report.applied,
                timed_out = report.timed_out,
                "Reconciliation sweep repaired tasks"
            );
        }
        Ok(report)
    }

    fn check(&self, live: &TaskRecord, now: DateTime<Utc>) -> Result<Repair> {
        let outcome = match self.orchestrator.broker().status(live.id) {
            BrokerStatus::Finished(result) => Outcome::Completed(result),
            BrokerStatus::Revoked => {
                Outcome::Completed(StageResult::failed("task was revoked before it finished"))
            }
            BrokerStatus::Queued | BrokerStatus::Running | BrokerStatus::Unknown => {
                let elapsed_secs = live.elapsed_secs(now);
                if elapsed_secs <= self.orchestrator.stage_timeout_secs() {
                    return Ok(Repair::Nothing);
                }
                tracing::warn!(
                    fingerprint = %live.fingerprint,
                    task = %live.id,
                    stage = %live.stage,
                    elapsed_secs,
                    "Task exceeded its deadline"
                );
                Outcome::TimedOut { elapsed_secs }
            }
        };

        let timed_out = matches!(outcome, Outcome::TimedOut { .. });
        let transition = self.orchestrator.apply_outcome(live.id, outcome)?;
        Ok(match transition {
            Transition::Ignored => Repair::Nothing,
            _ if timed_out => Repair::TimedOut,
            _ => Repair::Applied,
        })
    }
}
