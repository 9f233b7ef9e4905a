//! Execution backend for dispatched stages.
//!
//! The orchestrator hands every [`StageRequest`] to a [`Broker`] after the
//! ledger transaction that registered it has committed. The broker keeps its
//! own view of each task, which the reconciler compares against the ledger.

use std::sync::Arc;

use dashmap::DashMap;
use sf_core::paths::StoragePaths;
use sf_core::{StageResult, TaskId};
use sf_pipeline::{run_stage, ExecutorSet, StageContext, StageRequest};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

/// Live status of a task as seen by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerStatus {
    /// Accepted, waiting for a worker.
    Queued,
    /// An executor is working on it.
    Running,
    /// The executor returned; the result may not have been applied yet.
    Finished(StageResult),
    /// Cancelled before it finished.
    Revoked,
    /// Never dispatched here, or already forgotten.
    Unknown,
}

impl BrokerStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

/// Completion report delivered to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub task: TaskId,
    pub result: StageResult,
}

/// Asynchronous execution backend.
///
/// Completions may be delivered more than once and after the task was timed
/// out; the orchestrator treats those as no-ops.
pub trait Broker: Send + Sync {
    /// Start executing `request` in the background.
    fn dispatch(&self, request: StageRequest) -> sf_core::Result<()>;

    /// Current status of `task`.
    fn status(&self, task: TaskId) -> BrokerStatus;

    /// Ask the executor to stop. Best effort.
    fn revoke(&self, task: TaskId);

    /// Drop bookkeeping for a task whose outcome has been applied.
    fn forget(&self, task: TaskId);
}

struct Slot {
    status: BrokerStatus,
    cancel: CancellationToken,
}

/// In-process broker running executors on the tokio runtime.
///
/// At most `workers` stages execute at once; the rest stay queued.
pub struct LocalBroker {
    executors: Arc<ExecutorSet>,
    paths: Arc<StoragePaths>,
    permits: Arc<Semaphore>,
    slots: Arc<DashMap<TaskId, Slot>>,
    completions: mpsc::UnboundedSender<Completion>,
    runtime: Handle,
}

impl LocalBroker {
    /// Create a broker bound to the current tokio runtime.
    ///
    /// Returns the broker and the receiving end of its completion channel.
    ///
    /// # Errors
    ///
    /// Returns [`sf_core::Error::Internal`] when called outside a runtime.
    pub fn new(
        executors: ExecutorSet,
        paths: Arc<StoragePaths>,
        workers: usize,
    ) -> sf_core::Result<(Self, mpsc::UnboundedReceiver<Completion>)> {
        let runtime = Handle::try_current()
            .map_err(|e| sf_core::Error::Internal(format!("broker needs a tokio runtime: {e}")))?;
        let (tx, rx) = mpsc::unbounded_channel();

        let broker = Self {
            executors: Arc::new(executors),
            paths,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            slots: Arc::new(DashMap::new()),
            completions: tx,
            runtime,
        };
        Ok((broker, rx))
    }

    /// Number of tasks the broker still tracks.
    pub fn tracked(&self) -> usize {
        self.slots.len()
    }
}

impl Broker for LocalBroker {
    fn dispatch(&self, request: StageRequest) -> sf_core::Result<()> {
        let task = request.task;
        let cancel = CancellationToken::new();
        self.slots.insert(
            task,
            Slot {
                status: BrokerStatus::Queued,
                cancel: cancel.clone(),
            },
        );

        let executors = self.executors.clone();
        let paths = self.paths.clone();
        let permits = self.permits.clone();
        let slots = self.slots.clone();
        let completions = self.completions.clone();

        self.runtime.spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(task = %task, "Task revoked while queued");
                    return;
                }
                permit = permits.acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => return,
                },
            };

            if let Some(mut slot) = slots.get_mut(&task) {
                if slot.status == BrokerStatus::Queued {
                    slot.status = BrokerStatus::Running;
                }
            }

            let ctx = StageContext::new(request, paths).with_cancellation(cancel.clone());
            let result = run_stage(&executors, &ctx).await;
            drop(permit);

            if cancel.is_cancelled() {
                tracing::debug!(task = %task, "Dropping result of revoked task");
                return;
            }

            // Record before notifying so a poll never sees an older status
            // than the callback reports.
            if let Some(mut slot) = slots.get_mut(&task) {
                slot.status = BrokerStatus::Finished(result.clone());
            }
            if completions.send(Completion { task, result }).is_err() {
                tracing::warn!(task = %task, "Completion receiver closed");
            }
        });

        Ok(())
    }

    fn status(&self, task: TaskId) -> BrokerStatus {
        self.slots
            .get(&task)
            .map(|slot| slot.status.clone())
            .unwrap_or(BrokerStatus::Unknown)
    }

    fn revoke(&self, task: TaskId) {
        if let Some(mut slot) = self.slots.get_mut(&task) {
            slot.cancel.cancel();
            if slot.status.is_pending() {
                slot.status = BrokerStatus::Revoked;
            }
            tracing::info!(task = %task, "Revoked task");
        }
    }

    fn forget(&self, task: TaskId) {
        self.slots.remove(&task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sf_core::{Fingerprint, Stage};
    use sf_pipeline::StageExecutor;
    use std::time::Duration;

    struct Echo(Stage);

    #[async_trait]
    impl StageExecutor for Echo {
        fn stage(&self) -> Stage {
            self.0
        }
        fn name(&self) -> &'static str {
            "echo"
        }
        async fn execute(&self, ctx: &StageContext) -> sf_core::Result<Option<String>> {
            Ok(Some(format!("{}/{}.out", ctx.request.fingerprint, self.0)))
        }
    }

    struct Sleepy;

    #[async_trait]
    impl StageExecutor for Sleepy {
        fn stage(&self) -> Stage {
            Stage::ExtractAudio
        }
        fn name(&self) -> &'static str {
            "sleepy"
        }
        async fn execute(&self, ctx: &StageContext) -> sf_core::Result<Option<String>> {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(Some("late".into())),
                _ = ctx.cancellation.cancelled() => Err(sf_core::Error::tool("sleepy", "cancelled")),
            }
        }
    }

    fn set(audio: Arc<dyn StageExecutor>) -> ExecutorSet {
        ExecutorSet::new(
            Arc::new(Echo(Stage::ExtractSubtitles)),
            audio,
            Arc::new(Echo(Stage::IsolateVocal)),
            Arc::new(Echo(Stage::Transcribe)),
        )
        .unwrap()
    }

    fn request(stage: Stage) -> StageRequest {
        StageRequest {
            task: TaskId::new(),
            fingerprint: Fingerprint::parse("abc123").unwrap(),
            stage,
            input: "abc123/source/abc123.mkv".into(),
        }
    }

    #[tokio::test]
    async fn completion_is_recorded_then_delivered() {
        let (broker, mut rx) = LocalBroker::new(
            set(Arc::new(Echo(Stage::ExtractAudio))),
            Arc::new(StoragePaths::new("/tmp/unused")),
            1,
        )
        .unwrap();
        let req = request(Stage::ExtractAudio);
        let task = req.task;
        broker.dispatch(req).unwrap();

        let completion = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completion.task, task);
        assert_eq!(completion.result, StageResult::succeeded("abc123/extract_audio.out"));
        assert_eq!(broker.status(task), BrokerStatus::Finished(completion.result));

        broker.forget(task);
        assert_eq!(broker.status(task), BrokerStatus::Unknown);
        assert_eq!(broker.tracked(), 0);
    }

    #[tokio::test]
    async fn revoked_task_reports_nothing() {
        let (broker, mut rx) = LocalBroker::new(
            set(Arc::new(Sleepy)),
            Arc::new(StoragePaths::new("/tmp/unused")),
            1,
        )
        .unwrap();
        let req = request(Stage::ExtractAudio);
        let task = req.task;
        broker.dispatch(req).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        broker.revoke(task);
        assert_eq!(broker.status(task), BrokerStatus::Revoked);

        let next = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(next.is_err(), "revoked task must not deliver a completion");
    }

    #[test]
    fn new_outside_runtime_fails() {
        let result = LocalBroker::new(
            set(Arc::new(Echo(Stage::ExtractAudio))),
            Arc::new(StoragePaths::new("/tmp/unused")),
            1,
        );
        assert!(result.is_err());
    }
}
