//! Process wiring: stores, broker, background loops and shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sf_av::ToolRegistry;
use sf_core::config::Config;
use sf_core::events::EventBus;
use sf_core::paths::StoragePaths;
use sf_core::Fingerprint;
use sf_db::pool::{init_pool, DbPool};
use sf_pipeline::{build_executors, ExecutorSet};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broker::{Broker, Completion, LocalBroker};
use crate::orchestrator::{Orchestrator, StatusReport};
use crate::watch::InboxWatcher;

/// Everything a running scribeforge process needs.
pub struct Runtime {
    pub orchestrator: Orchestrator,
    pub events: Arc<EventBus>,
    pub paths: Arc<StoragePaths>,
    pub tools: Arc<ToolRegistry>,
    config: Config,
    completions: Option<mpsc::UnboundedReceiver<Completion>>,
    watcher: Option<InboxWatcher>,
    shutdown: CancellationToken,
    loops: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Open the ledger and build executors and the broker from `config`.
    ///
    /// Missing tools are logged, not fatal: a run may never reach the stage
    /// that needs them.
    pub async fn build(config: Config) -> Result<Self> {
        config.check()?;
        let pool = open_ledger(&config)?;

        let tools = Arc::new(discover_tools(&config));
        let executors = build_executors(&config.pipeline, tools.clone())?;
        for (stage, e) in executors.validate_all().await {
            tracing::warn!(stage = %stage, "Stage cannot run: {}", e);
        }
        Self::with_executors(config, pool, tools, executors)
    }

    /// Like [`build`](Self::build) with caller-supplied stores and
    /// executors. Must be called from within a tokio runtime.
    pub fn with_executors(
        config: Config,
        pool: DbPool,
        tools: Arc<ToolRegistry>,
        executors: ExecutorSet,
    ) -> Result<Self> {
        let paths = Arc::new(StoragePaths::new(&config.storage.data_dir));
        std::fs::create_dir_all(paths.root())
            .with_context(|| format!("Failed to create data dir {:?}", paths.root()))?;

        let (broker, completions) =
            LocalBroker::new(executors, paths.clone(), config.pipeline.workers)?;
        let broker: Arc<dyn Broker> = Arc::new(broker);
        let events = Arc::new(EventBus::default());
        let orchestrator =
            Orchestrator::new(pool, broker, events.clone(), config.pipeline.clone());

        Ok(Self {
            orchestrator,
            events,
            paths,
            tools,
            config,
            completions: Some(completions),
            watcher: None,
            shutdown: CancellationToken::new(),
            loops: Vec::new(),
        })
    }

    /// Re-dispatch tasks a previous process left live.
    pub async fn recover(&self) -> Result<usize> {
        let orchestrator = self.orchestrator.clone();
        let recovered = tokio::task::spawn_blocking(move || orchestrator.recover()).await??;
        Ok(recovered)
    }

    /// Start the completion loop and the reconciliation sweep.
    pub fn start_loops(&mut self) {
        if let Some(rx) = self.completions.take() {
            self.loops.push(spawn_completion_loop(
                self.orchestrator.clone(),
                rx,
                self.shutdown.clone(),
            ));
        }
        self.loops.push(spawn_sweep_loop(
            self.orchestrator.clone(),
            Duration::from_secs(self.config.pipeline.reconcile_interval_secs),
            self.shutdown.clone(),
        ));
    }

    /// Start the inbox watcher if it is enabled.
    pub fn start_watcher(&mut self) -> Result<()> {
        let mut watcher = InboxWatcher::new(
            self.config.watch.clone(),
            self.orchestrator.clone(),
            self.paths.clone(),
        );
        watcher.start(self.shutdown.clone())?;
        self.watcher = Some(watcher);
        Ok(())
    }

    /// Token that stops every background loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Poll `fp` until it reaches a terminal status, waking early on
    /// pipeline events.
    pub async fn wait_for(&self, fp: &Fingerprint, poll: Duration) -> Result<StatusReport> {
        let mut rx = self.events.subscribe();
        loop {
            let orchestrator = self.orchestrator.clone();
            let key = fp.clone();
            let report = tokio::task::spawn_blocking(move || orchestrator.status(&key)).await??;
            if report.status.is_terminal() {
                return Ok(report);
            }

            tokio::select! {
                _ = rx.recv() => {}
                _ = tokio::time::sleep(poll) => {}
                _ = self.shutdown.cancelled() => {
                    anyhow::bail!("shut down while waiting for {fp}");
                }
            }
        }
    }

    /// Stop the loops and the watcher and wait for the loops to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        for handle in self.loops.drain(..) {
            let _ = handle.await;
        }
        tracing::info!("Runtime stopped");
    }
}

/// Open the ledger database named by `config`, creating its directory.
pub fn open_ledger(config: &Config) -> Result<DbPool> {
    let db_path = &config.ledger.db_path;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create ledger dir {:?}", parent))?;
    }
    let db_path_str = db_path.to_string_lossy();
    tracing::debug!("Opening ledger at {}", db_path_str);
    Ok(init_pool(&db_path_str, config.ledger.pool_size)?)
}

/// Discover ffmpeg, ffprobe and the configured command programs.
pub fn discover_tools(config: &Config) -> ToolRegistry {
    ToolRegistry::discover(&config.tools)
        .with_program(&config.pipeline.vocal.program)
        .with_program(&config.pipeline.transcribe.program)
}

/// Apply broker completions in arrival order.
pub fn spawn_completion_loop(
    orchestrator: Orchestrator,
    mut completions: mpsc::UnboundedReceiver<Completion>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let completion = tokio::select! {
                _ = shutdown.cancelled() => break,
                c = completions.recv() => match c {
                    Some(c) => c,
                    None => break,
                },
            };

            let orchestrator = orchestrator.clone();
            let task = completion.task;
            let applied = tokio::task::spawn_blocking(move || {
                orchestrator.on_stage_complete(completion.task, completion.result)
            })
            .await;
            match applied {
                Ok(Ok(transition)) => {
                    tracing::debug!(task = %task, ?transition, "Applied completion");
                }
                Ok(Err(e)) => {
                    tracing::error!(task = %task, error = %e, "Failed to apply completion");
                }
                Err(e) => tracing::error!(task = %task, "Completion handler panicked: {}", e),
            }
        }
        tracing::debug!("Completion loop stopped");
    })
}

/// Reconcile every live task each `interval`.
pub fn spawn_sweep_loop(
    orchestrator: Orchestrator,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let orchestrator = orchestrator.clone();
            match tokio::task::spawn_blocking(move || orchestrator.reconciler().sweep()).await {
                Ok(Ok(report)) => tracing::trace!(?report, "Sweep finished"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Reconciliation sweep failed"),
                Err(e) => tracing::error!("Reconciliation sweep panicked: {}", e),
            }
        }
        tracing::debug!("Sweep loop stopped");
    })
}
