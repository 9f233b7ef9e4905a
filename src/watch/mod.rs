//! Inbox watcher: ingest and submit media files dropped into watched
//! directories.

pub mod settle;

pub use settle::FileSettleTracker;

use crate::config::WatchConfig;
use crate::ingest::ingest_file;
use crate::orchestrator::Orchestrator;
use anyhow::{Context, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use sf_core::paths::StoragePaths;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Watches inbox directories and feeds settled files to the orchestrator.
pub struct InboxWatcher {
    config: WatchConfig,
    orchestrator: Orchestrator,
    paths: Arc<StoragePaths>,
    watcher: Option<RecommendedWatcher>,
}

impl InboxWatcher {
    pub fn new(config: WatchConfig, orchestrator: Orchestrator, paths: Arc<StoragePaths>) -> Self {
        Self {
            config,
            orchestrator,
            paths,
            watcher: None,
        }
    }

    /// Start watching the configured directories until `shutdown` fires.
    pub fn start(&mut self, shutdown: CancellationToken) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("Inbox watcher is disabled");
            return Ok(());
        }

        if self.config.paths.is_empty() {
            tracing::warn!("No watch paths configured");
            return Ok(());
        }

        let (event_tx, mut event_rx) = mpsc::channel::<PathBuf>(100);
        let (settled_tx, mut settled_rx) = mpsc::channel::<PathBuf>(100);

        let mut settle_tracker = FileSettleTracker::new(self.config.settle_time_secs, settled_tx);

        let extensions = self.config.extensions.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    if event.kind.is_create() || event.kind.is_modify() {
                        for path in event.paths {
                            if is_media_file(&path, &extensions) {
                                let _ = event_tx.blocking_send(path);
                            }
                        }
                    }
                }
            },
            Config::default(),
        )
        .context("Failed to create file watcher")?;

        for path in &self.config.paths {
            if path.exists() {
                watcher
                    .watch(path, RecursiveMode::Recursive)
                    .with_context(|| format!("Failed to watch path: {:?}", path))?;
                tracing::info!("Watching inbox: {:?}", path);
            } else {
                tracing::warn!("Watch path does not exist: {:?}", path);
            }
        }

        self.watcher = Some(watcher);

        let orchestrator = self.orchestrator.clone();
        let paths = self.paths.clone();
        tokio::spawn(async move {
            let mut check_interval = tokio::time::interval(Duration::from_secs(5));

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Inbox watcher loop stopped");
                        break;
                    }

                    Some(path) = event_rx.recv() => {
                        tracing::debug!("File event: {:?}", path);
                        settle_tracker.file_changed(path);
                    }

                    Some(path) = settled_rx.recv() => {
                        if path.is_file() {
                            let orchestrator = orchestrator.clone();
                            let paths = paths.clone();
                            let result = tokio::task::spawn_blocking(move || {
                                submit_file(&orchestrator, &paths, &path)
                            })
                            .await;
                            match result {
                                Ok(Ok(())) => {}
                                Ok(Err(e)) => tracing::warn!("Failed to submit inbox file: {:#}", e),
                                Err(e) => tracing::error!("Inbox submit task panicked: {}", e),
                            }
                        }
                    }

                    _ = check_interval.tick() => {
                        settle_tracker.check_settled().await;
                    }
                }
            }
        });

        Ok(())
    }

    /// Stop watching.
    pub fn stop(&mut self) {
        self.watcher = None;
        tracing::info!("Inbox watcher stopped");
    }
}

fn submit_file(orchestrator: &Orchestrator, paths: &StoragePaths, path: &Path) -> Result<()> {
    let ingested = ingest_file(path, paths)
        .with_context(|| format!("Failed to ingest {:?}", path))?;
    let outcome = orchestrator.submit(&ingested.fingerprint, &ingested.source_ref)?;
    tracing::info!(
        fingerprint = %ingested.fingerprint,
        status = %outcome.status,
        dispatched = outcome.dispatched,
        "Submitted inbox file {:?}",
        path
    );
    Ok(())
}

/// Whether `path` has one of `extensions` (case-insensitive). An empty list
/// falls back to common video containers.
pub fn is_media_file(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext_str = ext.to_string_lossy().to_lowercase();

    if extensions.is_empty() {
        let default_exts = ["mkv", "mp4", "avi", "mov", "m4v", "webm"];
        return default_exts.contains(&ext_str.as_str());
    }

    extensions.iter().any(|e| e.to_lowercase() == ext_str)
}
