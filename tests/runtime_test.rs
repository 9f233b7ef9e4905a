//! End-to-end runs through the local broker with scripted executors.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scribeforge::ingest::ingest_file;
use common::ManualBroker;
use scribeforge::orchestrator::{Lifecycle, Orchestrator};
use scribeforge::runtime::{open_ledger, Runtime};
use sf_av::ToolRegistry;
use sf_core::config::Config;
use sf_core::events::EventBus;
use sf_core::paths::StoragePaths;
use sf_core::{Stage, TaskOutcome};
use sf_pipeline::{ExecutorSet, StageContext, StageExecutor};

/// Writes a marker file where the real stage would put its artifact.
struct Scripted {
    stage: Stage,
    produce: bool,
    fail: Option<&'static str>,
}

impl Scripted {
    fn ok(stage: Stage) -> Arc<dyn StageExecutor> {
        Arc::new(Self {
            stage,
            produce: true,
            fail: None,
        })
    }

    fn nothing(stage: Stage) -> Arc<dyn StageExecutor> {
        Arc::new(Self {
            stage,
            produce: false,
            fail: None,
        })
    }

    fn failing(stage: Stage, reason: &'static str) -> Arc<dyn StageExecutor> {
        Arc::new(Self {
            stage,
            produce: false,
            fail: Some(reason),
        })
    }
}

#[async_trait]
impl StageExecutor for Scripted {
    fn stage(&self) -> Stage {
        self.stage
    }

    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn execute(&self, ctx: &StageContext) -> sf_core::Result<Option<String>> {
        if let Some(reason) = self.fail {
            return Err(sf_core::Error::tool("scripted", reason));
        }
        if !self.produce {
            return Ok(None);
        }
        let out = ctx.output_path("out");
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&out, format!("{} <- {}", self.stage, ctx.request.input))?;
        Ok(Some(out.to_string_lossy().to_string()))
    }
}

fn config(dir: &tempfile::TempDir, subtitles_first: bool) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = dir.path().join("data");
    config.ledger.db_path = dir.path().join("ledger.db");
    config.pipeline.prefer_embedded_subtitles = subtitles_first;
    config
}

fn runtime(config: Config, executors: ExecutorSet) -> Runtime {
    let pool = open_ledger(&config).unwrap();
    Runtime::with_executors(config, pool, Arc::new(ToolRegistry::default()), executors).unwrap()
}

fn source(dir: &tempfile::TempDir, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join("episode.mkv");
    std::fs::write(&path, bytes).unwrap();
    path
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn speech_to_text_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let executors = ExecutorSet::new(
        Scripted::nothing(Stage::ExtractSubtitles),
        Scripted::ok(Stage::ExtractAudio),
        Scripted::ok(Stage::IsolateVocal),
        Scripted::ok(Stage::Transcribe),
    )
    .unwrap();
    let mut rt = runtime(config(&dir, false), executors);
    rt.start_loops();

    let ingested = ingest_file(&source(&dir, b"frames"), &rt.paths).unwrap();
    let out = rt
        .orchestrator
        .submit(&ingested.fingerprint, &ingested.source_ref)
        .unwrap();
    assert!(out.dispatched);

    let report = tokio::time::timeout(
        Duration::from_secs(20),
        rt.wait_for(&ingested.fingerprint, Duration::from_millis(50)),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(report.status, Lifecycle::Succeeded);

    let outputs = rt.orchestrator.outputs(&ingested.fingerprint).unwrap();
    let stages: Vec<Stage> = outputs.iter().map(|(s, _)| *s).collect();
    assert_eq!(
        stages,
        vec![Stage::ExtractAudio, Stage::IsolateVocal, Stage::Transcribe]
    );

    // Each stage read the previous stage's artifact.
    let transcript = std::fs::read_to_string(&outputs[2].1).unwrap();
    assert_eq!(transcript, format!("transcribe <- {}", outputs[1].1));

    rt.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_subtitles_fall_back_to_speech() {
    let dir = tempfile::tempdir().unwrap();
    let executors = ExecutorSet::new(
        Scripted::nothing(Stage::ExtractSubtitles),
        Scripted::ok(Stage::ExtractAudio),
        Scripted::ok(Stage::IsolateVocal),
        Scripted::ok(Stage::Transcribe),
    )
    .unwrap();
    let mut rt = runtime(config(&dir, true), executors);
    rt.start_loops();

    let ingested = ingest_file(&source(&dir, b"no subs"), &rt.paths).unwrap();
    rt.orchestrator
        .submit(&ingested.fingerprint, &ingested.source_ref)
        .unwrap();

    let report = tokio::time::timeout(
        Duration::from_secs(20),
        rt.wait_for(&ingested.fingerprint, Duration::from_millis(50)),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(report.status, Lifecycle::Succeeded);

    let history = rt.orchestrator.history(&ingested.fingerprint).unwrap();
    let stages: Vec<Stage> = history.iter().map(|t| t.stage).collect();
    assert_eq!(stages, Stage::ALL.to_vec());
    assert!(history
        .iter()
        .all(|t| t.outcome == Some(TaskOutcome::Succeeded)));

    rt.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn executor_error_fails_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let executors = ExecutorSet::new(
        Scripted::nothing(Stage::ExtractSubtitles),
        Scripted::ok(Stage::ExtractAudio),
        Scripted::failing(Stage::IsolateVocal, "model not found"),
        Scripted::ok(Stage::Transcribe),
    )
    .unwrap();
    let mut rt = runtime(config(&dir, false), executors);
    rt.start_loops();

    let ingested = ingest_file(&source(&dir, b"broken"), &rt.paths).unwrap();
    rt.orchestrator
        .submit(&ingested.fingerprint, &ingested.source_ref)
        .unwrap();

    let report = tokio::time::timeout(
        Duration::from_secs(20),
        rt.wait_for(&ingested.fingerprint, Duration::from_millis(50)),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(report.status, Lifecycle::Failed);
    assert_eq!(report.stage, Some(Stage::IsolateVocal));
    assert!(report.error.unwrap().contains("model not found"));

    rt.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interrupted_run_is_recovered_before_resubmit() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, false);
    let pool = open_ledger(&config).unwrap();
    let paths = StoragePaths::new(&config.storage.data_dir);
    let ingested = ingest_file(&source(&dir, b"interrupted"), &paths).unwrap();

    // A previous process dispatched stage one and exited without a result.
    let previous = Orchestrator::new(
        pool.clone(),
        Arc::new(ManualBroker::default()),
        Arc::new(EventBus::default()),
        config.pipeline.clone(),
    );
    let stale = previous
        .submit(&ingested.fingerprint, &ingested.source_ref)
        .unwrap()
        .task
        .unwrap();

    let executors = ExecutorSet::new(
        Scripted::nothing(Stage::ExtractSubtitles),
        Scripted::ok(Stage::ExtractAudio),
        Scripted::ok(Stage::IsolateVocal),
        Scripted::ok(Stage::Transcribe),
    )
    .unwrap();
    let mut rt =
        Runtime::with_executors(config, pool, Arc::new(ToolRegistry::default()), executors)
            .unwrap();
    assert_eq!(rt.recover().await.unwrap(), 1);
    assert_eq!(rt.recover().await.unwrap(), 0);
    rt.start_loops();

    let out = rt
        .orchestrator
        .submit(&ingested.fingerprint, &ingested.source_ref)
        .unwrap();
    assert_ne!(out.task, Some(stale));

    let report = tokio::time::timeout(
        Duration::from_secs(20),
        rt.wait_for(&ingested.fingerprint, Duration::from_millis(50)),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(report.status, Lifecycle::Succeeded);

    let history = rt.orchestrator.history(&ingested.fingerprint).unwrap();
    assert_eq!(history[0].id, stale);
    assert_eq!(history[0].outcome, Some(TaskOutcome::Abandoned));
    assert_eq!(history.len(), 4);

    rt.shutdown().await;
}
