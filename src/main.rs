mod cli;

use scribeforge::{config, ingest, runtime::Runtime};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, DbCommand};
use sf_core::{FileStatus, Fingerprint};
use sf_db::queries::{files, maintenance};
use std::path::{Path, PathBuf};
use std::time::Duration;

async fn start_daemon(config: config::Config) -> Result<()> {
    tracing::info!("Starting scribeforge");
    tracing::info!("Ledger: {:?}", config.ledger.db_path);
    tracing::info!("Data directory: {:?}", config.storage.data_dir);

    let mut runtime = Runtime::build(config).await?;

    // Tasks left live by a crashed process resume from their stage boundary.
    let recovered = runtime.recover().await?;
    if recovered > 0 {
        tracing::info!("Recovered {} in-flight stages", recovered);
    }

    runtime.start_loops();
    runtime.start_watcher()?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down...");
    runtime.shutdown().await;
    Ok(())
}

async fn process_files(
    config: config::Config,
    files: Vec<PathBuf>,
    reprocess: bool,
    json: bool,
) -> Result<()> {
    for file in &files {
        if !file.is_file() {
            anyhow::bail!("Input file does not exist: {:?}", file);
        }
    }

    let mut runtime = Runtime::build(config).await?;

    // An interrupted earlier run may still own the live task for a file.
    let recovered = runtime.recover().await?;
    if recovered > 0 {
        tracing::info!("Recovered {} in-flight stages", recovered);
    }
    runtime.start_loops();

    let mut submitted = Vec::with_capacity(files.len());
    for file in files {
        let paths = runtime.paths.clone();
        let orchestrator = runtime.orchestrator.clone();
        let source = file.clone();
        let (ingested, outcome) = tokio::task::spawn_blocking(move || -> Result<_> {
            let ingested = ingest::ingest_file(&source, &paths)?;
            let outcome = if reprocess {
                orchestrator.reprocess(&ingested.fingerprint, &ingested.source_ref)?
            } else {
                orchestrator.submit(&ingested.fingerprint, &ingested.source_ref)?
            };
            Ok((ingested, outcome))
        })
        .await??;

        if !json {
            println!("{}  {}  {}", ingested.fingerprint, outcome.status, file.display());
        }
        submitted.push((file, ingested.fingerprint));
    }

    let mut reports = Vec::with_capacity(submitted.len());
    let mut failed = 0;
    for (file, fp) in &submitted {
        let report = runtime.wait_for(fp, Duration::from_secs(2)).await?;
        let outputs = runtime.orchestrator.outputs(fp)?;

        if report.status != scribeforge::orchestrator::Lifecycle::Succeeded {
            failed += 1;
        }
        if json {
            reports.push(serde_json::json!({
                "file": file,
                "status": report,
                "outputs": outputs
                    .iter()
                    .map(|(stage, output)| (stage.as_str(), output))
                    .collect::<std::collections::BTreeMap<_, _>>(),
            }));
        } else {
            println!("\n{}", file.display());
            print_report(&report);
            for (stage, output) in &outputs {
                println!("  {:<18} {}", stage.as_str(), output);
            }
        }
    }

    runtime.shutdown().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    if failed > 0 {
        anyhow::bail!("{} of {} file(s) failed", failed, submitted.len());
    }
    Ok(())
}

async fn show_status(config: config::Config, fingerprint: &str, json: bool) -> Result<()> {
    let fp = Fingerprint::parse(fingerprint)?;
    let runtime = Runtime::build(config).await?;
    let report = runtime.orchestrator.status(&fp)?;

    if json {
        let history = runtime.orchestrator.history(&fp)?;
        let body = serde_json::json!({ "status": report, "tasks": history });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        print_report(&report);
    }
    runtime.shutdown().await;
    Ok(())
}

async fn show_outputs(config: config::Config, fingerprint: &str) -> Result<()> {
    let fp = Fingerprint::parse(fingerprint)?;
    let runtime = Runtime::build(config).await?;
    let outputs = runtime.orchestrator.outputs(&fp)?;

    if outputs.is_empty() {
        println!("No outputs recorded for {}", fp);
    }
    for (stage, output) in &outputs {
        println!("{:<18} {}", stage.as_str(), output);
    }
    runtime.shutdown().await;
    Ok(())
}

fn list_records(config: &config::Config, status: Option<&str>, json: bool) -> Result<()> {
    let status = status.map(str::parse::<FileStatus>).transpose()?;
    let pool = scribeforge::runtime::open_ledger(config)?;
    let conn = sf_db::pool::get_conn(&pool)?;
    let records = files::list(&conn, status)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No records");
    }
    for record in &records {
        let stage = record.current_stage.map(|s| s.as_str()).unwrap_or("-");
        println!(
            "{}  {:<12} {:<18} {}",
            record.fingerprint,
            record.status.as_str(),
            stage,
            record.updated_at
        );
    }
    Ok(())
}

fn print_report(report: &scribeforge::orchestrator::StatusReport) {
    println!("Fingerprint: {}", report.fingerprint);
    println!("Status: {}", report.status);
    if let Some(plan) = report.plan {
        println!("Plan: {}", plan.as_str());
    }
    if let Some(stage) = report.stage {
        println!("Stage: {}", stage);
    }
    if let Some(task) = report.task {
        println!("Task: {}", task);
    }
    if let Some(ref error) = report.error {
        println!("Error: {}", error);
    }
}

fn db_command(config: &config::Config, action: DbCommand) -> Result<()> {
    let db_path = config.ledger.db_path.to_string_lossy().to_string();
    match action {
        DbCommand::Init => {
            scribeforge::runtime::open_ledger(config)?;
            println!("Ledger ready at {}", db_path);
        }
        DbCommand::Stats { json } => {
            let pool = scribeforge::runtime::open_ledger(config)?;
            let conn = sf_db::pool::get_conn(&pool)?;
            let stats = maintenance::stats(&conn)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Files: {}", stats.files);
                for (status, count) in &stats.files_by_status {
                    println!("  {}: {}", status, count);
                }
                println!("Tasks: {}", stats.tasks);
                for (outcome, count) in &stats.tasks_by_outcome {
                    println!("  {}: {}", outcome, count);
                }
                println!("Live tasks: {}", stats.live_tasks);
            }
        }
        DbCommand::Clear => {
            let pool = scribeforge::runtime::open_ledger(config)?;
            let conn = sf_db::pool::get_conn(&pool)?;
            let (files, tasks) = maintenance::clear(&conn)?;
            println!("Deleted {} file records and {} tasks", files, tasks);
        }
        DbCommand::Reset => {
            sf_db::pool::remove_database(&db_path)?;
            scribeforge::runtime::open_ledger(config)?;
            println!("Ledger recreated at {}", db_path);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise the verbose flag picks the defaults.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "scribeforge=trace,sf_pipeline=debug,sf_av=debug,sf_db=debug,sf_core=debug".to_string()
        } else {
            "scribeforge=info,sf_pipeline=info,sf_av=info,sf_db=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_daemon(config))
        }
        Commands::Process {
            files,
            reprocess,
            json,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(process_files(config, files, reprocess, json))
        }
        Commands::Status { fingerprint, json } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(show_status(config, &fingerprint, json))
        }
        Commands::List { status, json } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            list_records(&config, status.as_deref(), json)
        }
        Commands::Outputs { fingerprint } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(show_outputs(config, &fingerprint))
        }
        Commands::Db { action } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            db_command(&config, action)
        }
        Commands::CheckTools => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            check_tools(&config)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("scribeforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn check_tools(config: &config::Config) -> Result<()> {
    println!("Checking external tools...\n");

    let registry = scribeforge::runtime::discover_tools(config);

    for tool in &registry.check_all() {
        let status = if tool.available { "✓" } else { "✗" };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    let missing = registry.missing();
    if missing.is_empty() {
        println!("All required tools are available!");
    } else {
        println!(
            "Missing: {}. Stages that need them will fail.",
            missing.join(", ")
        );
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Ledger: {:?}", config.ledger.db_path);
    println!("  Data directory: {:?}", config.storage.data_dir);
    println!("  Plan: {}", config.pipeline.plan().as_str());
    println!("  Workers: {}", config.pipeline.workers);
    println!("  Stage timeout: {}s", config.pipeline.stage_timeout_secs);
    println!("  Watch enabled: {}", config.watch.enabled);
    println!("  Watch paths: {}", config.watch.paths.len());
    for warning in config.validate() {
        println!("  ! {}", warning);
    }

    Ok(())
}
