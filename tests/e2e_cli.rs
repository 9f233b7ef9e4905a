//! Command-line smoke tests against the built binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn scribeforge() -> Command {
    let mut cmd = Command::cargo_bin("scribeforge").unwrap();
    cmd.env("RUST_LOG", "error");
    cmd
}

/// Config file pointing the ledger and data root into `dir`.
fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("scribeforge.toml");
    let body = format!(
        r#"
[ledger]
db_path = "{db}"

[storage]
data_dir = "{data}"

[pipeline]
workers = 1
stage_timeout_secs = 600
"#,
        db = dir.path().join("ledger.db").display(),
        data = dir.path().join("data").display(),
    );
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn help_lists_commands() {
    scribeforge()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("process"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("check-tools"));
}

#[test]
fn version_prints_package_version() {
    scribeforge()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn validate_reads_config_file() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    scribeforge()
        .arg("validate")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Stage timeout: 600s"));
}

#[test]
fn validate_rejects_zero_timeout() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[pipeline]\nstage_timeout_secs = 0\n").unwrap();

    scribeforge().arg("validate").arg(&path).assert().failure();
}

#[test]
fn db_init_then_stats_json() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    scribeforge()
        .args(["db", "init", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Ledger ready"));
    assert!(dir.path().join("ledger.db").exists());

    let out = scribeforge()
        .args(["db", "stats", "--json", "--config"])
        .arg(&config)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stats: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(stats["files"], 0);
    assert_eq!(stats["tasks"], 0);
    assert_eq!(stats["live_tasks"], 0);
}

#[test]
fn status_of_unknown_fingerprint_is_absent() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    scribeforge()
        .args(["status", "feedface", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Status: absent"));
}

#[test]
fn status_rejects_malformed_fingerprint() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    scribeforge()
        .args(["status", "../etc/passwd", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid character"));
}

#[test]
fn process_requires_existing_files() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    scribeforge()
        .args(["process", "/no/such/movie.mkv", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn check_tools_always_reports() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    scribeforge()
        .args(["check-tools", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"));
}

#[test]
fn list_on_empty_ledger() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    scribeforge()
        .args(["list", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("No records"));

    scribeforge()
        .args(["list", "--status", "bogus", "--config"])
        .arg(&config)
        .assert()
        .failure();
}
