//! End-to-end runs of the `staleprobe` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use staleprobe::document::ContainerDocument;
use tempfile::TempDir;

fn staleprobe() -> Command {
    let mut cmd = Command::cargo_bin("staleprobe").unwrap();
    cmd.env_remove("STALEPROBE_BASE_DIR")
        .env_remove("STALEPROBE_OWNER")
        .env_remove("STALEPROBE_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    staleprobe()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("documents"))
        .stdout(predicate::str::contains("probe"));
}

#[test]
fn test_documents_single_round() {
    let temp = TempDir::new().unwrap();

    staleprobe()
        .arg("--base-dir")
        .arg(temp.path())
        .args([
            "documents",
            "--no-align",
            "--rounds",
            "1",
            "--items",
            "3",
            "--delay-ms",
            "0",
            "--owner",
            "node-a",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("appended 3 entries, 0 stale reads"));

    let documents: Vec<_> = std::fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name().unwrap().to_string_lossy().starts_with("containers_")
                && p.extension().is_some_and(|ext| ext == "xml")
        })
        .collect();
    assert_eq!(documents.len(), 1, "{documents:?}");

    let document = ContainerDocument::from_xml(&std::fs::read(&documents[0]).unwrap()).unwrap();
    let indices: Vec<u32> = document.entries().iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    assert!(document.entries().iter().all(|e| e.name == "node-a"));
}

#[test]
fn test_probe_missing_file_is_consistent() {
    let temp = TempDir::new().unwrap();

    staleprobe()
        .arg("--base-dir")
        .arg(temp.path())
        .args(["probe", "missing.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("exists=false, listed=false"))
        .stdout(predicate::str::contains("consistent"));
}

#[test]
fn test_watch_creates_marker() {
    let temp = TempDir::new().unwrap();

    staleprobe()
        .arg("--base-dir")
        .arg(temp.path())
        .args([
            "watch",
            "--no-align",
            "--iterations",
            "3",
            "--interval-ms",
            "10",
            "--create-at",
            "1",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("exists: false, listed: false"))
        .stdout(predicate::str::contains("exists: true, listed: true"));

    assert!(temp.path().join("test.txt").is_file());
}

#[test]
fn test_invalid_config_is_reported() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("staleprobe.toml");
    std::fs::write(&config, "probe_interval_ms = 0\n").unwrap();

    staleprobe()
        .arg("--config")
        .arg(&config)
        .arg("--base-dir")
        .arg(temp.path())
        .args(["probe", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("probe_interval_ms"));
}
