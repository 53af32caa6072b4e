//! Concurrency tests for the regimen binary.
//!
//! These tests verify that multiple processes can safely record doses and
//! read status against the same items file without losing entries.

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use std::thread;
use tempfile::TempDir;

fn cli(dir: &Path) -> Command {
    let config_path = dir.join("config.toml");
    if !config_path.exists() {
        std::fs::write(&config_path, "").expect("Failed to write config");
    }

    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("regimen"));
    cmd.arg("--data-dir")
        .arg(dir.join("data"))
        .arg("--config")
        .arg(&config_path);
    cmd
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn history_len(dir: &Path) -> usize {
    let contents =
        std::fs::read_to_string(dir.join("data/items.json")).expect("Failed to read items");
    let records: serde_json::Value = serde_json::from_str(&contents).expect("Invalid items file");
    records[0]["history"]
        .as_array()
        .expect("history is not a list")
        .len()
}

#[test]
fn test_concurrent_takes_are_all_recorded() {
    let temp_dir = setup_test_dir();
    let dir: PathBuf = temp_dir.path().to_path_buf();

    cli(&dir)
        .args(["add", "Ibuprofen", "--frequency", "as_needed"])
        .assert()
        .success();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let dir = dir.clone();
            thread::spawn(move || {
                let at = format!("2025-08-07T{:02}:00:00+02:00", 8 + i);
                cli(&dir)
                    .args(["--at", &at, "take", "Ibuprofen"])
                    .assert()
                    .success();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_eq!(history_len(&dir), 8);
}

#[test]
fn test_concurrent_reads_and_writes() {
    let temp_dir = setup_test_dir();
    let dir: PathBuf = temp_dir.path().to_path_buf();

    cli(&dir)
        .args(["add", "Metformin", "--time", "08:00", "--time", "20:00"])
        .assert()
        .success();

    let writers: Vec<_> = (0..4)
        .map(|i| {
            let dir = dir.clone();
            thread::spawn(move || {
                let at = format!("2025-08-0{}T08:15:00+02:00", 1 + i);
                cli(&dir)
                    .args(["--at", &at, "take", "Metformin"])
                    .assert()
                    .success();
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let dir = dir.clone();
            thread::spawn(move || {
                cli(&dir)
                    .args(["--at", "2025-08-07T12:00:00+02:00", "status"])
                    .assert()
                    .success();
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().expect("Thread panicked");
    }

    assert_eq!(history_len(&dir), 4);

    let extras: Vec<_> = std::fs::read_dir(dir.join("data"))
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name != "items.json" && name != "items.json.lock")
        .collect();
    assert!(extras.is_empty(), "Unexpected files: {:?}", extras);
}
