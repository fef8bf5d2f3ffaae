//! Concurrency tests for the medtrack binary.
//!
//! These tests verify that multiple processes can safely:
//! - Race on "take dose" without double-dosing (gate and append are locked together)
//! - Append back-dated doses simultaneously without losing or duplicating ids
//! - Read status while others write

use assert_cmd::Command;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::thread;
use tempfile::TempDir;

fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("medtrack"))
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn add_med(data_dir: &Path, min_interval: &str, max_per_day: &str) {
    cli()
        .args(["add-med", "Ibuprofen", "--min-interval", min_interval])
        .args(["--max-per-day", max_per_day])
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .success();
}

fn journal_lines(data_dir: &Path, op: &str) -> Vec<String> {
    let journal = std::fs::read_to_string(data_dir.join("journal/doses.wal"))
        .expect("Failed to read journal");
    let needle = format!("\"op\":\"{}\"", op);
    journal
        .lines()
        .filter(|l| l.contains(&needle))
        .map(str::to_string)
        .collect()
}

#[test]
fn test_concurrent_take_dose_records_exactly_one() {
    let temp_dir = setup_test_dir();
    let data_dir: PathBuf = temp_dir.path().to_path_buf();
    add_med(&data_dir, "8", "3");

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let data_dir = data_dir.clone();
            thread::spawn(move || {
                cli()
                    .args(["take", "1", "--data-dir"])
                    .arg(&data_dir)
                    .output()
                    .expect("Failed to run medtrack")
            })
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|out| out.status.success())
        .count();

    assert_eq!(successes, 1, "Exactly one concurrent dose should pass the gate");
    assert_eq!(journal_lines(&data_dir, "dose_recorded").len(), 1);
}

#[test]
fn test_concurrent_past_doses_get_unique_ids() {
    let temp_dir = setup_test_dir();
    let data_dir: PathBuf = temp_dir.path().to_path_buf();
    add_med(&data_dir, "0", "50");

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let data_dir = data_dir.clone();
            thread::spawn(move || {
                cli()
                    .args(["add-past", "1"])
                    .arg(format!("2024-03-10T{:02}:00", i))
                    .arg("--data-dir")
                    .arg(&data_dir)
                    .assert()
                    .success();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let lines = journal_lines(&data_dir, "dose_recorded");
    assert_eq!(lines.len(), 8);

    let ids: HashSet<_> = lines
        .iter()
        .map(|l| {
            let start = l.find("\"id\":").unwrap() + 5;
            let end = l[start..].find(',').unwrap() + start;
            l[start..end].to_string()
        })
        .collect();
    assert_eq!(ids.len(), 8, "Dose ids must be unique: {:?}", lines);
}

#[test]
fn test_status_reads_while_writing() {
    let temp_dir = setup_test_dir();
    let data_dir: PathBuf = temp_dir.path().to_path_buf();
    add_med(&data_dir, "0", "50");

    let writer = {
        let data_dir = data_dir.clone();
        thread::spawn(move || {
            for h in 0..5 {
                cli()
                    .args(["add-past", "1"])
                    .arg(format!("2024-03-09T{:02}:30", h))
                    .arg("--data-dir")
                    .arg(&data_dir)
                    .assert()
                    .success();
            }
        })
    };

    for _ in 0..5 {
        cli()
            .arg("status")
            .arg("--data-dir")
            .arg(&data_dir)
            .assert()
            .success();
    }

    writer.join().unwrap();
    assert_eq!(journal_lines(&data_dir, "dose_recorded").len(), 5);
}
