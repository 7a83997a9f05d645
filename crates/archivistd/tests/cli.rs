//! Integration tests for the archivistd CLI's singleton/stop lifecycle.
//!
//! Runs against a temporary watch directory so no test touches a real
//! scan folder or bibliographic store.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::tempdir;

fn archivistd() -> Command { Command::cargo_bin("archivistd").unwrap() }

fn write_config(watch_dir: &PathBuf) -> (tempfile::TempDir, PathBuf) {
  let dir = tempdir().unwrap();
  let config_path = dir.path().join("archivist.toml");
  std::fs::write(
    &config_path,
    format!(
      "[paths]\nscanner_papers_dir = {:?}\npublications_dir = {:?}\nlocal_store_db_path = {:?}\nlog_dir = {:?}\n",
      watch_dir.display(),
      watch_dir.join("pubs").display(),
      watch_dir.join("store.sqlite").display(),
      watch_dir.join("logs").display(),
    ),
  )
  .unwrap();
  (dir, config_path)
}

#[test]
#[serial]
fn stop_with_no_running_daemon_exits_cleanly() {
  let watch_dir = tempdir().unwrap();
  std::fs::create_dir_all(watch_dir.path()).unwrap();
  let (config_dir, config_path) = write_config(&watch_dir.path().to_path_buf());

  archivistd()
    .arg("--config")
    .arg(&config_path)
    .arg("--local-config")
    .arg(config_dir.path().join("missing.local.toml"))
    .arg("stop")
    .assert()
    .success()
    .stdout(predicate::str::contains("No running daemon found"));
}

#[test]
#[serial]
fn start_fails_cleanly_when_watch_dir_does_not_exist() {
  let dir = tempdir().unwrap();
  let missing_watch_dir = dir.path().join("does-not-exist");
  let (config_dir, config_path) = write_config(&missing_watch_dir);

  archivistd()
    .arg("--config")
    .arg(&config_path)
    .arg("--local-config")
    .arg(config_dir.path().join("missing.local.toml"))
    .arg("start")
    .assert()
    .failure();
}
