//! Daemon lifecycle: PID-file singleton discipline, optional remote-
//! singleton probe, the poll-process-approve main loop, and the
//! append-only processing log (C11's non-interactive half).
//!
//! Grounded on `learnerd::daemon`'s PID-file stop/SIGTERM handling, stripped
//! of the `daemonize`/systemd background-service machinery the spec doesn't
//! ask for: this daemon runs in the foreground, single-threaded, per
//! spec.md §4.11/§5.

use std::{
  fs,
  io::Write,
  path::{Path, PathBuf},
  time::{SystemTime, UNIX_EPOCH},
};

use archivist::{
  cascade::{self, CascadeOptions},
  config::Config,
  placement::MountTable,
};
use nix::{
  sys::signal::{self, Signal},
  unistd::Pid,
};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::{
  approval::{self, tty::Tty},
  errors::ArchivistdErrors,
  watcher::Watcher,
};

/// Name of the PID file written under the watch directory.
pub const PID_FILE_NAME: &str = ".daemon.pid";

/// Name of the append-only per-document processing log.
const PROCESSING_LOG_NAME: &str = "processing.csv";

/// Runtime record of this daemon instance — not persisted beyond the PID
/// file, which carries only the `pid` field.
#[derive(Debug, Clone)]
pub struct DaemonState {
  pub pid:           i32,
  pub started_at:    u64,
  pub watch_dir:     PathBuf,
  pub lockfile_path: PathBuf,
}

/// Owns the watch directory's subdirectory layout, the singleton lock, and
/// the poll-process loop.
pub struct Daemon {
  config: Config,
  state:  DaemonState,
}

impl Daemon {
  /// Acquires the local (and, if configured, remote) singleton lock and
  /// prepares the watch directory's subdirectories. Returns `Ok(None)` if
  /// another instance is already running locally (the "already running"
  /// exit-0 case from the `start` subcommand); `Err` on any other failure.
  pub async fn acquire(config: Config) -> Result<Option<Self>, ArchivistdErrors> {
    let watch_dir = config.paths.scanner_papers_dir.clone();
    if !watch_dir.exists() {
      return Err(ArchivistdErrors::WatchDirInvalid(format!(
        "{} does not exist",
        watch_dir.display()
      )));
    }
    for sub in ["done", "failed", "skipped", "manual"] {
      fs::create_dir_all(watch_dir.join(sub))?;
    }

    let lockfile_path = watch_dir.join(PID_FILE_NAME);
    if let Some(existing_pid) = read_live_matching_pid(&lockfile_path)? {
      info!(pid = existing_pid, "daemon already running, exiting cleanly");
      return Ok(None);
    }

    if let Some(host) = config.daemon.remote_check_host.clone() {
      if remote_daemon_active(&host).await {
        return Err(ArchivistdErrors::RemoteSingletonActive(host));
      }
    }

    let pid = std::process::id() as i32;
    fs::write(&lockfile_path, pid.to_string())?;

    let started_at = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    Ok(Some(Self {
      config,
      state: DaemonState { pid, started_at, watch_dir, lockfile_path },
    }))
  }

  /// Runs the poll-process-approve loop until cancelled. Always removes the
  /// PID file on the way out, including on error paths.
  pub async fn run(self, cancel: tokio::sync::watch::Receiver<bool>) -> Result<(), ArchivistdErrors> {
    let result = self.run_inner(cancel).await;
    if let Err(e) = fs::remove_file(&self.state.lockfile_path) {
      warn!(error = %e, "failed to remove pid file on shutdown");
    }
    result
  }

  async fn run_inner(&self, mut cancel: tokio::sync::watch::Receiver<bool>) -> Result<(), ArchivistdErrors> {
    let watcher = Watcher::new(&self.state.watch_dir, &self.config);
    let mount_table = MountTable::default();
    let mut tty = Tty::new();

    loop {
      if *cancel.borrow() {
        info!("shutdown signal received, stopping observer");
        return Ok(());
      }

      let ready = tokio::select! {
        ready = watcher.poll_once() => ready?,
        _ = cancel.changed() => {
          info!("shutdown signal received mid-poll");
          return Ok(());
        }
      };

      for entry in ready {
        if *cancel.borrow() {
          info!("cancellation observed before next document; leaving it in place");
          return Ok(());
        }
        if !self.process_one(&entry.path, entry.language_hint, &mount_table, &mut tty).await? {
          info!("user quit the interactive flow; shutting down, document left in place");
          return Ok(());
        }
      }

      tokio::select! {
        _ = tokio::time::sleep(std::time::Duration::from_secs(self.config.daemon.poll_interval_seconds)) => {},
        _ = cancel.changed() => {
          info!("shutdown signal received during poll interval");
          return Ok(());
        }
      }
    }
  }

  /// Processes one document to completion. Returns `false` if the user quit
  /// the interactive flow — the caller must stop the poll loop without
  /// touching `source_path`, per spec's "cancellation is non-destructive"
  /// rule; `true` otherwise (the document was finalized into one of
  /// `done/`/`skipped/`/`failed/`/`manual/`).
  async fn process_one(
    &self,
    source_path: &Path,
    language_hint: Option<String>,
    mount_table: &MountTable,
    tty: &mut Tty,
  ) -> Result<bool, ArchivistdErrors> {
    let start = std::time::Instant::now();
    let bytes = fs::read(source_path)?;
    let text = crate::watcher::extract_first_pages_text(source_path, 2)?;

    let result = cascade::run(
      source_path.to_path_buf(),
      bytes,
      &text,
      language_hint,
      &self.config,
      &CascadeOptions::default(),
    )
    .await?;

    let mut paper = result.paper;
    paper.processing_time_seconds = start.elapsed().as_secs_f64();

    let outcome = approval::run_interactive(&mut paper, &self.config, mount_table, tty).await?;
    if matches!(outcome, approval::Outcome::QuitRequested) {
      return Ok(false);
    }
    self.finalize(source_path, &outcome)?;
    Ok(true)
  }

  fn finalize(&self, source_path: &Path, outcome: &approval::Outcome) -> Result<(), ArchivistdErrors> {
    let dest_dir = match outcome {
      approval::Outcome::Committed { .. } => self.state.watch_dir.join("done"),
      approval::Outcome::Skipped => self.state.watch_dir.join("skipped"),
      approval::Outcome::Failed(_) => self.state.watch_dir.join("failed"),
      approval::Outcome::Manual(_) => self.state.watch_dir.join("manual"),
      approval::Outcome::QuitRequested => {
        unreachable!("process_one returns early on QuitRequested before calling finalize")
      },
    };
    if let Some(file_name) = source_path.file_name() {
      let dest = dest_dir.join(file_name);
      fs::rename(source_path, &dest)?;
    }
    if let Err(e) = relocate_sidecar_files(source_path, &dest_dir) {
      warn!(error = %e, "failed to sweep sidecar files for this document");
    }
    log_csv(&self.state.watch_dir.join(PROCESSING_LOG_NAME), source_path, outcome)?;
    Ok(())
  }
}

/// Moves any auxiliary files the scanning pipeline dropped next to
/// `source_path` (e.g. the `.txt` text-layer dump `watcher::extract_first_pages_text`
/// reads) alongside it into `dest_dir`, so they don't accumulate as orphaned
/// debris in the watch directory root once the PDF itself has moved on.
fn relocate_sidecar_files(source_path: &Path, dest_dir: &Path) -> Result<(), ArchivistdErrors> {
  let Some(stem) = source_path.file_stem().and_then(|s| s.to_str()) else { return Ok(()) };
  let Some(parent) = source_path.parent() else { return Ok(()) };
  let pattern = format!("{}/{stem}.*", parent.display());

  for entry in glob::glob(&pattern)? {
    let Ok(path) = entry else { continue };
    if path == source_path {
      continue;
    }
    let Some(file_name) = path.file_name() else { continue };
    if let Err(e) = fs::rename(&path, dest_dir.join(file_name)) {
      warn!(error = %e, path = %path.display(), "failed to relocate sidecar file");
    }
  }
  Ok(())
}

/// Appends one row to the processing log: timestamp, source filename,
/// final state, item key (if created), target path (if written),
/// stage-of-success.
fn log_csv(log_path: &Path, source_path: &Path, outcome: &approval::Outcome) -> Result<(), ArchivistdErrors> {
  let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
  let source_name = source_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

  let (state, item_key, target_path) = match outcome {
    approval::Outcome::Committed { item_key, target_path, .. } => {
      ("done", item_key.clone().unwrap_or_default(), target_path.display().to_string())
    },
    approval::Outcome::Skipped => ("skipped", String::new(), String::new()),
    approval::Outcome::Failed(_) => ("failed", String::new(), String::new()),
    approval::Outcome::Manual(_) => ("manual", String::new(), String::new()),
    approval::Outcome::QuitRequested => {
      unreachable!("process_one returns early on QuitRequested before logging")
    },
  };

  let mut file = fs::OpenOptions::new().create(true).append(true).open(log_path)?;
  writeln!(file, "{timestamp},{source_name},{state},{item_key},{target_path}")?;
  Ok(())
}

/// Reads `lockfile_path`, returning the contained PID only if the process is
/// alive AND its command line matches this program's executable — a stale
/// PID reused by an unrelated process must not block startup.
fn read_live_matching_pid(lockfile_path: &Path) -> Result<Option<i32>, ArchivistdErrors> {
  let contents = match fs::read_to_string(lockfile_path) {
    Ok(c) => c,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(e.into()),
  };
  let Ok(pid) = contents.trim().parse::<i32>() else {
    let _ = fs::remove_file(lockfile_path);
    return Ok(None);
  };

  if !process_is_alive(pid) || !cmdline_matches_self(pid) {
    let _ = fs::remove_file(lockfile_path);
    return Ok(None);
  }
  Ok(Some(pid))
}

fn process_is_alive(pid: i32) -> bool { signal::kill(Pid::from_raw(pid), None).is_ok() }

#[cfg(target_os = "linux")]
fn cmdline_matches_self(pid: i32) -> bool {
  let Ok(cmdline) = fs::read(format!("/proc/{pid}/cmdline")) else { return false };
  let Ok(current) = std::env::current_exe() else { return false };
  let current_name = current.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
  cmdline.split(|b| *b == 0).next().is_some_and(|argv0| {
    String::from_utf8_lossy(argv0).ends_with(&current_name)
  })
}

#[cfg(not(target_os = "linux"))]
fn cmdline_matches_self(_pid: i32) -> bool {
  // No portable cmdline introspection off Linux; liveness alone gates reuse.
  true
}

/// Probes a configured remote host for TCP reachability plus a daemon
/// health endpoint, so two machines attached to the same bibliographic
/// store don't process it simultaneously.
async fn remote_daemon_active(host: &str) -> bool {
  if TcpStream::connect(host).await.is_err() {
    return false;
  }
  let health_url = format!("http://{host}/health");
  reqwest::Client::new()
    .get(&health_url)
    .timeout(std::time::Duration::from_secs(3))
    .send()
    .await
    .is_ok_and(|r| r.status().is_success())
}

/// Sends SIGTERM to `pid` and waits up to ~10s for the PID file to
/// disappear before giving up (the caller may choose to SIGKILL after).
pub fn send_sigterm(pid: i32) -> Result<(), ArchivistdErrors> {
  signal::kill(Pid::from_raw(pid), Signal::SIGTERM)
    .map_err(|e| ArchivistdErrors::Signal(e.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stale_lockfile_with_unparseable_contents_is_treated_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let lockfile = dir.path().join(PID_FILE_NAME);
    fs::write(&lockfile, "not-a-pid").unwrap();
    assert_eq!(read_live_matching_pid(&lockfile).unwrap(), None);
    assert!(!lockfile.exists());
  }

  #[test]
  fn missing_lockfile_returns_none() {
    let dir = tempfile::tempdir().unwrap();
    let lockfile = dir.path().join(PID_FILE_NAME);
    assert_eq!(read_live_matching_pid(&lockfile).unwrap(), None);
  }

  #[test]
  fn log_csv_appends_one_row_per_call() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join(PROCESSING_LOG_NAME);
    log_csv(&log_path, Path::new("NO_20260101_120000_8.pdf"), &approval::Outcome::Skipped).unwrap();
    log_csv(&log_path, Path::new("EN_20260102_130000_3.pdf"), &approval::Outcome::Skipped).unwrap();
    let contents = fs::read_to_string(&log_path).unwrap();
    assert_eq!(contents.lines().count(), 2);
  }

  #[test]
  fn relocate_sidecar_files_moves_same_stem_siblings_only() {
    let dir = tempfile::tempdir().unwrap();
    let done = dir.path().join("done");
    fs::create_dir_all(&done).unwrap();

    let pdf = dir.path().join("NO_20260101_120000_8.pdf");
    let sidecar = dir.path().join("NO_20260101_120000_8.txt");
    let unrelated = dir.path().join("NO_20260101_130000_2.txt");
    fs::write(&pdf, b"pdf bytes").unwrap();
    fs::write(&sidecar, b"page text").unwrap();
    fs::write(&unrelated, b"unrelated").unwrap();

    relocate_sidecar_files(&pdf, &done).unwrap();

    assert!(!sidecar.exists());
    assert!(done.join("NO_20260101_120000_8.txt").exists());
    assert!(unrelated.exists(), "sidecar for a different document must be left in place");
    assert!(pdf.exists(), "the pdf itself is relocated by the caller, not this helper");
  }
}
