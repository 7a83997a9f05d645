//! Polling file observer (C11's non-interactive half).
//!
//! Native filesystem-event mechanisms are unreliable on the host-mounted
//! volumes this daemon watches, so observation is polling-only, mandated by
//! spec rather than a fallback. This module implements its own filter and
//! two-consecutive-poll size/mtime stability wait directly, rather than
//! building on an event-notification crate whose change events don't map
//! onto that stability policy cleanly.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  time::SystemTime,
};

use archivist::config::Config;
use tracing::debug;

use crate::errors::ArchivistdErrors;

/// Subdirectories under the watch directory that are never scanned for new
/// input, since they hold already-finalized or in-progress-elsewhere files.
const EXCLUDED_SUBDIRS: &[&str] = &["done", "failed", "skipped", "manual"];

/// A file observed stable across two consecutive polls, ready to process.
#[derive(Debug, Clone)]
pub struct ReadyEntry {
  pub path:          PathBuf,
  pub language_hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Snapshot {
  size:  u64,
  mtime: Option<SystemTime>,
}

/// Tracks per-file size/mtime snapshots across polls to implement the
/// stability wait, and filters by language-prefix/`.pdf`-suffix/excluded
/// subdirectory.
pub struct Watcher {
  watch_dir:         PathBuf,
  language_prefixes: Vec<String>,
  seen:              std::cell::RefCell<HashMap<PathBuf, Snapshot>>,
}

impl Watcher {
  pub fn new(watch_dir: &Path, config: &Config) -> Self {
    Self {
      watch_dir:         watch_dir.to_path_buf(),
      language_prefixes: config.language_prefixes.enabled.clone(),
      seen:              std::cell::RefCell::new(HashMap::new()),
    }
  }

  /// Scans the watch directory once, returning every file that has been
  /// stable (unchanged size+mtime) across this and the previous poll.
  pub async fn poll_once(&self) -> Result<Vec<ReadyEntry>, ArchivistdErrors> {
    let mut ready = Vec::new();
    let mut current: HashMap<PathBuf, Snapshot> = HashMap::new();

    let entries = std::fs::read_dir(&self.watch_dir)?;
    for entry in entries {
      let entry = entry?;
      let path = entry.path();
      if !path.is_file() {
        continue;
      }
      let Some(language_hint) = self.matches_filter(&path) else { continue };

      let metadata = entry.metadata()?;
      let snapshot = Snapshot { size: metadata.len(), mtime: metadata.modified().ok() };
      current.insert(path.clone(), snapshot);

      if self.seen.borrow().get(&path) == Some(&snapshot) {
        debug!(?path, "stable across two polls, ready to process");
        ready.push(ReadyEntry { path, language_hint });
      }
    }

    *self.seen.borrow_mut() = current;
    Ok(ready)
  }

  /// Returns the language hint for `path` if it passes the prefix/suffix/
  /// excluded-subdir filter, `None` otherwise.
  fn matches_filter(&self, path: &Path) -> Option<String> {
    if !path.extension().is_some_and(|e| e.eq_ignore_ascii_case("pdf")) {
      return None;
    }
    if path.parent().is_some_and(|parent| {
      EXCLUDED_SUBDIRS.iter().any(|sub| parent.ends_with(sub))
    }) {
      return None;
    }
    let stem = path.file_stem()?.to_str()?;
    self
      .language_prefixes
      .iter()
      .find(|prefix| stem.starts_with(format!("{prefix}_").as_str()))
      .cloned()
  }
}

/// Reads the first-N-page text layer for `pdf_path`. PDF text-layer
/// extraction and OCR are external collaborators this crate treats as
/// opaque (spec.md §1's out-of-scope list); this reads whatever sidecar
/// `.txt` dump the scanning pipeline already wrote next to the PDF,
/// falling back to an empty string (which simply pushes every extraction
/// stage down to the AI oracle, or to total-failure guided entry).
pub fn extract_first_pages_text(pdf_path: &Path, _max_pages: u32) -> Result<String, ArchivistdErrors> {
  let sidecar = pdf_path.with_extension("txt");
  match std::fs::read_to_string(&sidecar) {
    Ok(text) => Ok(text),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
    Err(e) => Err(e.into()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config_with_prefixes(prefixes: &[&str]) -> Config {
    let mut config = Config::default();
    config.language_prefixes.enabled = prefixes.iter().map(|s| s.to_string()).collect();
    config
  }

  #[tokio::test]
  async fn ignores_file_with_unconfigured_prefix() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("FR_20260101_120000_3.pdf"), b"x").unwrap();
    let watcher = Watcher::new(dir.path(), &config_with_prefixes(&["NO", "EN"]));
    let ready = watcher.poll_once().await.unwrap();
    assert!(ready.is_empty());
  }

  #[tokio::test]
  async fn requires_two_stable_polls_before_ready() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("NO_20260101_120000_3.pdf"), b"x").unwrap();
    let watcher = Watcher::new(dir.path(), &config_with_prefixes(&["NO"]));

    let first = watcher.poll_once().await.unwrap();
    assert!(first.is_empty());

    let second = watcher.poll_once().await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].language_hint.as_deref(), Some("NO"));
  }

  #[tokio::test]
  async fn non_recursive_scan_never_observes_files_in_done_subdir() {
    let dir = tempfile::tempdir().unwrap();
    let done = dir.path().join("done");
    std::fs::create_dir_all(&done).unwrap();
    std::fs::write(done.join("NO_20260101_120000_3.pdf"), b"x").unwrap();
    let watcher = Watcher::new(dir.path(), &config_with_prefixes(&["NO"]));

    watcher.poll_once().await.unwrap();
    let second = watcher.poll_once().await.unwrap();
    assert!(second.is_empty());
  }
}
