//! File placement service (C9): hash/size dedup, target-path resolution, and
//! cross-boundary path translation between the local mount view and the
//! host-OS view the bibliographic store needs for linked attachments.

use std::{
  collections::BTreeMap,
  fs,
  path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::errors::ArchivistError;

/// Upper bound on `_scannedN` suffix attempts before giving up.
const MAX_SUFFIX_ATTEMPTS: u32 = 20;

/// What the placement algorithm decided to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementAction {
  /// An identical file already exists; nothing was written.
  ReuseExisting,
  /// Wrote the file at the originally proposed path.
  WriteNew,
  /// Wrote the file at a `_scannedN`-suffixed path due to a name collision
  /// with different content.
  WriteSuffixed,
  /// Verification failed twice; no usable target exists.
  Skip,
}

/// The outcome of a [`place`] call.
#[derive(Debug, Clone)]
pub struct PlacementDecision {
  pub action:             PlacementAction,
  pub target_absolute_path: PathBuf,
  pub cross_boundary_path:  Option<String>,
  pub existing_hash:        Option<String>,
  pub error:                Option<String>,
}

/// A mapping from a local mount-root prefix to its host-OS equivalent
/// (e.g. `/mnt/g` → `G:`), used to translate paths for the bibliographic
/// store, which is opened under a different OS view than this process.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
  roots: BTreeMap<String, String>,
}

impl MountTable {
  /// Builds a table from `(local_root, host_root)` pairs.
  pub fn new(roots: impl IntoIterator<Item = (String, String)>) -> Self {
    Self { roots: roots.into_iter().collect() }
  }

  /// Translates `path` to its host-OS form using the longest matching root,
  /// or `None` if no configured root prefixes it.
  pub fn translate(&self, path: &Path) -> Option<String> {
    let path_str = path.to_string_lossy().replace('\\', "/");
    let mut best: Option<(&String, &String)> = None;
    for (local_root, host_root) in &self.roots {
      if path_str.starts_with(local_root.as_str())
        && best.is_none_or(|(b, _)| local_root.len() > b.len())
      {
        best = Some((local_root, host_root));
      }
    }
    let (local_root, host_root) = best?;
    let remainder = &path_str[local_root.len()..];
    let remainder = remainder.trim_start_matches('/');
    let translated = if remainder.is_empty() {
      host_root.clone()
    } else {
      format!("{}\\{}", host_root.trim_end_matches(['\\', '/']), remainder.replace('/', "\\"))
    };
    Some(translated)
  }
}

/// What [`resolve`] decided, before any bytes move. Shares [`PlacementAction`]
/// with the post-write [`PlacementDecision`] so a caller can preview exactly
/// which branch a subsequent [`place`] call will take — this is what backs
/// the FINAL_CONFIRM summary's "target path and whether it reuses/writes"
/// line (spec §4.12), which must never itself write anything.
#[derive(Debug, Clone)]
pub struct PlacementPlan {
  pub action:              PlacementAction,
  pub target_absolute_path: PathBuf,
  pub existing_hash:        Option<String>,
}

/// Read-only dry run of the placement algorithm: publications-first reuse
/// search, then candidate/`_scannedN` collision walk, stopping the moment a
/// decision is reached. Performs no writes; safe to call before the user has
/// confirmed anything.
pub fn resolve(
  source_path: &Path,
  proposed_filename: &str,
  publications_dir: &Path,
) -> Result<PlacementPlan, ArchivistError> {
  let source_size = fs::metadata(source_path)?.len();

  if let Some(existing) = find_identical_in_dir(publications_dir, source_path, source_size)? {
    let hash = sha256_file(&existing)?;
    return Ok(PlacementPlan {
      action:               PlacementAction::ReuseExisting,
      target_absolute_path: existing,
      existing_hash:        Some(hash),
    });
  }

  let candidate = publications_dir.join(proposed_filename);
  if !candidate.exists() {
    return Ok(PlacementPlan {
      action:               PlacementAction::WriteNew,
      target_absolute_path: candidate,
      existing_hash:        None,
    });
  }
  if files_identical(source_path, &candidate, source_size)? {
    let hash = sha256_file(&candidate)?;
    return Ok(PlacementPlan {
      action:               PlacementAction::ReuseExisting,
      target_absolute_path: candidate,
      existing_hash:        Some(hash),
    });
  }

  let stem = candidate.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
  let ext = candidate.extension().map(|e| e.to_string_lossy().to_string()).unwrap_or_default();
  let parent = candidate.parent().unwrap_or(publications_dir).to_path_buf();

  for attempt in 1..=MAX_SUFFIX_ATTEMPTS {
    let suffix = if attempt == 1 { "_scanned".to_string() } else { format!("_scanned{attempt}") };
    let suffixed = parent.join(format!("{stem}{suffix}.{ext}"));
    if !suffixed.exists() {
      return Ok(PlacementPlan {
        action:               PlacementAction::WriteSuffixed,
        target_absolute_path: suffixed,
        existing_hash:        None,
      });
    }
    if files_identical(source_path, &suffixed, source_size)? {
      let hash = sha256_file(&suffixed)?;
      return Ok(PlacementPlan {
        action:               PlacementAction::ReuseExisting,
        target_absolute_path: suffixed,
        existing_hash:        Some(hash),
      });
    }
  }

  Ok(PlacementPlan {
    action:               PlacementAction::Skip,
    target_absolute_path: candidate,
    existing_hash:        None,
  })
}

/// Places `source_path` into `publications_dir` under `proposed_filename`,
/// implementing the publications-first reuse and `_scannedN` suffixing
/// algorithm. Never copies content that's already present, byte-for-byte,
/// anywhere the search step looks.
///
/// Runs [`resolve`] to decide, then performs the write (if any) that
/// decision calls for; the two steps share the exact same decision logic so
/// a prior `resolve` preview and this call always agree.
pub fn place(
  source_path: &Path,
  proposed_filename: &str,
  publications_dir: &Path,
  mount_table: &MountTable,
) -> Result<PlacementDecision, ArchivistError> {
  let source_size = fs::metadata(source_path)?.len();
  let plan = resolve(source_path, proposed_filename, publications_dir)?;

  match plan.action {
    PlacementAction::ReuseExisting => Ok(PlacementDecision {
      cross_boundary_path:  mount_table.translate(&plan.target_absolute_path),
      action:               plan.action,
      target_absolute_path: plan.target_absolute_path,
      existing_hash:        plan.existing_hash,
      error:                None,
    }),
    PlacementAction::WriteNew | PlacementAction::WriteSuffixed => write_verified(
      source_path,
      &plan.target_absolute_path,
      source_size,
      mount_table,
      plan.action,
    ),
    PlacementAction::Skip => Ok(PlacementDecision {
      action:               PlacementAction::Skip,
      target_absolute_path: plan.target_absolute_path,
      cross_boundary_path:  None,
      existing_hash:        None,
      error: Some(format!("exhausted {MAX_SUFFIX_ATTEMPTS} _scannedN suffix attempts")),
    }),
  }
}

/// Searches `dir` (non-recursively) for a file whose size matches
/// `source_size` and whose content is bit-identical to `source_path`.
fn find_identical_in_dir(
  dir: &Path,
  source_path: &Path,
  source_size: u64,
) -> Result<Option<PathBuf>, ArchivistError> {
  if !dir.exists() {
    return Ok(None);
  }
  for entry in fs::read_dir(dir)? {
    let entry = entry?;
    let path = entry.path();
    if !path.is_file() {
      continue;
    }
    if entry.metadata()?.len() != source_size {
      continue;
    }
    if files_identical(source_path, &path, source_size)? {
      return Ok(Some(path));
    }
  }
  Ok(None)
}

fn files_identical(a: &Path, b: &Path, known_size: u64) -> Result<bool, ArchivistError> {
  if fs::metadata(b)?.len() != known_size {
    return Ok(false);
  }
  Ok(sha256_file(a)? == sha256_file(b)?)
}

fn sha256_file(path: &Path) -> Result<String, ArchivistError> {
  let bytes = fs::read(path)?;
  let mut hasher = Sha256::new();
  hasher.update(&bytes);
  Ok(format!("{:x}", hasher.finalize()))
}

/// Copies `source_path` to `target_path`, preferring a direct `fs::copy` from
/// this process's own mount view. Some destinations (host-mounted volumes
/// this process sees but can't write to directly) refuse that; spec.md §4.9
/// step 7 calls for falling back to an external-OS facility in that case, so
/// a failed `fs::copy` is followed by shelling out to the host's `cp`,
/// mirroring the teacher's own `install_system_daemon`'s use of a `cp`
/// subprocess to place a file the running process can't write directly.
fn copy_file(source_path: &Path, target_path: &Path) -> Result<(), ArchivistError> {
  if fs::copy(source_path, target_path).is_ok() {
    return Ok(());
  }

  debug!(?source_path, ?target_path, "direct copy failed, falling back to external cp");
  let status = std::process::Command::new("cp")
    .arg(source_path)
    .arg(target_path)
    .status()
    .map_err(|e| ArchivistError::CopyFailed(format!("cp subprocess failed to start: {e}")))?;

  if !status.success() {
    return Err(ArchivistError::CopyFailed(format!("cp subprocess exited with {status}")));
  }
  Ok(())
}

/// Copies `source_path` to `target_path` and verifies the written size
/// matches; retries the copy once on mismatch before giving up. `action`
/// identifies which placement decision this write fulfills (new vs.
/// suffixed) and is threaded through to the successful result unchanged —
/// a verification retry never changes what kind of write this was.
fn write_verified(
  source_path: &Path,
  target_path: &Path,
  expected_size: u64,
  mount_table: &MountTable,
  action: PlacementAction,
) -> Result<PlacementDecision, ArchivistError> {
  if let Some(parent) = target_path.parent() {
    fs::create_dir_all(parent)?;
  }

  for attempt in 0..2 {
    copy_file(source_path, target_path)?;
    let actual_size = fs::metadata(target_path)?.len();
    if actual_size == expected_size {
      return Ok(PlacementDecision {
        action: action.clone(),
        cross_boundary_path:  mount_table.translate(target_path),
        target_absolute_path: target_path.to_path_buf(),
        existing_hash:        None,
        error:                None,
      });
    }
    warn!(
      ?target_path,
      expected_size,
      actual_size,
      attempt,
      "placement verification mismatch, retrying"
    );
  }

  Ok(PlacementDecision {
    action:               PlacementAction::Skip,
    target_absolute_path:  target_path.to_path_buf(),
    cross_boundary_path:   None,
    existing_hash:         None,
    error:                 Some("placement verification failed after retry".to_string()),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn translates_mount_root_to_drive_letter() {
    let table = MountTable::new([("/mnt/g".to_string(), "G:".to_string())]);
    let translated = table.translate(Path::new("/mnt/g/My Drive/x.pdf")).unwrap();
    assert_eq!(translated, "G:\\My Drive\\x.pdf");
  }

  #[test]
  fn untranslatable_path_returns_none() {
    let table = MountTable::new([("/mnt/g".to_string(), "G:".to_string())]);
    assert!(table.translate(Path::new("/tmp/x.pdf")).is_none());
  }

  #[test]
  fn write_new_when_candidate_absent() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.pdf");
    fs::write(&source, b"hello world").unwrap();
    let pubs = dir.path().join("pubs");
    fs::create_dir_all(&pubs).unwrap();

    let decision = place(&source, "Target_2020_Title_scan.pdf", &pubs, &MountTable::default()).unwrap();
    assert_eq!(decision.action, PlacementAction::WriteNew);
    assert!(decision.target_absolute_path.exists());
  }

  #[test]
  fn reuses_identical_existing_file_without_copying() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.pdf");
    fs::write(&source, b"hello world").unwrap();
    let pubs = dir.path().join("pubs");
    fs::create_dir_all(&pubs).unwrap();
    let existing = pubs.join("Other_Name_scan.pdf");
    fs::write(&existing, b"hello world").unwrap();

    let decision = place(&source, "Target_2020_Title_scan.pdf", &pubs, &MountTable::default()).unwrap();
    assert_eq!(decision.action, PlacementAction::ReuseExisting);
    assert_eq!(decision.target_absolute_path, existing);
  }

  #[test]
  fn collision_with_different_content_gets_scanned_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.pdf");
    fs::write(&source, b"new content").unwrap();
    let pubs = dir.path().join("pubs");
    fs::create_dir_all(&pubs).unwrap();
    fs::write(pubs.join("Target_2020_Title_scan.pdf"), b"different content!!").unwrap();

    let decision = place(&source, "Target_2020_Title_scan.pdf", &pubs, &MountTable::default()).unwrap();
    assert_eq!(decision.action, PlacementAction::WriteSuffixed);
    assert!(decision.target_absolute_path.to_string_lossy().contains("_scanned"));
  }

  #[test]
  fn resolve_agrees_with_place_and_never_writes() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.pdf");
    fs::write(&source, b"new content").unwrap();
    let pubs = dir.path().join("pubs");
    fs::create_dir_all(&pubs).unwrap();
    fs::write(pubs.join("Target_2020_Title_scan.pdf"), b"different content!!").unwrap();

    let plan = resolve(&source, "Target_2020_Title_scan.pdf", &pubs).unwrap();
    assert_eq!(plan.action, PlacementAction::WriteSuffixed);
    assert!(!plan.target_absolute_path.exists(), "resolve must not write anything");

    let decision = place(&source, "Target_2020_Title_scan.pdf", &pubs, &MountTable::default()).unwrap();
    assert_eq!(decision.action, plan.action);
    assert_eq!(decision.target_absolute_path, plan.target_absolute_path);
  }
}
