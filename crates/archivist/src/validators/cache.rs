//! On-disk JSON cache shared by the author and journal validators.
//!
//! Written atomically (write-to-temp then rename) so a crash mid-write never
//! leaves a half-written cache for the next startup to trip over, and read
//! defensively: a missing or corrupt cache degrades to an empty index rather
//! than failing validator construction.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
  time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Bumped whenever the on-disk shape changes; a cache written by an older
/// schema version is discarded rather than misinterpreted.
const CACHE_SCHEMA_VERSION: u32 = 1;

/// A normalized-name → (display form, frequency) frequency index, persisted
/// with the Unix timestamp it was built at so [`super::author::AuthorValidator::refresh_if_needed`]
/// and its journal counterpart can decide whether a rebuild is due.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NameIndexCache {
  pub schema_version: u32,
  pub built_at_unix:  u64,
  pub entries:        BTreeMap<String, NameEntry>,
}

/// One normalized-name bucket: its canonical display form and how many
/// local-store items it appears on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameEntry {
  pub display:     String,
  pub paper_count: u32,
}

impl NameIndexCache {
  /// Builds a fresh, unpersisted cache from already-normalized entries.
  pub fn new(entries: BTreeMap<String, NameEntry>) -> Self {
    Self { schema_version: CACHE_SCHEMA_VERSION, built_at_unix: now_unix(), entries }
  }

  /// Reads `path`, returning `None` on any I/O error, parse failure, or
  /// schema mismatch — all of which the caller treats identically as "no
  /// usable cache, rebuild or fall back to empty."
  pub fn read(path: &Path) -> Option<Self> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Self>(&contents) {
      Ok(cache) if cache.schema_version == CACHE_SCHEMA_VERSION => Some(cache),
      Ok(_) => {
        warn!(?path, "validator cache schema version mismatch, discarding");
        None
      },
      Err(e) => {
        warn!(?path, error = %e, "validator cache corrupt, discarding");
        None
      },
    }
  }

  /// Writes the cache to `path` atomically: serialize to a sibling temp
  /// file, then rename over the target so readers never observe a partial
  /// write.
  pub fn write_atomic(&self, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let serialized = serde_json::to_string_pretty(self)
      .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(&tmp_path, serialized)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
  }

  /// Whether this cache is older than `max_age` and due for a rebuild.
  pub fn is_stale(&self, max_age: std::time::Duration) -> bool {
    now_unix().saturating_sub(self.built_at_unix) > max_age.as_secs()
  }
}

/// Default cache file location under `<project data dir>/cache/<name>.json`.
pub fn default_cache_path(file_name: &str) -> PathBuf {
  let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
  base.join("archivist").join("cache").join(file_name)
}

fn now_unix() -> u64 {
  SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
