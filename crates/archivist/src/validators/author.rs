//! Author-name suggestion validator (C13).
//!
//! Builds a frequency index of family names already present in the local
//! store, so the approval flow can show "this author has N papers in your
//! library" next to each extracted name and offer OCR-fuzzy corrections.

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use rusqlite::OpenFlags;
use strsim::jaro_winkler;
use tokio_rusqlite::Connection;
use tracing::warn;

use super::{
  cache::{default_cache_path, NameEntry, NameIndexCache},
  normalize, MatchType, ValidationResult,
};

/// Cache rebuild cadence: a no-op within this window, silent otherwise.
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Only suggest corrections within this edit distance, per spec default.
const DEFAULT_MAX_EDIT_DISTANCE: usize = 2;

/// Only suggest corrections above this Jaro-Winkler similarity.
const SUGGESTION_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Validates author family names against the local store's existing
/// authors, with a disk-backed frequency cache and graceful degradation to
/// an empty index when the store or cache is unavailable.
pub struct AuthorValidator {
  db_path:    PathBuf,
  cache_path: PathBuf,
  cache:      NameIndexCache,
}

impl AuthorValidator {
  /// Opens (or builds, if absent/stale) the author index for the store at
  /// `db_path`. Never fails: a store read error just yields an empty index.
  pub async fn open(db_path: impl Into<PathBuf>) -> Self {
    let db_path = db_path.into();
    let cache_path = default_cache_path("authors.json");
    let cache = match NameIndexCache::read(&cache_path) {
      Some(cache) if !cache.is_stale(DEFAULT_MAX_AGE) => cache,
      _ => rebuild(&db_path).await.unwrap_or_default(),
    };
    if let Err(e) = cache.write_atomic(&cache_path) {
      warn!(error = %e, "failed to persist author validator cache");
    }
    Self { db_path, cache_path, cache }
  }

  /// A no-op inside [`DEFAULT_MAX_AGE`] of the last build, a silent rebuild
  /// otherwise — no UI interruption on the happy path.
  pub async fn refresh_if_needed(&mut self) {
    if !self.cache.is_stale(DEFAULT_MAX_AGE) {
      return;
    }
    if let Some(fresh) = rebuild(&self.db_path).await {
      if let Err(e) = fresh.write_atomic(&self.cache_path) {
        warn!(error = %e, "failed to persist refreshed author validator cache");
      }
      self.cache = fresh;
    }
  }

  /// Validates `name` (typically an `AuthorName::match_key()`) against the
  /// index, returning match strength and library hit count.
  pub fn validate(&self, name: &str) -> ValidationResult {
    let normalized = normalize(name);

    if let Some(entry) = self.cache.entries.get(&normalized) {
      let match_type =
        if entry.display.to_lowercase() == name.to_lowercase() { MatchType::Exact } else { MatchType::Normalized };
      return ValidationResult {
        matched:      true,
        canonical:    Some(entry.display.clone()),
        paper_count:  entry.paper_count,
        match_type,
        confidence:   if match_type == MatchType::Exact { 100 } else { 90 },
        alternatives: Vec::new(),
      };
    }

    let suggestions = self.suggest_ocr_correction(&normalized, DEFAULT_MAX_EDIT_DISTANCE);
    if let Some(best) = suggestions.first() {
      return ValidationResult {
        matched:      false,
        canonical:    Some(best.clone()),
        paper_count:  self.paper_count_for_display(best),
        match_type:   MatchType::Fuzzy,
        confidence:   70,
        alternatives: suggestions,
      };
    }

    ValidationResult {
      matched:      false,
      canonical:    None,
      paper_count:  0,
      match_type:   MatchType::None,
      confidence:   0,
      alternatives: Vec::new(),
    }
  }

  /// All entries with similarity above [`SUGGESTION_SIMILARITY_THRESHOLD`]
  /// and edit distance at most `max_edit_distance`, ranked best-first.
  pub fn suggest_ocr_correction(&self, normalized_name: &str, max_edit_distance: usize) -> Vec<String> {
    let mut scored: Vec<(f64, &NameEntry)> = self
      .cache
      .entries
      .iter()
      .filter(|(key, _)| edit_distance(normalized_name, key) <= max_edit_distance)
      .map(|(key, entry)| (jaro_winkler(normalized_name, key), entry))
      .filter(|(score, _)| *score > SUGGESTION_SIMILARITY_THRESHOLD)
      .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().map(|(_, entry)| entry.display.clone()).collect()
  }

  fn paper_count_for_display(&self, display: &str) -> u32 {
    self.cache.entries.get(&normalize(display)).map(|e| e.paper_count).unwrap_or(0)
  }
}

/// Queries the local store (read-only) for distinct author family names
/// with frequency counts, excluding deleted items, and builds a fresh
/// cache. Returns `None` if the store can't be opened or queried at all.
async fn rebuild(db_path: &std::path::Path) -> Option<NameIndexCache> {
  let conn = Connection::open_with_flags(
    db_path.to_path_buf(),
    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
  )
  .await
  .ok()?;

  let rows: Vec<String> = conn
    .call(|conn| {
      let mut stmt = conn.prepare_cached(
        "SELECT creators.lastName FROM creators
         JOIN itemCreators ON itemCreators.creatorID = creators.creatorID
         JOIN items ON items.itemID = itemCreators.itemID
         WHERE items.itemID NOT IN (SELECT itemID FROM deletedItems)
           AND creators.lastName IS NOT NULL AND creators.lastName != ''",
      )?;
      let rows = stmt.query_map([], |row| row.get::<_, String>(0))?.collect::<Result<Vec<_>, _>>()?;
      Ok(rows)
    })
    .await
    .ok()?;

  let mut entries: BTreeMap<String, NameEntry> = BTreeMap::new();
  for display in rows {
    let key = normalize(&display);
    entries
      .entry(key)
      .and_modify(|e| e.paper_count += 1)
      .or_insert(NameEntry { display, paper_count: 1 });
  }
  Some(NameIndexCache::new(entries))
}

/// Simple Levenshtein distance, used to bound fuzzy suggestions in addition
/// to the similarity-score threshold.
fn edit_distance(a: &str, b: &str) -> usize {
  let a: Vec<char> = a.chars().collect();
  let b: Vec<char> = b.chars().collect();
  let mut prev: Vec<usize> = (0..=b.len()).collect();
  let mut curr = vec![0; b.len() + 1];
  for i in 1..=a.len() {
    curr[0] = i;
    for j in 1..=b.len() {
      let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
      curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
    }
    std::mem::swap(&mut prev, &mut curr);
  }
  prev[b.len()]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_strips_abbreviation_markers_for_matching() {
    assert_eq!(normalize("J. Rev. Smith"), normalize("Smith"));
  }

  #[test]
  fn edit_distance_counts_single_substitution() {
    assert_eq!(edit_distance("smith", "smyth"), 1);
  }

  #[test]
  fn validate_returns_none_match_type_on_empty_index() {
    let validator = AuthorValidator {
      db_path:    PathBuf::new(),
      cache_path: PathBuf::new(),
      cache:      NameIndexCache::default(),
    };
    let result = validator.validate("Nobody");
    assert_eq!(result.match_type, MatchType::None);
    assert!(!result.matched);
  }

  #[test]
  fn validate_finds_fuzzy_match_within_edit_distance() {
    let mut entries = BTreeMap::new();
    entries.insert("smith".to_string(), NameEntry { display: "Smith".to_string(), paper_count: 3 });
    let validator = AuthorValidator {
      db_path:    PathBuf::new(),
      cache_path: PathBuf::new(),
      cache:      NameIndexCache::new(entries),
    };
    let result = validator.validate("Smyth");
    assert_eq!(result.match_type, MatchType::Fuzzy);
    assert_eq!(result.canonical.as_deref(), Some("Smith"));
  }
}
