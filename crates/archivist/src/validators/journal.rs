//! Journal-title suggestion validator (C13).
//!
//! Identical in shape to [`super::author::AuthorValidator`], but indexes
//! distinct `publicationTitle` values instead of creator family names.

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use rusqlite::OpenFlags;
use strsim::jaro_winkler;
use tokio_rusqlite::Connection;
use tracing::warn;

use super::{
  cache::{default_cache_path, NameEntry, NameIndexCache},
  normalize, MatchType, ValidationResult,
};

const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_MAX_EDIT_DISTANCE: usize = 2;
const SUGGESTION_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Validates journal/container titles against the local store's existing
/// `publicationTitle` values, with the same disk-backed cache and
/// graceful-degradation behavior as the author validator.
pub struct JournalValidator {
  db_path:    PathBuf,
  cache_path: PathBuf,
  cache:      NameIndexCache,
}

impl JournalValidator {
  pub async fn open(db_path: impl Into<PathBuf>) -> Self {
    let db_path = db_path.into();
    let cache_path = default_cache_path("journals.json");
    let cache = match NameIndexCache::read(&cache_path) {
      Some(cache) if !cache.is_stale(DEFAULT_MAX_AGE) => cache,
      _ => rebuild(&db_path).await.unwrap_or_default(),
    };
    if let Err(e) = cache.write_atomic(&cache_path) {
      warn!(error = %e, "failed to persist journal validator cache");
    }
    Self { db_path, cache_path, cache }
  }

  pub async fn refresh_if_needed(&mut self) {
    if !self.cache.is_stale(DEFAULT_MAX_AGE) {
      return;
    }
    if let Some(fresh) = rebuild(&self.db_path).await {
      if let Err(e) = fresh.write_atomic(&self.cache_path) {
        warn!(error = %e, "failed to persist refreshed journal validator cache");
      }
      self.cache = fresh;
    }
  }

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

/// Queries the local store for distinct `publicationTitle` values with
/// frequency counts, excluding deleted items.
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
        "SELECT itemDataValues.value FROM itemData
         JOIN itemDataValues ON itemDataValues.valueID = itemData.valueID
         JOIN fields ON fields.fieldID = itemData.fieldID
         JOIN items ON items.itemID = itemData.itemID
         WHERE fields.fieldName = 'publicationTitle'
           AND items.itemID NOT IN (SELECT itemID FROM deletedItems)",
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
  fn validate_returns_none_match_type_on_empty_index() {
    let validator = JournalValidator {
      db_path:    PathBuf::new(),
      cache_path: PathBuf::new(),
      cache:      NameIndexCache::default(),
    };
    let result = validator.validate("Journal of Nowhere");
    assert_eq!(result.match_type, MatchType::None);
  }

  #[test]
  fn validate_exact_match_reports_full_confidence() {
    let mut entries = BTreeMap::new();
    entries.insert(
      normalize("Nature"),
      NameEntry { display: "Nature".to_string(), paper_count: 12 },
    );
    let validator = JournalValidator {
      db_path:    PathBuf::new(),
      cache_path: PathBuf::new(),
      cache:      NameIndexCache::new(entries),
    };
    let result = validator.validate("Nature");
    assert_eq!(result.match_type, MatchType::Exact);
    assert_eq!(result.paper_count, 12);
  }

  #[test]
  fn validate_fuzzy_match_suggests_canonical_spelling() {
    let mut entries = BTreeMap::new();
    entries.insert(
      normalize("Journal of Machine Learning Research"),
      NameEntry { display: "Journal of Machine Learning Research".to_string(), paper_count: 4 },
    );
    let validator = JournalValidator {
      db_path:    PathBuf::new(),
      cache_path: PathBuf::new(),
      cache:      NameIndexCache::new(entries),
    };
    let result = validator.validate("Journal of Machne Learning Research");
    assert_eq!(result.match_type, MatchType::Fuzzy);
    assert_eq!(result.canonical.as_deref(), Some("Journal of Machine Learning Research"));
  }
}
