//! Author and journal suggestion validators (C13).
//!
//! Both validators follow the identical pattern: build a frequency index
//! from the local store, normalize for matching while preserving the
//! original display form, cache the index to disk so a cold start doesn't
//! have to rescan the store, and degrade to an empty index — no panics, no
//! suggestions — if the store is unreachable or the cache is corrupt.

mod cache;

pub mod author;
pub mod journal;

pub use author::AuthorValidator;
pub use journal::JournalValidator;

/// How a candidate name matched against the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
  /// Identical after case-folding only.
  Exact,
  /// Identical after normalization (abbreviation markers stripped, etc).
  Normalized,
  /// No exact/normalized hit, but a fuzzy neighbor was found.
  Fuzzy,
  /// No match at any confidence level.
  None,
}

/// The result of validating one candidate name against an index.
#[derive(Debug, Clone)]
pub struct ValidationResult {
  pub matched:     bool,
  pub canonical:   Option<String>,
  pub paper_count: u32,
  pub match_type:  MatchType,
  pub confidence:  u8,
  pub alternatives: Vec<String>,
}

/// Lowercases, trims, and strips common abbreviation markers (`J.`, `Rev.`,
/// trailing periods on initials) for matching purposes only — stored
/// display values are never altered by this function.
pub(crate) fn normalize(name: &str) -> String {
  name
    .to_lowercase()
    .chars()
    .filter(|c| c.is_alphanumeric() || c.is_whitespace())
    .collect::<String>()
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}
