//! Checksum validation and canonicalization for extracted identifiers (C2).

use crate::paper::{Identifier, IdentifierKind, IdentifierSet, Provenance};

/// Normalizes a DOI to its canonical form: the `10.NNNN` registrant prefix
/// is case-insensitive per the DOI spec and is lowercased; the suffix after
/// the slash is case-sensitive and preserved verbatim. Also strips a leading
/// `https?://(dx.)?doi.org/` or `doi:` wrapper and all whitespace.
///
/// This is the single canonical form used across every catalog client and
/// downstream equality check — no ad-hoc DOI cleanup happens elsewhere.
pub fn normalize_doi(doi: &str) -> String {
  let no_space: String = doi.chars().filter(|c| !c.is_whitespace()).collect();
  let stripped = no_space
    .trim_start_matches("https://dx.doi.org/")
    .trim_start_matches("http://dx.doi.org/")
    .trim_start_matches("https://doi.org/")
    .trim_start_matches("http://doi.org/")
    .trim_start_matches("doi:")
    .trim_start_matches("DOI:");

  match stripped.split_once('/') {
    Some((prefix, suffix)) => format!("{}/{suffix}", prefix.to_lowercase()),
    None => stripped.to_lowercase(),
  }
}

/// Re-validates and normalizes every identifier in `set`, dropping
/// non-user entries that fail checksum/format validation.
///
/// Returns a new set rather than mutating in place, since [`IdentifierSet`]
/// doesn't expose a retain/filter primitive (its insert already enforces the
/// singleton invariants, and rebuilding through `insert` is the simplest way
/// to keep that logic in one place).
pub fn validate(set: IdentifierSet) -> IdentifierSet {
  let mut validated = IdentifierSet::new();
  for identifier in set.iter() {
    let mut identifier = identifier.clone();
    let ok = match identifier.kind {
      IdentifierKind::Doi => {
        identifier.value = normalize_doi(&identifier.value);
        validate_doi(&identifier.value)
      },
      IdentifierKind::Isbn => match normalize_isbn(&identifier.value) {
        Some(normalized) => {
          identifier.value = normalized;
          true
        },
        None => false,
      },
      IdentifierKind::Issn => validate_issn(&identifier.value),
      IdentifierKind::Arxiv => validate_arxiv(&identifier.value),
      IdentifierKind::Jstor => !identifier.value.is_empty(),
      IdentifierKind::Url => identifier.value.starts_with("http"),
    };
    identifier.valid = ok || identifier.provenance == Provenance::User;
    validated.insert(identifier);
  }
  validated
}

/// Format-validates an (assumed already-[`normalize_doi`]'d) DOI: a `10.`
/// registrant prefix longer than 3 characters, a `/`, and a non-empty
/// suffix. No network call — this is a syntax check, not a resolvability
/// check.
pub fn validate_doi(doi: &str) -> bool {
  doi.starts_with("10.")
    && doi.split_once('/').is_some_and(|(prefix, suffix)| prefix.len() > 3 && !suffix.is_empty())
}

/// Format-validates an arXiv identifier (modern `YYMM.NNNNN` or legacy
/// `subject/NNNNNNN`, either optionally `v`-suffixed). No network call.
pub fn validate_arxiv(id: &str) -> bool {
  let id = id.split('v').next().unwrap_or(id);
  let modern = id.len() >= 9 && id.chars().next().is_some_and(|c| c.is_ascii_digit());
  let legacy = id.contains('/');
  modern || legacy
}

/// Validates an ISBN-10 checksum (mod-11, with `X` worth 10 in the final
/// position). `digits` must already be stripped of hyphens/spaces.
pub fn validate_isbn10(digits: &str) -> bool { isbn10_checksum_valid(digits) }

/// Validates an ISBN-13 checksum (mod-10, alternating 1/3 weights).
/// `digits` must already be stripped of hyphens/spaces.
pub fn validate_isbn13(digits: &str) -> bool { isbn13_checksum_valid(digits) }

/// Validates an ISSN checksum (mod-11, with `X` worth 10 in the final
/// position). `issn` may retain its hyphen.
pub fn validate_issn(issn: &str) -> bool { issn_checksum_valid(issn) }

/// Strips hyphens/spaces and validates an ISBN-10 or ISBN-13 checksum,
/// returning the digits-only canonical form on success.
fn normalize_isbn(raw: &str) -> Option<String> {
  let digits: String = raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
  match digits.len() {
    10 => validate_isbn10(&digits).then_some(digits),
    13 => validate_isbn13(&digits).then_some(digits),
    _ => None,
  }
}

fn isbn10_checksum_valid(digits: &str) -> bool {
  let chars: Vec<char> = digits.chars().collect();
  if chars.len() != 10 {
    return false;
  }
  let mut sum = 0u32;
  for (i, c) in chars.iter().enumerate() {
    let value = if *c == 'X' || *c == 'x' {
      10
    } else if let Some(d) = c.to_digit(10) {
      d
    } else {
      return false;
    };
    sum += value * (10 - i as u32);
  }
  sum % 11 == 0
}

fn isbn13_checksum_valid(digits: &str) -> bool {
  let chars: Vec<char> = digits.chars().collect();
  if chars.len() != 13 {
    return false;
  }
  let mut sum = 0u32;
  for (i, c) in chars.iter().enumerate() {
    let Some(d) = c.to_digit(10) else { return false };
    sum += if i % 2 == 0 { d } else { d * 3 };
  }
  sum % 10 == 0
}

fn issn_checksum_valid(issn: &str) -> bool {
  let digits: Vec<char> = issn.chars().filter(|c| *c != '-').collect();
  if digits.len() != 8 {
    return false;
  }
  let mut sum = 0u32;
  for (i, c) in digits.iter().enumerate() {
    let value = if *c == 'X' || *c == 'x' {
      10
    } else if let Some(d) = c.to_digit(10) {
      d
    } else {
      return false;
    };
    sum += value * (8 - i as u32);
  }
  sum % 11 == 0
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::paper::Identifier;

  fn set_with(kind: IdentifierKind, value: &str) -> IdentifierSet {
    let mut set = IdentifierSet::new();
    set.insert(Identifier { kind, value: value.to_string(), provenance: Provenance::Regex, valid: true });
    set
  }

  #[test]
  fn valid_isbn13_passes() {
    let validated = validate(set_with(IdentifierKind::Isbn, "978-3-16-148410-0"));
    assert!(validated.first_of(IdentifierKind::Isbn).unwrap().valid);
  }

  #[test]
  fn bad_isbn_checksum_is_dropped() {
    let validated = validate(set_with(IdentifierKind::Isbn, "978-3-16-148410-1"));
    assert!(validated.first_of(IdentifierKind::Isbn).is_none());
  }

  #[test]
  fn valid_issn_passes() {
    let validated = validate(set_with(IdentifierKind::Issn, "0378-5955"));
    assert!(validated.first_of(IdentifierKind::Issn).unwrap().valid);
  }

  #[test]
  fn doi_prefix_is_lowercased_suffix_is_preserved() {
    let validated = validate(set_with(IdentifierKind::Doi, "10.1145/ABC123"));
    assert_eq!(validated.first_of(IdentifierKind::Doi).unwrap().value, "10.1145/ABC123");
  }

  #[test]
  fn doi_url_wrapper_is_stripped() {
    assert_eq!(normalize_doi("https://doi.org/10.1234/Example.2023"), "10.1234/Example.2023");
  }

  #[test]
  fn user_entered_invalid_isbn_is_kept() {
    let mut set = IdentifierSet::new();
    set.insert(Identifier {
      kind:       IdentifierKind::Isbn,
      value:      "not-an-isbn".to_string(),
      provenance: Provenance::User,
      valid:      true,
    });
    let validated = validate(set);
    assert!(validated.first_of(IdentifierKind::Isbn).is_some());
  }
}
