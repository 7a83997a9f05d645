//! Deterministic target filename construction (C10):
//! `Author_Year_Title_scan.pdf`.

use unicode_normalization::UnicodeNormalization;

use crate::paper::Bibliographic;

/// The byte budget the title slug is truncated to, leaving headroom in the
/// common 255-byte filesystem filename limit for the author/year/suffix.
const TITLE_SLUG_BYTE_BUDGET: usize = 80;

/// How many leading significant (non-stopword) title words feed the slug.
const SIGNIFICANT_WORD_COUNT: usize = 6;

const STOPWORDS: &[&str] = &["a", "an", "the", "of", "on", "in", "and", "to", "for", "with"];

/// Builds the deterministic scan filename for `bibliographic`.
///
/// Produces `Unknown_Author` only for the primary-author segment when no
/// author survived extraction; callers must gate acceptance of that case on
/// an explicit user warning per the forbidden-unless-accepted rule — this
/// function itself has no concept of user consent and always returns its
/// best deterministic answer.
pub fn generate(bibliographic: &Bibliographic) -> String {
  let primary = primary_author_segment(bibliographic);
  let year = bibliographic.year.map(|y| y.to_string()).unwrap_or_else(|| "Unknown".to_string());
  let slug = title_slug(bibliographic.title.as_deref().unwrap_or(""));
  format!("{primary}_{year}_{slug}_scan.pdf")
}

/// Returns `true` when [`generate`] would fall back to the forbidden
/// `Unknown_Author` primary-author segment for this record — i.e. no author
/// survived extraction. Callers must gate a commit using such a filename on
/// an explicit user acknowledgement of the missing-author warning (spec.md
/// §4.10: "Forbidden: `Unknown_Author` unless the user explicitly accepted a
/// warning").
pub fn is_unknown_author(bibliographic: &Bibliographic) -> bool { bibliographic.authors.is_empty() }

fn primary_author_segment(bibliographic: &Bibliographic) -> String {
  let families: Vec<String> = bibliographic.authors.iter().map(|a| ascii_fold(&a.match_key())).collect();
  match families.len() {
    0 => "Unknown_Author".to_string(),
    1 => title_case(&families[0]),
    2 => format!("{}_{}", title_case(&families[0]), title_case(&families[1])),
    _ => format!("{}_etal", title_case(&families[0])),
  }
}

/// Takes the first [`SIGNIFICANT_WORD_COUNT`] non-stopword words of `title`,
/// ASCII-folds them, replaces non-alphanumerics with underscores, collapses
/// repeats, Title_Cases each word, and truncates to the byte budget on a
/// char boundary.
fn title_slug(title: &str) -> String {
  let words: Vec<&str> = title.split_whitespace().collect();
  let significant: Vec<String> = words
    .iter()
    .map(|w| ascii_fold(w))
    .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.to_lowercase().as_str()))
    .take(SIGNIFICANT_WORD_COUNT)
    .map(|w| title_case(&slugify_word(&w)))
    .filter(|w| !w.is_empty())
    .collect();

  let joined = significant.join("_");
  truncate_at_byte_budget(&joined, TITLE_SLUG_BYTE_BUDGET)
}

/// Replaces each run of non-alphanumeric characters with a single
/// underscore, trimming leading/trailing underscores.
fn slugify_word(word: &str) -> String {
  let mut out = String::new();
  let mut last_was_sep = false;
  for c in word.chars() {
    if c.is_ascii_alphanumeric() {
      out.push(c);
      last_was_sep = false;
    } else if !last_was_sep {
      out.push('_');
      last_was_sep = true;
    }
  }
  out.trim_matches('_').to_string()
}

fn title_case(s: &str) -> String {
  let mut chars = s.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
    None => String::new(),
  }
}

/// Decomposes Unicode and drops combining marks, so e.g. "Müller" becomes
/// "Muller" and survives filesystem/transport round-trips unscathed.
fn ascii_fold(s: &str) -> String {
  s.nfkd().filter(|c| c.is_ascii()).collect()
}

fn truncate_at_byte_budget(s: &str, budget: usize) -> String {
  if s.len() <= budget {
    return s.to_string();
  }
  let mut end = budget;
  while end > 0 && !s.is_char_boundary(end) {
    end -= 1;
  }
  s[..end].trim_end_matches('_').to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::paper::AuthorName;

  fn bib(authors: Vec<AuthorName>, year: Option<u16>, title: &str) -> Bibliographic {
    Bibliographic { authors, year, title: Some(title.to_string()), ..Default::default() }
  }

  #[test]
  fn single_author_produces_primary_year_title() {
    let b = bib(
      vec![AuthorName::new(None, Some("Lovelace".into()), None).unwrap()],
      Some(1843),
      "Notes on the Analytical Engine",
    );
    assert_eq!(generate(&b), "Lovelace_1843_Notes_Analytical_Engine_scan.pdf");
  }

  #[test]
  fn three_authors_use_etal() {
    let authors = vec![
      AuthorName::new(None, Some("Aaa".into()), None).unwrap(),
      AuthorName::new(None, Some("Bbb".into()), None).unwrap(),
      AuthorName::new(None, Some("Ccc".into()), None).unwrap(),
    ];
    let b = bib(authors, Some(2020), "Some Title Here");
    assert!(generate(&b).starts_with("Aaa_etal_2020_"));
  }

  #[test]
  fn missing_authors_falls_back_to_unknown_author() {
    let b = bib(vec![], None, "A Title");
    assert!(generate(&b).starts_with("Unknown_Author_Unknown_"));
    assert!(is_unknown_author(&b));
  }

  #[test]
  fn is_unknown_author_false_once_an_author_is_present() {
    let b = bib(vec![AuthorName::new(None, Some("Lovelace".into()), None).unwrap()], None, "A Title");
    assert!(!is_unknown_author(&b));
  }

  #[test]
  fn folds_diacritics_in_author_name() {
    let b = bib(vec![AuthorName::new(None, Some("Müller".into()), None).unwrap()], Some(2000), "Title");
    assert!(generate(&b).starts_with("Muller_2000_"));
  }

  #[test]
  fn slug_respects_byte_budget() {
    let long_title = "Word ".repeat(40);
    let b = bib(vec![], Some(2000), &long_title);
    let name = generate(&b);
    let slug_part = name.strip_prefix("Unknown_Author_2000_").unwrap().strip_suffix("_scan.pdf").unwrap();
    assert!(slug_part.len() <= TITLE_SLUG_BYTE_BUDGET);
  }
}
