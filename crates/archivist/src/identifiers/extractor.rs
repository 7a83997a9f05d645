//! Regex-based identifier recovery from scanned-and-OCR'd text (C1).

use lazy_static::lazy_static;
use regex::Regex;

use crate::paper::{Identifier, IdentifierKind, IdentifierSet, Provenance};

/// Old-form arXiv subjects accepted per the closed whitelist; an old-form
/// candidate outside this list, or without "arxiv" appearing within ±20
/// characters, is rejected rather than emitted as a low-confidence guess.
const ARXIV_OLD_SUBJECTS: &[&str] = &[
  "cs", "math", "physics", "astro-ph", "cond-mat", "hep-th", "hep-ph", "hep-ex", "hep-lat",
  "gr-qc", "quant-ph", "nlin", "q-bio", "q-fin", "stat", "eess", "econ",
];

/// How many characters either side of an old-form arXiv match to scan for
/// the literal token "arxiv".
const ARXIV_PROXIMITY_WINDOW: usize = 20;

/// How many characters after an ISSN match to scan for an online/print
/// marker when tie-breaking its classification.
const ISSN_MARKER_WINDOW: usize = 20;

/// How many characters either side of a match to keep as its diagnostic
/// context window.
const CONTEXT_WINDOW: usize = 40;

lazy_static! {
  // DOIs per the Crossref registrant-prefix grammar (10.NNNN+/suffix), with
  // OCR-tolerant whitespace around the slash and a trailing-punctuation trim
  // applied by the caller rather than the pattern itself.
  static ref DOI_RE: Regex =
    Regex::new(r"(?i)\b10\.\d{4,9}\s*/\s*[-._;()/:A-Z0-9]+").unwrap();

  // OCR-garbled "DOI:" prefix immediately followed by a bare "10.NNNN/..."
  // body with no "doi" label the DOI_RE pattern above would have matched on
  // its own — e.g. "DO!: 10.1080/13501780701394094". The label itself is
  // discarded; only the captured DOI body is emitted.
  static ref OCR_DOI_RE: Regex = Regex::new(
    r"(?i)\bDO[I1!Ll]\s{0,1}:\s*(10\.\d{4,9}\s*/\s*[-._;()/:A-Z0-9]+)"
  )
  .unwrap();

  // ISBN-10 or ISBN-13, optionally hyphenated or space-separated, with an
  // optional "ISBN" label preceding it.
  static ref ISBN_RE: Regex = Regex::new(
    r"(?i)\bISBN(?:-1[03])?[:\s]*((?:97[89][\s-]?)?(?:\d[\s-]?){9}[\dXx])\b"
  )
  .unwrap();

  // ISSN: four digits, hyphen, three digits and a check digit or X.
  static ref ISSN_RE: Regex = Regex::new(r"\b(\d{4}-\d{3}[\dXx])\b").unwrap();

  static ref ISSN_ONLINE_MARKER_RE: Regex =
    Regex::new(r"(?i)online|electronic|e-issn|eissn").unwrap();
  static ref ISSN_PRINT_MARKER_RE: Regex =
    Regex::new(r"(?i)print|paper|p-issn|pissn").unwrap();

  // arXiv modern form: YYMM.NNNNN(v#)?, standalone (no "arxiv:" label
  // required — the format itself is distinctive enough).
  static ref ARXIV_MODERN_RE: Regex = Regex::new(
    r"(?i)\barXiv:\s*(\d{4}\.\d{4,5}(?:v\d+)?)|\b(\d{4}\.\d{4,5}(?:v\d+)?)\b"
  )
  .unwrap();

  // arXiv legacy form: <subject>/<7 digits>(v#)?, e.g. "astro-ph/9901001" —
  // acceptance additionally requires subject whitelist membership and
  // "arxiv" proximity, checked by the caller since regex can't express that.
  static ref ARXIV_LEGACY_RE: Regex =
    Regex::new(r"(?i)\b([a-z][a-z.-]*)/(\d{7})(v\d+)?\b").unwrap();

  // JSTOR stable URLs.
  static ref JSTOR_RE: Regex =
    Regex::new(r"(?i)jstor\.org/stable/([A-Za-z0-9.]+)").unwrap();

  // Any bare http(s) URL, used as the catch-all bucket.
  static ref URL_RE: Regex = Regex::new(r"https?://[^\s<>\x22]+").unwrap();
}

/// One emitted identifier's surrounding text, kept alongside the identifier
/// itself so a caller can show a user (or a log line) why a given candidate
/// was picked out of noisy OCR text — spec.md §4.1's "each item paired with
/// its textual context window for diagnostics".
#[derive(Debug, Clone)]
pub struct IdentifierContext {
  pub kind:    IdentifierKind,
  pub value:   String,
  pub context: String,
}

/// The result of a regex extraction pass: the validated-pending identifier
/// set plus a parallel diagnostic context window per item.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutput {
  pub identifiers: IdentifierSet,
  pub contexts:    Vec<IdentifierContext>,
}

/// Scans `text` (typically the first few pages of OCR output) for
/// identifier candidates and returns them tagged `Provenance::Regex`.
///
/// Validity is left unset here (`valid: true` is a placeholder overwritten by
/// [`super::validate`]); this function's job is recall, not precision —
/// the validator is what drops false positives before they reach the UI.
pub fn extract_all(text: &str) -> ExtractionOutput {
  let mut out = ExtractionOutput::default();

  for capture in DOI_RE.find_iter(text) {
    let cleaned = clean_candidate(capture.as_str());
    out.push(IdentifierKind::Doi, cleaned, text, capture.start(), capture.end());
  }

  // OCR-garbled "DO!:"/"DOl:" prefixes the clean DOI_RE pattern above might
  // have matched already (fine, `insert` dedupes by provenance precedence)
  // or might have missed if the label swallowed characters the bare-body
  // pattern needs; run unconditionally and let `insert`'s singleton rule
  // settle any duplicate.
  for capture in OCR_DOI_RE.captures_iter(text) {
    if let Some(m) = capture.get(1) {
      out.push(IdentifierKind::Doi, clean_candidate(m.as_str()), text, m.start(), m.end());
    }
  }

  for capture in ISBN_RE.captures_iter(text) {
    if let Some(m) = capture.get(1) {
      out.push(IdentifierKind::Isbn, m.as_str().to_string(), text, m.start(), m.end());
    }
  }

  for (value, is_online, start, end) in classify_issns(text) {
    let _ = is_online;
    out.push(IdentifierKind::Issn, value, text, start, end);
  }

  for capture in ARXIV_MODERN_RE.captures_iter(text) {
    let m = capture.get(1).or_else(|| capture.get(2));
    if let Some(m) = m {
      out.push(IdentifierKind::Arxiv, m.as_str().to_string(), text, m.start(), m.end());
    }
  }

  for capture in ARXIV_LEGACY_RE.captures_iter(text) {
    let Some(subject) = capture.get(1) else { continue };
    let Some(digits) = capture.get(2) else { continue };
    if !ARXIV_OLD_SUBJECTS.contains(&subject.as_str().to_lowercase().as_str()) {
      continue;
    }
    let whole = capture.get(0).unwrap();
    if !arxiv_mentioned_nearby(text, whole.start(), whole.end()) {
      continue;
    }
    let version = capture.get(3).map(|m| m.as_str()).unwrap_or_default();
    let value = format!("{}/{}{}", subject.as_str(), digits.as_str(), version);
    out.push(IdentifierKind::Arxiv, value, text, whole.start(), whole.end());
  }

  for capture in JSTOR_RE.captures_iter(text) {
    if let Some(m) = capture.get(1) {
      out.push(IdentifierKind::Jstor, m.as_str().to_string(), text, m.start(), m.end());
    }
  }

  for capture in URL_RE.find_iter(text) {
    let url = capture.as_str().trim_end_matches(['.', ',', ')', ']']);
    // Skip URLs already captured more specifically above.
    if JSTOR_RE.is_match(url) {
      continue;
    }
    let start = capture.start();
    let end = start + url.len();
    out.push(IdentifierKind::Url, url.to_string(), text, start, end);
  }

  out
}

/// Identical to [`extract_all`] but constrained to the first `max_pages`
/// pages of `text`, split on the form-feed page-break character `pdftotext`
/// and equivalent dumpers insert between pages by default. Text with no
/// form feed (a single-page dump, or an OCR tool that doesn't mark page
/// boundaries) is passed through unchanged.
pub fn extract_first_page(text: &str, max_pages: usize) -> ExtractionOutput {
  let limited: String = text.split('\x0c').take(max_pages.max(1)).collect::<Vec<_>>().join("\x0c");
  extract_all(&limited)
}

impl ExtractionOutput {
  fn push(&mut self, kind: IdentifierKind, value: String, text: &str, start: usize, end: usize) {
    self.contexts.push(IdentifierContext { kind, value: value.clone(), context: context_window(text, start, end) });
    self.identifiers.insert(Identifier { kind, value, provenance: Provenance::Regex, valid: true });
  }
}

/// Finds every ISSN candidate, tie-breaks each as online/print by whichever
/// marker (`online|electronic|e-issn|eissn` vs `print|paper|p-issn|pissn`)
/// appears closer within the trailing detection window, and returns them
/// sorted so online forms precede print forms — matching the output-order
/// policy in §4.1.
fn classify_issns(text: &str) -> Vec<(String, bool, usize, usize)> {
  let mut found: Vec<(String, bool, usize, usize)> = ISSN_RE
    .captures_iter(text)
    .filter_map(|capture| {
      let m = capture.get(1)?;
      let window_end = (m.end() + ISSN_MARKER_WINDOW).min(text.len());
      let window = text.get(m.end()..window_end).unwrap_or("");
      let online_pos = ISSN_ONLINE_MARKER_RE.find(window).map(|h| h.start());
      let print_pos = ISSN_PRINT_MARKER_RE.find(window).map(|h| h.start());
      let is_online = match (online_pos, print_pos) {
        (Some(o), Some(p)) => o <= p,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => false,
      };
      Some((m.as_str().to_uppercase(), is_online, m.start(), m.end()))
    })
    .collect();
  found.sort_by_key(|(_, is_online, ..)| !*is_online);
  found
}

/// Collects the text within [`CONTEXT_WINDOW`] characters either side of
/// `[start, end)`, snapped inward to the nearest `char` boundary.
fn context_window(text: &str, start: usize, end: usize) -> String {
  let window_start = start.saturating_sub(CONTEXT_WINDOW);
  let window_end = (end + CONTEXT_WINDOW).min(text.len());
  let window_start = (0..=window_start).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
  let window_end = (window_end..=text.len()).find(|i| text.is_char_boundary(*i)).unwrap_or(text.len());
  text.get(window_start..window_end).unwrap_or("").to_string()
}

/// True if the literal token "arxiv" (case-insensitive) appears within
/// [`ARXIV_PROXIMITY_WINDOW`] characters either side of `[start, end)`.
fn arxiv_mentioned_nearby(text: &str, start: usize, end: usize) -> bool {
  let window_start = start.saturating_sub(ARXIV_PROXIMITY_WINDOW);
  let window_end = (end + ARXIV_PROXIMITY_WINDOW).min(text.len());
  let window_start = (0..=window_start).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
  let window_end = (window_end..=text.len()).find(|i| text.is_char_boundary(*i)).unwrap_or(text.len());
  text.get(window_start..window_end).unwrap_or("").to_lowercase().contains("arxiv")
}

/// Trims OCR artifacts (internal whitespace around the DOI slash, trailing
/// sentence punctuation) from a raw DOI match.
fn clean_candidate(raw: &str) -> String {
  let no_space: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
  no_space.trim_end_matches(['.', ',', ';', ')']).to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn extract(text: &str) -> IdentifierSet { extract_all(text).identifiers }

  #[test]
  fn extracts_clean_doi() {
    let set = extract("See https://doi.org/ the paper 10.1145/1327452.1327492 for details.");
    let doi = set.first_of(IdentifierKind::Doi).unwrap();
    assert_eq!(doi.value, "10.1145/1327452.1327492");
  }

  #[test]
  fn tolerates_ocr_spaced_doi() {
    let set = extract("doi : 10.1038 / s41586 - 020 - 2649 - 2 end");
    let doi = set.first_of(IdentifierKind::Doi).unwrap();
    assert_eq!(doi.value, "10.1038/s41586-020-2649-2");
  }

  #[test]
  fn extracts_modern_arxiv_id() {
    let set = extract("arXiv:2301.04567v2 preprint");
    let arxiv = set.first_of(IdentifierKind::Arxiv).unwrap();
    assert_eq!(arxiv.value, "2301.04567v2");
  }

  #[test]
  fn extracts_jstor_as_jstor_not_url() {
    let set = extract("stable at https://www.jstor.org/stable/24586245");
    assert!(set.first_of(IdentifierKind::Jstor).is_some());
    assert!(set.first_of(IdentifierKind::Url).is_none());
  }

  #[test]
  fn enforces_single_doi_per_paper() {
    let set = extract("10.1234/aaaa and also 10.5678/bbbb");
    assert_eq!(set.all_of(IdentifierKind::Doi).count(), 1);
  }

  #[test]
  fn tolerates_ocr_garbled_doi_prefix() {
    let set = extract("DO!: 10.1080/13501780701394094");
    let doi = set.first_of(IdentifierKind::Doi).unwrap();
    assert_eq!(doi.value, "10.1080/13501780701394094");
  }

  #[test]
  fn jstor_url_alone_yields_no_arxiv_id() {
    let set = extract("http://www.jstor.org/stable/2289064");
    assert!(set.first_of(IdentifierKind::Jstor).is_some());
    assert!(set.first_of(IdentifierKind::Arxiv).is_none());
  }

  #[test]
  fn old_form_arxiv_accepted_with_whitelisted_subject_and_nearby_label() {
    let set = extract("see the arxiv preprint astro-ph/9901001 for details");
    let arxiv = set.first_of(IdentifierKind::Arxiv).unwrap();
    assert_eq!(arxiv.value, "astro-ph/9901001");
  }

  #[test]
  fn old_form_arxiv_rejected_without_nearby_arxiv_token() {
    let set = extract("the stable identifier astro-ph/9901001 appears in the references");
    assert!(set.first_of(IdentifierKind::Arxiv).is_none());
  }

  #[test]
  fn old_form_arxiv_rejected_for_non_whitelisted_subject() {
    let set = extract("see arxiv submission zzzzz/9901001 for details");
    assert!(set.first_of(IdentifierKind::Arxiv).is_none());
  }

  #[test]
  fn online_issn_sorts_before_print_issn() {
    let set = extract("ISSN 1234-5678 (print), ISSN 8765-432X (online)");
    let issns: Vec<_> = set.all_of(IdentifierKind::Issn).map(|i| i.value.clone()).collect();
    assert_eq!(issns, vec!["8765-432X".to_string(), "1234-5678".to_string()]);
  }

  #[test]
  fn each_identifier_carries_a_surrounding_context_window() {
    let out = extract_all("Published in 2019, see doi: 10.1145/1327452.1327492 in the appendix.");
    let ctx = out.contexts.iter().find(|c| c.kind == IdentifierKind::Doi).unwrap();
    assert!(ctx.context.contains("doi"));
    assert!(ctx.context.contains("appendix") || ctx.context.contains("Published"));
  }

  #[test]
  fn extract_first_page_ignores_identifiers_past_the_page_budget() {
    let text = "astro-ph/9901001 first page arxiv\x0c10.1234/second_page_doi";
    let out = extract_first_page(text, 1);
    assert!(out.identifiers.first_of(IdentifierKind::Doi).is_none());
    let full = extract_all(text);
    assert!(full.identifiers.first_of(IdentifierKind::Doi).is_some());
  }
}
