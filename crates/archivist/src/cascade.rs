//! The metadata extraction pipeline (C6): a deterministic, short-circuiting
//! cascade from cheap regex extraction up through catalog lookups, the
//! structured parser, and finally the AI oracle.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::{
  clients::{ArxivClient, CrossrefClient, GrobidClient, IsbnClient, OracleClient},
  config::Config,
  errors::ArchivistError,
  identifiers, pdfcut,
  paper::{DocumentType, IdentifierKind, Paper, Provenance},
};

/// Which stage ultimately produced (or failed to produce) a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Catalog,
  Parser,
  Oracle,
  None,
}

/// The outcome of running the cascade over one document.
#[derive(Debug)]
pub struct CascadeResult {
  pub paper:   Paper,
  pub stage:   Stage,
  pub success: bool,
}

/// Options controlling a single cascade run.
#[derive(Debug, Clone, Default)]
pub struct CascadeOptions {
  /// Skip the oracle stage even if earlier stages come up empty (used by
  /// callers that want a fast, network-light pass, e.g. a dry-run preview).
  pub skip_oracle: bool,
}

/// Runs the full cascade over a PDF's first-N-page text, returning the
/// resulting [`Paper`] and which stage it bottomed out at.
///
/// `first_pages_text` is the caller-supplied PDF-text-layer-or-OCR output for
/// the first N pages; extracting that text is outside this module's scope
/// (it belongs to the watcher/ingestion side, which owns the OCR toolchain).
/// `full_pdf_bytes` is the complete source document; this module owns
/// cutting it down to `config.grobid.max_pages` (and retrying at double that
/// budget on an empty-authors response) before submission to the parser.
pub async fn run(
  source_pdf_path: PathBuf,
  full_pdf_bytes: Vec<u8>,
  first_pages_text: &str,
  language_hint: Option<String>,
  config: &Config,
  options: &CascadeOptions,
) -> Result<CascadeResult, ArchivistError> {
  let mut paper = Paper::new(source_pdf_path, language_hint.clone());

  let extraction = identifiers::extract_all(first_pages_text);
  for ctx in &extraction.contexts {
    tracing::debug!(kind = ?ctx.kind, value = %ctx.value, context = %ctx.context, "identifier context window");
  }
  let validated = identifiers::validate(extraction.identifiers);
  for identifier in validated.iter() {
    paper.identifiers.insert(identifier.clone());
    paper.provenance.record(format!("identifier:{:?}", identifier.kind), Provenance::Regex);
  }

  if let Some(bib) = try_catalogs(&paper, config).await? {
    merge_bibliographic(&mut paper, bib, Provenance::Api);
    classify_document_type(&mut paper);
    info!("cascade resolved via catalog lookup");
    return Ok(CascadeResult { paper, stage: Stage::Catalog, success: true });
  }

  let grobid = GrobidClient::new(config.grobid.clone());
  match run_grobid_with_retry(&grobid, &full_pdf_bytes, config.grobid.max_pages).await {
    Ok(Some(bib)) if bib.title.is_some() || !bib.authors.is_empty() => {
      if bib.authors.is_empty() {
        paper.warn("parser returned no authors even after a retry at 2x max_pages");
      }
      merge_bibliographic(&mut paper, bib, Provenance::Grobid);
      classify_document_type(&mut paper);
      info!("cascade resolved via structured parser");
      return Ok(CascadeResult { paper, stage: Stage::Parser, success: true });
    },
    Ok(_) => {
      paper.warn("structured parser returned no usable title or authors");
    },
    Err(e) => {
      warn!(error = %e, "structured parser stage failed, falling through");
      paper.warn(format!("structured parser stage failed: {e}"));
    },
  }

  if options.skip_oracle {
    classify_document_type(&mut paper);
    return Ok(CascadeResult { paper, stage: Stage::None, success: false });
  }

  let oracle = OracleClient::new(config.ollama.clone());
  match oracle.extract_from_text(first_pages_text, language_hint.as_deref(), &paper.bibliographic).await {
    Ok(Some(extraction)) => {
      if let Some(doi) = extraction.doi {
        paper.identifiers.insert(crate::paper::Identifier {
          kind:       IdentifierKind::Doi,
          value:      doi,
          provenance: Provenance::Llm,
          valid:      true,
        });
        paper.provenance.record("identifier:Doi", Provenance::Llm);
      }
      merge_bibliographic(&mut paper, extraction.bibliographic, Provenance::Llm);
      classify_document_type(&mut paper);
      info!("cascade resolved via ai oracle");
      return Ok(CascadeResult { paper, stage: Stage::Oracle, success: true });
    },
    Ok(None) => paper.warn("ai oracle produced no usable response"),
    Err(e) => {
      warn!(error = %e, "ai oracle stage failed");
      paper.warn(format!("ai oracle stage failed: {e}"));
    },
  }

  classify_document_type(&mut paper);
  Ok(CascadeResult { paper, stage: Stage::None, success: false })
}

/// Cuts `full_pdf_bytes` down to `max_pages` and submits it to the parser.
/// If the response parses with an empty author list, writes a diagnostic
/// TEI dump to the temp area and retries once at `2 * max_pages`, per
/// spec.md §4.4. A cut failure (corrupt/encrypted PDF) falls back to
/// submitting the full document unmodified rather than failing the stage
/// outright.
async fn run_grobid_with_retry(
  grobid: &GrobidClient,
  full_pdf_bytes: &[u8],
  max_pages: u32,
) -> Result<Option<crate::paper::Bibliographic>, ArchivistError> {
  let first_cut = pdfcut::cut_first_pages(full_pdf_bytes, max_pages).unwrap_or_else(|e| {
    warn!(error = %e, "pdf page-cut failed, submitting full document to parser");
    full_pdf_bytes.to_vec()
  });

  let first_attempt = grobid.extract(first_cut).await?;
  let needs_retry = matches!(&first_attempt, Some(bib) if bib.authors.is_empty());
  if !needs_retry {
    return Ok(first_attempt);
  }

  if let Some(bib) = &first_attempt {
    write_diagnostic_tei_dump(bib);
  }

  let retry_cut = pdfcut::cut_first_pages(full_pdf_bytes, max_pages.saturating_mul(2))
    .unwrap_or_else(|_| full_pdf_bytes.to_vec());
  let retry_attempt = grobid.extract(retry_cut).await?;

  Ok(retry_attempt.or(first_attempt))
}

/// Writes a diagnostic dump of the empty-authors response to the temp area
/// so a human can inspect why the parser came up short, as spec.md §4.4
/// requires before the retry.
fn write_diagnostic_tei_dump(bib: &crate::paper::Bibliographic) {
  let path = std::env::temp_dir().join(format!(
    "archivist-grobid-empty-authors-{}.json",
    std::process::id()
  ));
  if let Ok(json) = serde_json::to_string_pretty(bib) {
    if let Err(e) = std::fs::write(&path, json) {
      warn!(error = %e, path = %path.display(), "failed to write grobid diagnostic dump");
    }
  }
}

/// Step 3 of the algorithm: try catalog clients in `[DOI, ARXIV, ISBN,
/// URL-only]` priority order, returning the first non-null response.
async fn try_catalogs(
  paper: &Paper,
  config: &Config,
) -> Result<Option<crate::paper::Bibliographic>, ArchivistError> {
  if let Some(doi) = paper.identifiers.first_of(IdentifierKind::Doi) {
    let client = CrossrefClient::new(config.apis.crossref_email.as_deref());
    match client.resolve(&doi.value).await {
      Ok(bib) => return Ok(Some(bib)),
      Err(ArchivistError::NotFound) => {},
      Err(e) => warn!(error = %e, "crossref lookup failed, trying next identifier class"),
    }
  }

  if let Some(arxiv) = paper.identifiers.first_of(IdentifierKind::Arxiv) {
    let client = ArxivClient::new();
    match client.resolve(&arxiv.value).await {
      Ok(bib) => return Ok(Some(bib)),
      Err(ArchivistError::NotFound) => {},
      Err(e) => warn!(error = %e, "arxiv lookup failed, trying next identifier class"),
    }
  }

  if let Some(isbn) = paper.identifiers.first_of(IdentifierKind::Isbn) {
    let client = IsbnClient::new();
    match client.resolve(&isbn.value).await {
      Ok(bib) => return Ok(Some(bib)),
      Err(ArchivistError::NotFound) => {},
      Err(e) => warn!(error = %e, "isbn lookup failed"),
    }
  }

  // URL-only identifiers have no catalog to resolve against directly; they
  // exist to be surfaced to the user during approval, not resolved here.
  Ok(None)
}

/// Copies every populated field from `bib` into `paper.bibliographic`,
/// skipping fields the paper already has (stage precedence, no merging
/// beyond "first writer wins" — the UI handles overrides from there), and
/// records provenance for whichever fields actually got written.
///
/// `pub` so the metadata editor's DOI re-fetch-and-merge step (spec.md
/// §4.12) can reuse the exact same never-overwrite semantics instead of
/// duplicating them.
pub fn merge_bibliographic(paper: &mut Paper, bib: crate::paper::Bibliographic, provenance: Provenance) {
  let target = &mut paper.bibliographic;

  if target.title.is_none() && bib.title.is_some() {
    target.title = bib.title;
    paper.provenance.record("title", provenance);
  }
  if target.authors.is_empty() && !bib.authors.is_empty() {
    target.authors = bib.authors;
    paper.provenance.record("authors", provenance);
  }
  if let Some(year) = bib.year {
    paper.propose_year(year, provenance);
    if target.year.is_none() {
      target.year = Some(year);
      paper.provenance.record("year", provenance);
    }
  }
  if target.container.is_none() && bib.container.is_some() {
    target.container = bib.container;
    paper.provenance.record("container", provenance);
  }
  if target.volume.is_none() && bib.volume.is_some() {
    target.volume = bib.volume;
  }
  if target.issue.is_none() && bib.issue.is_some() {
    target.issue = bib.issue;
  }
  if target.pages.is_none() && bib.pages.is_some() {
    target.pages = bib.pages;
  }
  if target.publisher.is_none() && bib.publisher.is_some() {
    target.publisher = bib.publisher;
    paper.provenance.record("publisher", provenance);
  }
  // Abstract enrichment never overwrites a longer existing value with a
  // shorter one (resolved open question: never overwrite once non-empty).
  if target.abstract_text.is_none() && bib.abstract_text.is_some() {
    target.abstract_text = bib.abstract_text;
    paper.provenance.record("abstract_text", provenance);
  }
  if target.language.is_none() && bib.language.is_some() {
    target.language = bib.language;
  }
  target.keywords.extend(bib.keywords);
  if target.document_type.is_none() && bib.document_type.is_some() {
    target.document_type = bib.document_type;
  }
}

/// The ordered rule cascade for `document_type`, run after every stage so
/// later evidence (a catalog type-hint) can override an earlier heuristic
/// guess, but a JSTOR/arXiv identifier always wins outright.
fn classify_document_type(paper: &mut Paper) {
  if paper.identifiers.first_of(IdentifierKind::Jstor).is_some() {
    paper.bibliographic.document_type = Some(DocumentType::JournalArticle);
    return;
  }
  if paper.identifiers.first_of(IdentifierKind::Arxiv).is_some() {
    paper.bibliographic.document_type = Some(DocumentType::Preprint);
    return;
  }
  if paper.bibliographic.document_type.is_some() {
    return;
  }

  // Heuristic fallback from surface evidence when no stage supplied a type.
  let has_doi = paper.identifiers.first_of(IdentifierKind::Doi).is_some();
  let has_isbn = paper.identifiers.first_of(IdentifierKind::Isbn).is_some();
  let title_lower = paper.bibliographic.title.as_deref().unwrap_or_default().to_lowercase();

  paper.bibliographic.document_type = Some(if has_isbn {
    DocumentType::Book
  } else if title_lower.contains("chapter") {
    DocumentType::BookChapter
  } else if title_lower.contains("proceedings of") || title_lower.contains("submitted to") {
    DocumentType::ConferencePaper
  } else if has_doi {
    DocumentType::JournalArticle
  } else {
    DocumentType::Unknown
  });
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::paper::{Bibliographic, Identifier};

  #[test]
  fn jstor_identifier_always_wins_classification() {
    let mut paper = Paper::new("x.pdf".into(), None);
    paper.identifiers.insert(Identifier {
      kind:       IdentifierKind::Jstor,
      value:      "123".into(),
      provenance: Provenance::Regex,
      valid:      true,
    });
    paper.bibliographic.document_type = Some(DocumentType::Book);
    classify_document_type(&mut paper);
    assert_eq!(paper.bibliographic.document_type, Some(DocumentType::JournalArticle));
  }

  #[test]
  fn merge_does_not_overwrite_existing_title() {
    let mut paper = Paper::new("x.pdf".into(), None);
    paper.bibliographic.title = Some("Original".into());
    merge_bibliographic(
      &mut paper,
      Bibliographic { title: Some("Replacement".into()), ..Default::default() },
      Provenance::Llm,
    );
    assert_eq!(paper.bibliographic.title.as_deref(), Some("Original"));
  }

  #[test]
  fn abstract_enrichment_never_overwrites_once_set() {
    let mut paper = Paper::new("x.pdf".into(), None);
    paper.bibliographic.abstract_text = Some("short".into());
    merge_bibliographic(
      &mut paper,
      Bibliographic { abstract_text: Some("a much longer replacement abstract".into()), ..Default::default() },
      Provenance::Api,
    );
    assert_eq!(paper.bibliographic.abstract_text.as_deref(), Some("short"));
  }
}
