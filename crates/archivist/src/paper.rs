//! The bibliographic data model.
//!
//! A [`Paper`] is mutated in place across the extraction cascade and the
//! interactive approval flow, accumulating identifiers, bibliographic fields,
//! and per-field [`Provenance`]. Nothing here performs I/O; this module is the
//! tagged-variant, explicit-optional replacement for the dict-shaped metadata
//! records a dynamic-language implementation would reach for.

use std::{collections::BTreeSet, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ArchivistError;

/// Which extraction stage (or the user) produced a field or identifier.
///
/// Ordered so that `Provenance::User` always wins a conflict: `max(a, b)`
/// on two provenance tags for the same field yields the one that should be
/// kept, with user edits strictly dominant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Provenance {
  /// Produced by the regex identifier scan (C1).
  Regex,
  /// Produced by an external catalog lookup (C3).
  Api,
  /// Produced by the structured TEI parser (C4).
  Grobid,
  /// Produced by the AI oracle (C5).
  Llm,
  /// Entered or confirmed by the user during approval (C12).
  User,
}

/// The kind of identifier attached to a paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IdentifierKind {
  /// Digital Object Identifier.
  Doi,
  /// International Standard Book Number.
  Isbn,
  /// International Standard Serial Number.
  Issn,
  /// arXiv preprint identifier.
  Arxiv,
  /// JSTOR stable-URL identifier.
  Jstor,
  /// A bare URL that matched none of the above.
  Url,
}

/// A single identifier recovered from a document, with its provenance and
/// validity flag.
///
/// Identifiers with `provenance != Provenance::User` that fail validation are
/// dropped before presentation (see [`IdentifierSet::insert`]); a user-entered
/// identifier is kept even if momentarily invalid so the edit UI can show why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
  pub kind:       IdentifierKind,
  pub value:      String,
  pub provenance: Provenance,
  pub valid:      bool,
}

/// The set of identifiers attached to a paper.
///
/// Enforces: at most one DOI, at most one arXiv id, at most one JSTOR id.
/// ISBN, ISSN, and URL identifiers may repeat (an ISSN pair commonly has a
/// print and an online form; a book may list several ISBNs for different
/// bindings).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentifierSet {
  items: Vec<Identifier>,
}

impl IdentifierSet {
  /// Creates an empty identifier set.
  pub fn new() -> Self { Self::default() }

  /// Inserts an identifier, enforcing the uniqueness invariants for
  /// DOI/arXiv/JSTOR and dropping non-user identifiers that fail validation.
  ///
  /// A later insert of the same singleton kind replaces the earlier one only
  /// if the new entry's provenance is `>=` the existing one's (a catalog hit
  /// should not be clobbered by a lower-confidence regex re-scan of the same
  /// text, but a user edit always wins).
  pub fn insert(&mut self, identifier: Identifier) {
    if identifier.provenance != Provenance::User && !identifier.valid {
      return;
    }

    if matches!(identifier.kind, IdentifierKind::Doi | IdentifierKind::Arxiv | IdentifierKind::Jstor) {
      if let Some(existing) =
        self.items.iter_mut().find(|i| i.kind == identifier.kind)
      {
        if identifier.provenance >= existing.provenance {
          *existing = identifier;
        }
        return;
      }
    }

    self.items.push(identifier);
  }

  /// Returns the first identifier of the given kind, if any.
  pub fn first_of(&self, kind: IdentifierKind) -> Option<&Identifier> {
    self.items.iter().find(|i| i.kind == kind)
  }

  /// Returns all identifiers of the given kind, in insertion order.
  pub fn all_of(&self, kind: IdentifierKind) -> impl Iterator<Item = &Identifier> {
    self.items.iter().filter(move |i| i.kind == kind)
  }

  /// Iterates over every identifier in the set.
  pub fn iter(&self) -> impl Iterator<Item = &Identifier> { self.items.iter() }

  /// True if the set contains no identifiers.
  pub fn is_empty(&self) -> bool { self.items.is_empty() }
}

/// The closed set of document types this system reasons about.
///
/// A tagged variant, not a free-form string, so that the `document_type`
/// rule cascade in `cascade::classify_document_type` is exhaustive and the
/// compiler catches an unmatched case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentType {
  JournalArticle,
  BookChapter,
  ConferencePaper,
  Book,
  Thesis,
  Report,
  Preprint,
  NewsArticle,
  Unknown,
}

impl std::fmt::Display for DocumentType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      DocumentType::JournalArticle => "journal_article",
      DocumentType::BookChapter => "book_chapter",
      DocumentType::ConferencePaper => "conference_paper",
      DocumentType::Book => "book",
      DocumentType::Thesis => "thesis",
      DocumentType::Report => "report",
      DocumentType::Preprint => "preprint",
      DocumentType::NewsArticle => "news_article",
      DocumentType::Unknown => "unknown",
    };
    write!(f, "{s}")
  }
}

impl std::str::FromStr for DocumentType {
  type Err = ArchivistError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s {
      "journal_article" => DocumentType::JournalArticle,
      "book_chapter" => DocumentType::BookChapter,
      "conference_paper" => DocumentType::ConferencePaper,
      "book" => DocumentType::Book,
      "thesis" => DocumentType::Thesis,
      "report" => DocumentType::Report,
      "preprint" => DocumentType::Preprint,
      "news_article" => DocumentType::NewsArticle,
      "unknown" => DocumentType::Unknown,
      other => return Err(ArchivistError::InvalidVariant(other.to_owned())),
    })
  }
}

/// An author's name.
///
/// Invariant: at least one of (`given` + `family`) or `literal` is
/// non-empty — enforced in [`AuthorName::new`], which is the only
/// constructor; there is no public way to build an invalid value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorName {
  pub given:   Option<String>,
  pub family:  Option<String>,
  pub literal: Option<String>,
}

impl AuthorName {
  /// Builds an author name, rejecting the all-empty case.
  pub fn new(
    given: Option<String>,
    family: Option<String>,
    literal: Option<String>,
  ) -> Result<Self, ArchivistError> {
    let given = given.filter(|s| !s.trim().is_empty());
    let family = family.filter(|s| !s.trim().is_empty());
    let literal = literal.filter(|s| !s.trim().is_empty());

    if family.is_none() && literal.is_none() {
      return Err(ArchivistError::ValidationFailed(
        "author name needs a family name or a literal form".into(),
      ));
    }
    Ok(Self { given, family, literal })
  }

  /// A single literal-name author, e.g. an organization or unparsed byline.
  pub fn literal(name: impl Into<String>) -> Result<Self, ArchivistError> {
    Self::new(None, None, Some(name.into()))
  }

  /// The family name used for matching and filename generation, falling back
  /// to the literal form's last whitespace-separated token.
  pub fn match_key(&self) -> String {
    if let Some(family) = &self.family {
      return family.to_lowercase();
    }
    self.literal.as_deref().unwrap_or_default().split_whitespace().last().unwrap_or_default().to_lowercase()
  }

  /// A human-displayable full name.
  pub fn display_name(&self) -> String {
    if let Some(literal) = &self.literal {
      return literal.clone();
    }
    match (&self.given, &self.family) {
      (Some(g), Some(f)) => format!("{g} {f}"),
      (None, Some(f)) => f.clone(),
      _ => String::new(),
    }
  }
}

/// The neutral bibliographic field set every extraction stage writes into.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bibliographic {
  pub document_type: Option<DocumentType>,
  pub title:         Option<String>,
  pub authors:        Vec<AuthorName>,
  pub year:          Option<u16>,
  pub container:     Option<String>,
  pub volume:        Option<String>,
  pub issue:         Option<String>,
  pub pages:         Option<String>,
  pub publisher:     Option<String>,
  pub abstract_text: Option<String>,
  pub keywords:      BTreeSet<String>,
  pub language:      Option<String>,
}

/// Per-field provenance, keyed by field name.
///
/// A user-edit overrides all earlier provenances for that key; callers should
/// go through [`ProvenanceMap::record`] rather than inserting directly so the
/// dominance invariant holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvenanceMap {
  fields: std::collections::BTreeMap<String, Provenance>,
}

impl ProvenanceMap {
  pub fn new() -> Self { Self::default() }

  /// Records that `field` was produced by `provenance`, unless the field is
  /// already tagged `Provenance::User` (a user edit can never be silently
  /// overwritten by a later stage).
  pub fn record(&mut self, field: impl Into<String>, provenance: Provenance) {
    let field = field.into();
    match self.fields.get(&field) {
      Some(Provenance::User) => {},
      _ => {
        self.fields.insert(field, provenance);
      },
    }
  }

  pub fn get(&self, field: &str) -> Option<Provenance> { self.fields.get(field).copied() }
}

/// A distinct proposed year for a field, labelled by the stage that proposed
/// it — used to surface year conflicts to the user at `YearConfirm` without
/// silently picking a winner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearCandidate {
  pub year:       u16,
  pub provenance: Provenance,
}

/// The mutable record tracked for one document across the cascade and the
/// approval flow. Durable only after the user commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
  pub source_pdf_path:          PathBuf,
  pub language_hint:            Option<String>,
  pub identifiers:               IdentifierSet,
  pub bibliographic:             Bibliographic,
  pub provenance:                ProvenanceMap,
  pub year_candidates:           Vec<YearCandidate>,
  pub processing_time_seconds:  f64,
  pub warnings:                  Vec<String>,
}

impl Paper {
  /// Starts a new, empty record for a freshly observed source file.
  pub fn new(source_pdf_path: PathBuf, language_hint: Option<String>) -> Self {
    Self {
      source_pdf_path,
      language_hint,
      identifiers: IdentifierSet::new(),
      bibliographic: Bibliographic::default(),
      provenance: ProvenanceMap::new(),
      year_candidates: Vec::new(),
      processing_time_seconds: 0.0,
      warnings: Vec::new(),
    }
  }

  /// Records a warning without failing the cascade.
  pub fn warn(&mut self, message: impl Into<String>) { self.warnings.push(message.into()); }

  /// Proposes a year from a given stage, deduplicating identical
  /// `(year, provenance)` pairs and leaving conflict resolution to the UI.
  pub fn propose_year(&mut self, year: u16, provenance: Provenance) {
    if !self.year_candidates.iter().any(|c| c.year == year && c.provenance == provenance) {
      self.year_candidates.push(YearCandidate { year, provenance });
    }
  }
}
