//! The thin terminal adapter for the approval state machine.
//!
//! Every prompt lives here, in the same emoji-plus-`console::style` register
//! `learnerd`'s CLI uses; [`super::transition`] never imports this module,
//! so the state machine stays replay-testable without a terminal attached.

use archivist::{
  cascade,
  clients::CrossrefClient,
  identifiers::{normalize_doi, validate_doi},
  paper::{AuthorName, DocumentType, Identifier, IdentifierKind, Paper, Provenance, YearCandidate},
  validators::ValidationResult,
};
use console::{style, Emoji};
use dialoguer::{Confirm, Input, Select};

use super::{CandidateView, CommitPlan, StoreAction};
use crate::errors::ArchivistdErrors;

static PAPER: Emoji<'_, '_> = Emoji("📄 ", "");
static BOOKS: Emoji<'_, '_> = Emoji("📚 ", "");
static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✨ ", "");

/// Owns no state of its own; every call reads `Paper`/candidate data fresh
/// from its arguments so the driving loop in [`super::run_interactive`]
/// stays the single source of truth.
pub struct Tty;

impl Tty {
  pub fn new() -> Self { Self }

  pub fn show_year_conflict(&self, candidates: &[YearCandidate]) {
    if candidates.len() < 2 {
      return;
    }
    println!("{} Multiple years were proposed for this document:", style(WARNING).yellow());
    for candidate in candidates {
      println!("  {:?}  {}", candidate.provenance, style(candidate.year).yellow());
    }
  }

  pub fn ask_year_confirm(&self, paper: &mut Paper) -> super::Event {
    if paper.year_candidates.len() <= 1 {
      return super::Event::YearAccepted;
    }
    let options: Vec<String> = paper.year_candidates.iter().map(|c| c.year.to_string()).collect();
    if let Ok(choice) = Select::new().with_prompt("Which year is correct?").items(&options).default(0).interact() {
      paper.bibliographic.year = Some(paper.year_candidates[choice].year);
      paper.provenance.record("year", archivist::paper::Provenance::User);
    }
    super::Event::YearAccepted
  }

  pub fn show_doc_type_menu(&self) {
    println!("{} Confirm the document type:", style(BOOKS).cyan());
  }

  pub fn ask_doc_type(&self) -> super::Event {
    use archivist::paper::DocumentType::*;
    let options = [
      JournalArticle,
      BookChapter,
      ConferencePaper,
      Book,
      Thesis,
      Report,
      Preprint,
      NewsArticle,
      Unknown,
    ];
    let labels: Vec<String> = options.iter().map(|t| t.to_string()).collect();
    let choice = Select::new().with_prompt("Document type").items(&labels).default(0).interact().unwrap_or(0);
    super::Event::DocTypeChosen(options[choice])
  }

  pub fn show_metadata(&self, paper: &Paper) {
    println!("{} Extracted metadata:", style(PAPER).cyan());
    println!("  Title:   {}", paper.bibliographic.title.as_deref().unwrap_or("(none)"));
    println!("  Year:    {}", paper.bibliographic.year.map(|y| y.to_string()).unwrap_or_else(|| "(none)".into()));
    println!(
      "  Authors: {}",
      paper.bibliographic.authors.iter().map(AuthorName::display_name).collect::<Vec<_>>().join(", ")
    );
    if !paper.warnings.is_empty() {
      println!("{} Warnings:", style(WARNING).yellow());
      for warning in &paper.warnings {
        println!("  - {warning}");
      }
    }
  }

  pub fn ask_continue_after_metadata(&self, _paper: &Paper) -> super::Event { super::Event::Continue }

  /// Shows each extracted author alongside its Author-Validator (§4.13)
  /// library-hit count, so the user can see at a glance which names this
  /// document shares with existing entries before searching by them.
  pub fn show_author_checklist(&self, authors: &[AuthorName], hits: &[ValidationResult]) {
    println!("{} Authors to search by:", style(BOOKS).cyan());
    for (author, hit) in authors.iter().zip(hits.iter()) {
      let suffix = if hit.matched {
        format!(" — {} paper(s) in library", hit.paper_count)
      } else {
        String::new()
      };
      println!("  [x] {}{suffix}", author.display_name());
    }
  }

  pub fn ask_author_selection(&self, authors: &[AuthorName]) -> super::Event {
    if authors.is_empty() {
      return super::Event::AuthorsChosen;
    }
    super::Event::AuthorsChosen
  }

  pub fn show_candidates(&self, candidates: &[CandidateView]) {
    if candidates.is_empty() {
      println!("{} No matching items found in the store.", style(WARNING).yellow());
      return;
    }
    println!("{} Candidate items:", style(BOOKS).cyan());
    for (i, view) in candidates.iter().enumerate() {
      let item = &view.item;
      println!(
        "  [{}] {} ({}) — {}",
        i + 1,
        item.title,
        item.year.map(|y| y.to_string()).unwrap_or_else(|| "n.d.".into()),
        item.key
      );
      println!(
        "      {}: {}  Authors: {}  PDF: {}{}",
        view.container.label,
        view.container.value.as_deref().unwrap_or("(none)"),
        if item.authors.is_empty() { "(none)".into() } else { item.authors.join(", ") },
        item.has_pdf_attachment,
        item.doi.as_deref().map(|d| format!("  DOI: {d}")).unwrap_or_default(),
      );
      if let Some(preview) = item.abstract_text.as_deref().map(truncate_abstract) {
        println!("      {preview}");
      }
    }
  }

  pub fn ask_zotero_search_choice(&self, candidates: &[CandidateView]) -> super::Event {
    let mut labels: Vec<String> = candidates
      .iter()
      .map(|c| format!("{} ({})", c.item.title, c.item.year.map(|y| y.to_string()).unwrap_or_else(|| "n.d.".into())))
      .collect();
    labels.push("[search again with different terms]".into());
    labels.push("[edit metadata]".into());
    labels.push("[create new item]".into());
    labels.push("[skip this document]".into());
    labels.push("[back]".into());

    let choice = Select::new().with_prompt("Select a match, or choose an action").items(&labels).default(0).interact().unwrap_or(labels.len() - 1);

    match candidates.get(choice) {
      Some(view) => super::Event::SelectItem(view.item.key.clone()),
      None => {
        let action_index = choice - candidates.len();
        match action_index {
          0 => super::Event::SearchAgain,
          1 => super::Event::EditMetadata,
          2 => super::Event::CreateNew,
          3 => super::Event::Skip,
          _ => super::Event::Back,
        }
      },
    }
  }

  /// Tags come first here, ahead of container/authors/year, since this is
  /// the review step where the user is deciding whether this library entry
  /// really is the same work — tags are often the fastest tell.
  pub fn show_item_review(&self, view: &CandidateView) {
    let item = &view.item;
    println!("{} Reviewing candidate:", style(PAPER).cyan());
    println!("  Key:     {}", item.key);
    println!("  Title:   {}", item.title);
    if !view.tags.is_empty() {
      println!("  Tags:    {}", view.tags.join(", "));
    }
    println!(
      "  {}: {}",
      view.container.label,
      view.container.value.as_deref().unwrap_or("(none)")
    );
    println!(
      "  Authors: {}",
      if item.authors.is_empty() { "(none)".into() } else { item.authors.join(", ") }
    );
    println!("  Year:    {}", item.year.map(|y| y.to_string()).unwrap_or_else(|| "n.d.".into()));
    println!("  DOI:     {}", item.doi.as_deref().unwrap_or("(none)"));
    println!("  Has PDF: {}", item.has_pdf_attachment);
    if let Some(preview) = item.abstract_text.as_deref().map(truncate_abstract) {
      println!("  Abstract: {preview}");
    }
  }

  pub fn ask_item_review_choice(&self, view: Option<&CandidateView>) -> super::Event {
    let options = [
      "use extracted metadata",
      "use the existing item's metadata unchanged",
      "merge fields (fill only what's missing)",
      "edit metadata",
      "enrich from an online lookup",
      "move to manual review",
      "create a new item instead",
      "back",
    ];
    let choice = Select::new()
      .with_prompt(format!("Item {}: what next?", view.map(|v| v.item.key.as_str()).unwrap_or("?")))
      .items(&options)
      .default(0)
      .interact()
      .unwrap_or(7);
    match choice {
      0 => super::Event::UseExtracted,
      1 => super::Event::UseExisting,
      2 => super::Event::MergeFields,
      3 => super::Event::Edit,
      4 => super::Event::OnlineEnrich,
      5 => super::Event::ManualLater,
      6 => super::Event::CreateNewInstead,
      _ => super::Event::Back,
    }
  }

  pub fn show_online_enrich_diff(&self, paper: &Paper) {
    println!(
      "{} Online enrichment would fill: abstract={}",
      style(BOOKS).cyan(),
      paper.bibliographic.abstract_text.is_none()
    );
  }

  pub fn ask_online_check_choice(&self) -> super::Event {
    let options = ["use online metadata", "use extracted metadata", "cancel, go back"];
    let choice = Select::new().with_prompt("An online match was found").items(&options).default(1).interact().unwrap_or(2);
    match choice {
      0 => super::Event::UseOnline,
      1 => super::Event::UseExtracted,
      _ => super::Event::Cancel,
    }
  }

  /// Opens an editor-equivalent prompt sequence for the fields spec.md
  /// §4.12 calls out: title/year, then authors' `clear`/`first`/`last`/
  /// free-text-comma-split commands, then a DOI field that's always
  /// editable (independent of any selected store item) with a one-click
  /// re-fetch-and-merge on valid new input, then a numeric document-type
  /// menu. Enter keeps the current value at every prompt.
  pub async fn run_editor(&self, paper: &mut Paper, crossref_email: Option<&str>) {
    if let Ok(title) =
      Input::<String>::new().with_prompt("Title").with_initial_text(paper.bibliographic.title.clone().unwrap_or_default()).interact_text()
    {
      if !title.is_empty() {
        paper.bibliographic.title = Some(title);
        paper.provenance.record("title", Provenance::User);
      }
    }
    if let Ok(year_str) = Input::<String>::new()
      .with_prompt("Year")
      .with_initial_text(paper.bibliographic.year.map(|y| y.to_string()).unwrap_or_default())
      .allow_empty(true)
      .interact_text()
    {
      if let Ok(year) = year_str.parse::<u16>() {
        paper.bibliographic.year = Some(year);
        paper.provenance.record("year", Provenance::User);
      }
    }

    self.edit_authors(paper);
    self.edit_doi(paper, crossref_email).await;

    use DocumentType::*;
    let options = [JournalArticle, BookChapter, ConferencePaper, Book, Thesis, Report, Preprint, NewsArticle, Unknown];
    let labels: Vec<String> = options.iter().map(|t| t.to_string()).collect();
    let current = options.iter().position(|t| Some(*t) == paper.bibliographic.document_type).unwrap_or(0);
    if let Ok(choice) =
      Select::new().with_prompt("Document type (Enter to keep current)").items(&labels).default(current).interact()
    {
      if options[choice] != paper.bibliographic.document_type.unwrap_or(Unknown) || paper.bibliographic.document_type.is_none() {
        paper.bibliographic.document_type = Some(options[choice]);
        paper.provenance.record("document_type", Provenance::User);
      }
    }
  }

  /// Authors field: `clear` empties the list, `first`/`last` trim an
  /// over-extracted list down to one name, Enter keeps the current list,
  /// any other free text replaces it with a comma-split name list.
  fn edit_authors(&self, paper: &mut Paper) {
    let Ok(input) = Input::<String>::new()
      .with_prompt("Authors (comma-separated, or clear/first/last, Enter to keep)")
      .allow_empty(true)
      .interact_text()
    else {
      return;
    };
    match input.trim() {
      "" => {},
      "clear" => {
        paper.bibliographic.authors.clear();
        paper.provenance.record("authors", Provenance::User);
      },
      "first" => {
        if let Some(first) = paper.bibliographic.authors.first().cloned() {
          paper.bibliographic.authors = vec![first];
          paper.provenance.record("authors", Provenance::User);
        }
      },
      "last" => {
        if let Some(last) = paper.bibliographic.authors.last().cloned() {
          paper.bibliographic.authors = vec![last];
          paper.provenance.record("authors", Provenance::User);
        }
      },
      free_text => {
        let authors: Vec<AuthorName> =
          free_text.split(',').filter_map(|name| AuthorName::literal(name.trim()).ok()).collect();
        if !authors.is_empty() {
          paper.bibliographic.authors = authors;
          paper.provenance.record("authors", Provenance::User);
        }
      },
    }
  }

  /// DOI field: always editable regardless of any selected store item.
  /// Valid new input is recorded with user provenance; if no catalog
  /// metadata had been filled in yet, offers a one-click Crossref re-fetch
  /// and merges the response in with [`cascade::merge_bibliographic`]'s
  /// never-overwrite semantics.
  async fn edit_doi(&self, paper: &mut Paper, crossref_email: Option<&str>) {
    let existing = paper.identifiers.first_of(IdentifierKind::Doi).map(|i| i.value.clone());
    let Ok(input) = Input::<String>::new()
      .with_prompt("DOI")
      .with_initial_text(existing.clone().unwrap_or_default())
      .allow_empty(true)
      .interact_text()
    else {
      return;
    };
    if input.is_empty() || Some(input.clone()) == existing {
      return;
    }

    let normalized = normalize_doi(&input);
    if !validate_doi(&normalized) {
      println!("{} not a valid DOI, not saved", style(WARNING).yellow());
      return;
    }

    let had_catalog_metadata = paper.provenance.get("title").is_some_and(|p| p >= Provenance::Api);
    paper.identifiers.insert(Identifier { kind: IdentifierKind::Doi, value: normalized.clone(), provenance: Provenance::User, valid: true });
    paper.provenance.record("identifier:Doi", Provenance::User);

    if had_catalog_metadata {
      return;
    }
    let offer = Confirm::new().with_prompt("Re-fetch metadata from Crossref for this DOI and merge it in?").default(true).interact().unwrap_or(false);
    if !offer {
      return;
    }

    let client = CrossrefClient::new(crossref_email);
    match client.resolve(&normalized).await {
      Ok(bib) => {
        cascade::merge_bibliographic(paper, bib, Provenance::User);
        println!("{} metadata merged from Crossref", style(SUCCESS).green());
      },
      Err(e) => println!("{} crossref re-fetch failed: {e}", style(WARNING).yellow()),
    }
  }

  /// The gate behind spec.md §4.10's "Forbidden: `Unknown_Author` unless
  /// the user explicitly accepted a warning" — shown once a commit plan's
  /// filename would carry that fallback segment, before `FinalConfirm` is
  /// ever reached. Declining leaves the missing-author acknowledgement
  /// unset, which `execute_commit` re-checks before writing anything.
  pub fn confirm_unknown_author_warning(&self) -> bool {
    println!(
      "{} No author survived extraction; the filename will read \"Unknown_Author\".",
      style(WARNING).yellow()
    );
    Confirm::new()
      .with_prompt("Proceed with an Unknown_Author filename anyway?")
      .default(false)
      .interact()
      .unwrap_or(false)
  }

  pub fn show_final_confirm_summary(&self, plan: &CommitPlan) {
    use archivist::placement::PlacementAction;
    println!("{} Ready to commit:", style(SUCCESS).green());
    if plan.filename.starts_with("Unknown_Author") {
      println!("{} filename carries the Unknown_Author fallback", style(WARNING).yellow());
    }
    println!("  File:  {}", plan.filename);
    let verb = match plan.placement_action {
      PlacementAction::ReuseExisting => "reuse existing file at",
      PlacementAction::WriteNew => "write new file to",
      PlacementAction::WriteSuffixed => "write suffixed file to",
      PlacementAction::Skip => "FAILED to resolve a target for",
    };
    println!("  To:    {verb} {}", plan.target_path.display());
    match &plan.store_action {
      StoreAction::AttachToExisting { item_key } => println!("  Store: attach to existing item {item_key}"),
      StoreAction::CreateAndAttach => println!("  Store: create a new item and attach"),
      StoreAction::None => println!("  Store: no store action"),
    }
    println!("  Move:  source to {}", plan.done_destination.display());
  }

  pub fn ask_final_confirm(&self) -> super::Event {
    let options = ["[y] commit", "[n] back", "[z] reopen item selection"];
    let choice = Select::new().with_prompt("Confirm").items(&options).default(0).interact();
    match choice {
      Ok(0) => super::Event::ConfirmFinal,
      Ok(2) => super::Event::ReopenItemSelection,
      _ => super::Event::RejectFinal,
    }
  }
}

impl Default for Tty {
  fn default() -> Self { Self::new() }
}

/// A simple yes/no confirmation helper shared by the CLI's `stop` command.
pub fn confirm(prompt: &str, default: bool) -> Result<bool, ArchivistdErrors> {
  Confirm::new().with_prompt(prompt).default(default).interact().map_err(Into::into)
}

/// Truncates to 150 chars on a `char` boundary, appending an ellipsis if
/// anything was cut.
fn truncate_abstract(text: &str) -> String {
  const MAX: usize = 150;
  if text.chars().count() <= MAX {
    return text.to_string();
  }
  let truncated: String = text.chars().take(MAX).collect();
  format!("{truncated}…")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn truncate_abstract_leaves_short_text_untouched() {
    assert_eq!(truncate_abstract("a short abstract"), "a short abstract");
  }

  #[test]
  fn truncate_abstract_cuts_long_text_with_ellipsis() {
    let long = "x".repeat(200);
    let truncated = truncate_abstract(&long);
    assert_eq!(truncated.chars().count(), 151);
    assert!(truncated.ends_with('…'));
  }
}
