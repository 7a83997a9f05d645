//! The interactive approval state machine (C12) — the heart of the system.
//!
//! Modeled as an explicit `State`/`Event`/[`transition`] triple rather than
//! the deep, interleaved control-flow the distilled spec's source material
//! used: every legal branch in the diagram at spec §4.12 is a match arm
//! here, so "back"/"restart" are correct by construction and the whole
//! thing replays deterministically without a terminal — [`tty`] is the only
//! piece that actually touches a TTY.
//!
//! [`CommitToken`] is the type-level guarantee backing the spec's "commit
//! without `y` at FINAL_CONFIRM is impossible" invariant: its only
//! constructor is private to this module and is reached solely via the
//! `FinalConfirm -> Commit` arm of [`transition`].

pub mod tty;

use std::path::PathBuf;

use archivist::{
  config::Config,
  filename,
  paper::{DocumentType, Paper, Provenance},
  placement::{self, MountTable, PlacementAction},
  store::{
    api::StoreApiClient,
    local::{ContainerInfo, LocalStore, StoreItem},
  },
  validators::{AuthorValidator, ValidationResult},
};
use tracing::{info, warn};

use crate::errors::ArchivistdErrors;

/// Proof that the user answered `y` at `FinalConfirm`. Unforgeable outside
/// this module: the only place one is constructed is the `FinalConfirm` →
/// `Commit` arm of [`transition`].
#[derive(Debug)]
pub struct CommitToken(());

/// A candidate or selected store item enriched with the container label and
/// tags `show_candidates`/`show_item_review` display alongside it, so the
/// cascade of `get_container_info`/`get_tags` calls happens once per search
/// rather than once per render.
#[derive(Debug, Clone)]
pub struct CandidateView {
  pub item:      StoreItem,
  pub container: ContainerInfo,
  pub tags:      Vec<String>,
}

/// A state in the approval flow. Carries just enough data to resume a
/// replayed session: selected item keys, not whole records (those live in
/// the orchestrator's mutable [`ApprovalContext`], not in the pure state).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
  YearConfirm,
  DocType,
  MetadataDisplay,
  AuthorSelection,
  ZoteroSearch,
  ItemReview { item_key: String },
  MetadataEditor { return_to: Box<State> },
  CreateNew,
  OnlineCheck,
  FinalConfirm { return_to: Box<State> },
  Done,
  Skipped,
  Failed,
  Manual,
  Quit,
}

/// An event driving a transition. Single-character selectors in the spec's
/// input model map one-to-one onto these variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
  YearAccepted,
  DocTypeChosen(DocumentType),
  Continue,
  AuthorsChosen,
  SearchCompleted,
  SelectItem(String),
  SearchAgain,
  EditMetadata,
  CreateNew,
  Skip,
  Back,
  Restart,
  FinishEditing,
  UseExtracted,
  UseExisting,
  MergeFields,
  Edit,
  OnlineEnrich,
  ManualLater,
  CreateNewInstead,
  UseOnline,
  Cancel,
  ConfirmFinal,
  RejectFinal,
  ReopenItemSelection,
  Quit,
}

/// What the orchestrator should do in response to a transition: run an
/// I/O-bound step, render something, or (on `Commit`) actually execute the
/// side effects gated by [`CommitToken`].
#[derive(Debug)]
pub enum Action {
  ShowYearConflict,
  ShowDocTypeMenu,
  ShowMetadata,
  ShowAuthorChecklist,
  RunZoteroSearch,
  ShowCandidates,
  ShowItemReview(String),
  OpenEditor,
  ShowOnlineEnrichDiff,
  ShowFinalConfirmSummary,
  Commit(CommitToken),
  Abort(String),
}

/// The terminal disposition of one document's approval session.
#[derive(Debug)]
pub enum Outcome {
  /// The user committed: file placed, bibliographic action taken.
  Committed { item_key: Option<String>, target_path: PathBuf, stage_of_success: &'static str },
  /// User chose `[s]kip` or an equivalent path; non-destructive.
  Skipped,
  /// An unrecoverable error occurred mid-flow; moved to `failed/`.
  Failed(String),
  /// Partial store-api failure on commit; moved to `manual/` with a note.
  Manual(String),
  /// `q` at a menu, or SIGINT during the interactive flow: orderly
  /// shutdown, document left untouched in the scan directory.
  QuitRequested,
}

/// The pure transition table. `Err` only for state/event combinations the
/// diagram never defines — a programmer error, surfaced rather than
/// silently absorbed.
pub fn transition(state: State, event: Event) -> Result<(State, Vec<Action>), ArchivistdErrors> {
  use Event::*;
  use State::*;

  if matches!(event, Quit) {
    return Ok((Quit, vec![]));
  }

  match (state, event) {
    (YearConfirm, YearAccepted) => Ok((DocType, vec![Action::ShowDocTypeMenu])),
    (DocType, DocTypeChosen(_)) => Ok((MetadataDisplay, vec![Action::ShowMetadata])),
    (MetadataDisplay, Continue) => Ok((AuthorSelection, vec![Action::ShowAuthorChecklist])),
    (AuthorSelection, AuthorsChosen) => Ok((ZoteroSearch, vec![Action::RunZoteroSearch])),
    (AuthorSelection, Back) => Ok((MetadataDisplay, vec![Action::ShowMetadata])),

    (ZoteroSearch, SearchCompleted) => Ok((ZoteroSearch, vec![Action::ShowCandidates])),
    (ZoteroSearch, SelectItem(key)) => {
      Ok((ItemReview { item_key: key.clone() }, vec![Action::ShowItemReview(key)]))
    },
    (ZoteroSearch, SearchAgain) => Ok((AuthorSelection, vec![Action::ShowAuthorChecklist])),
    (ZoteroSearch, EditMetadata) => {
      Ok((MetadataEditor { return_to: Box::new(ZoteroSearch) }, vec![Action::OpenEditor]))
    },
    (ZoteroSearch, CreateNew) => Ok((CreateNew, vec![])),
    (ZoteroSearch, Skip) => Ok((Skipped, vec![])),
    (ZoteroSearch, Back) => Ok((AuthorSelection, vec![Action::ShowAuthorChecklist])),
    (ZoteroSearch, Restart) => Ok((YearConfirm, vec![Action::ShowYearConflict])),

    (ItemReview { item_key }, Edit) => {
      Ok((MetadataEditor { return_to: Box::new(ItemReview { item_key }) }, vec![Action::OpenEditor]))
    },
    (ItemReview { item_key }, UseExtracted) => {
      Ok((FinalConfirm { return_to: Box::new(ItemReview { item_key }) }, vec![Action::ShowFinalConfirmSummary]))
    },
    (ItemReview { item_key }, UseExisting) => {
      Ok((FinalConfirm { return_to: Box::new(ItemReview { item_key }) }, vec![Action::ShowFinalConfirmSummary]))
    },
    (ItemReview { item_key }, MergeFields) => {
      Ok((FinalConfirm { return_to: Box::new(ItemReview { item_key }) }, vec![Action::ShowFinalConfirmSummary]))
    },
    (ItemReview { item_key }, OnlineEnrich) => {
      Ok((ItemReview { item_key }, vec![Action::ShowOnlineEnrichDiff]))
    },
    (ItemReview { .. }, ManualLater) => Ok((Manual, vec![])),
    (ItemReview { .. }, CreateNewInstead) => Ok((CreateNew, vec![])),
    (ItemReview { .. }, Back) => Ok((ZoteroSearch, vec![Action::ShowCandidates])),

    (MetadataEditor { return_to }, FinishEditing) => {
      let action = match return_to.as_ref() {
        ZoteroSearch => Action::ShowCandidates,
        ItemReview { item_key } => Action::ShowItemReview(item_key.clone()),
        _ => Action::ShowMetadata,
      };
      Ok((*return_to, vec![action]))
    },

    (CreateNew, Continue) => Ok((OnlineCheck, vec![])),
    (OnlineCheck, UseOnline) => {
      Ok((FinalConfirm { return_to: Box::new(CreateNew) }, vec![Action::ShowFinalConfirmSummary]))
    },
    (OnlineCheck, UseExtracted) => {
      Ok((FinalConfirm { return_to: Box::new(CreateNew) }, vec![Action::ShowFinalConfirmSummary]))
    },
    (OnlineCheck, Cancel) => Ok((ZoteroSearch, vec![Action::ShowCandidates])),

    (FinalConfirm { .. }, ConfirmFinal) => Ok((Done, vec![Action::Commit(CommitToken(()))])),
    (FinalConfirm { return_to }, RejectFinal) => {
      let action = match return_to.as_ref() {
        ZoteroSearch => Action::ShowCandidates,
        ItemReview { item_key } => Action::ShowItemReview(item_key.clone()),
        CreateNew => Action::ShowOnlineEnrichDiff,
        _ => Action::ShowMetadata,
      };
      Ok((*return_to, vec![action]))
    },
    (FinalConfirm { .. }, ReopenItemSelection) => Ok((ZoteroSearch, vec![Action::ShowCandidates])),

    (state, event) => Err(ArchivistdErrors::IllegalTransition(format!("{state:?} + {event:?}"))),
  }
}

/// Drives [`transition`] end-to-end for one [`Paper`], using `tty` for every
/// user-facing prompt and interleaving C7/C13/C8/C9/C10 as each `Action`
/// demands. This is the only place those side effects happen; `transition`
/// itself never touches the network, the store, or the filesystem.
pub async fn run_interactive(
  paper: &mut Paper,
  config: &Config,
  mount_table: &MountTable,
  tty: &mut tty::Tty,
) -> Result<Outcome, ArchivistdErrors> {
  let local_store = LocalStore::open(&config.paths.local_store_db_path).await.ok();
  let store_api = StoreApiClient::new(config.apis.bibliographic_api_base_url.clone(), &config.apis);
  let mut author_validator = AuthorValidator::open(&config.paths.local_store_db_path).await;
  author_validator.refresh_if_needed().await;

  let mut candidates: Vec<CandidateView> = Vec::new();
  let mut selected: Option<CandidateView> = None;
  let mut state = State::YearConfirm;
  // Set once the user has explicitly accepted the Unknown_Author warning;
  // gates `Action::Commit` below per spec.md §4.10's forbidden-unless-
  // accepted rule.
  let mut unknown_author_ack = false;

  if !paper.year_candidates.is_empty() {
    tty.show_year_conflict(&paper.year_candidates);
  }

  loop {
    let event = match &state {
      State::YearConfirm => tty.ask_year_confirm(paper),
      #[allow(unreachable_patterns)]
      State::DocType => tty.ask_doc_type(),
      State::MetadataDisplay => tty.ask_continue_after_metadata(paper),
      State::AuthorSelection => tty.ask_author_selection(&paper.bibliographic.authors),
      State::ZoteroSearch => tty.ask_zotero_search_choice(&candidates),
      State::ItemReview { .. } => tty.ask_item_review_choice(selected.as_ref()),
      State::MetadataEditor { .. } => {
        tty.run_editor(paper, config.apis.crossref_email.as_deref()).await;
        Event::FinishEditing
      },
      State::CreateNew => Event::Continue,
      State::OnlineCheck => tty.ask_online_check_choice(),
      State::FinalConfirm { .. } => tty.ask_final_confirm(),
      State::Done | State::Skipped | State::Failed | State::Manual | State::Quit => break,
    };

    let (next_state, actions) = transition(state, event)?;
    state = next_state;

    for action in actions {
      match action {
        Action::ShowYearConflict => tty.show_year_conflict(&paper.year_candidates),
        Action::ShowDocTypeMenu => tty.show_doc_type_menu(),
        Action::ShowMetadata => tty.show_metadata(paper),
        Action::ShowAuthorChecklist => {
          let hits: Vec<ValidationResult> = paper
            .bibliographic
            .authors
            .iter()
            .map(|author| author_validator.validate(&author.match_key()))
            .collect();
          tty.show_author_checklist(&paper.bibliographic.authors, &hits);
        },
        Action::RunZoteroSearch => {
          candidates = run_zotero_search(paper, local_store.as_ref()).await?;
          tty.show_candidates(&candidates);
        },
        Action::ShowCandidates => tty.show_candidates(&candidates),
        Action::ShowItemReview(ref key) => {
          selected = candidates.iter().find(|c| c.item.key == *key).cloned();
          if let Some(view) = &selected {
            tty.show_item_review(view);
          }
        },
        Action::OpenEditor => {},
        Action::ShowOnlineEnrichDiff => tty.show_online_enrich_diff(paper),
        Action::ShowFinalConfirmSummary => {
          let preview = build_commit_plan(paper, selected.as_ref(), config)?;
          if filename::is_unknown_author(&paper.bibliographic) && !unknown_author_ack {
            unknown_author_ack = tty.confirm_unknown_author_warning();
          }
          tty.show_final_confirm_summary(&preview);
        },
        Action::Commit(token) => {
          if filename::is_unknown_author(&paper.bibliographic) && !unknown_author_ack {
            return Ok(Outcome::Failed(
              "commit refused: Unknown_Author filename was never explicitly accepted".into(),
            ));
          }
          return execute_commit(paper, selected.as_ref(), config, mount_table, &store_api, token).await;
        },
        Action::Abort(reason) => return Ok(Outcome::Failed(reason)),
      }
    }

    if matches!(state, State::Skipped) {
      return Ok(Outcome::Skipped);
    }
    if matches!(state, State::Manual) {
      return Ok(Outcome::Manual("moved to manual review by user choice".into()));
    }
    if matches!(state, State::Quit) {
      return Ok(Outcome::QuitRequested);
    }
  }

  Ok(Outcome::Skipped)
}

async fn run_zotero_search(
  paper: &Paper,
  local_store: Option<&LocalStore>,
) -> Result<Vec<CandidateView>, ArchivistdErrors> {
  const MAX_CANDIDATES: usize = 10;
  let Some(store) = local_store else { return Ok(Vec::new()) };

  let items = if let Some(doi) = paper.identifiers.first_of(archivist::paper::IdentifierKind::Doi) {
    let by_doi = store.search_by_doi(&doi.value).await?;
    by_doi
  } else {
    Vec::new()
  };

  let items = if !items.is_empty() {
    items
  } else {
    let family_names: Vec<String> = paper.bibliographic.authors.iter().map(|a| a.match_key()).collect();
    let by_authors = if !family_names.is_empty() {
      store.search_by_authors_ordered(&family_names, paper.bibliographic.year, MAX_CANDIDATES).await?
    } else {
      Vec::new()
    };
    if !by_authors.is_empty() {
      by_authors
    } else if let Some(title) = &paper.bibliographic.title {
      store.search_by_title_fuzzy(title, 0.75).await?
    } else {
      Vec::new()
    }
  };

  enrich_candidates(store, items).await
}

/// Fetches container label and tags for each matched item so the approval
/// UI can show library context (journal/book/conference, tags) alongside
/// the bare title/year/key the search itself returns.
async fn enrich_candidates(
  store: &LocalStore,
  items: Vec<StoreItem>,
) -> Result<Vec<CandidateView>, ArchivistdErrors> {
  let mut views = Vec::with_capacity(items.len());
  for item in items {
    let container = store.get_container_info(&item.key).await?;
    let tags = store.get_tags(&item.key).await?;
    views.push(CandidateView { item, container, tags });
  }
  Ok(views)
}

/// A preview (and, post-commit, a record) of every side effect a commit
/// will perform, shown verbatim at `FinalConfirm` per spec.
#[derive(Debug, Clone)]
pub struct CommitPlan {
  pub filename:        String,
  pub target_path:     PathBuf,
  pub placement_action: PlacementAction,
  pub store_action:     StoreAction,
  /// Where `daemon::finalize` will move the source scan on a `Committed`
  /// outcome: `scanner_papers_dir/done/<source file name>`.
  pub done_destination: PathBuf,
}

/// What will happen to the bibliographic store on commit.
#[derive(Debug, Clone)]
pub enum StoreAction {
  AttachToExisting { item_key: String },
  CreateAndAttach,
  None,
}

fn build_commit_plan(
  paper: &Paper,
  selected: Option<&CandidateView>,
  config: &Config,
) -> Result<CommitPlan, ArchivistdErrors> {
  let filename = filename::generate(&paper.bibliographic);
  let store_action = match selected {
    Some(view) => StoreAction::AttachToExisting { item_key: view.item.key.clone() },
    None => StoreAction::CreateAndAttach,
  };
  let plan = placement::resolve(&paper.source_pdf_path, &filename, &config.paths.publications_dir)?;
  let done_destination = paper
    .source_pdf_path
    .file_name()
    .map(|name| config.paths.scanner_papers_dir.join("done").join(name))
    .unwrap_or_else(|| config.paths.scanner_papers_dir.join("done"));
  Ok(CommitPlan {
    target_path: plan.target_absolute_path,
    filename,
    placement_action: plan.action,
    store_action,
    done_destination,
  })
}

/// Executes the side effects gated by `_token`: placement, then whatever
/// store mutation the plan calls for, then abstract enrichment. Any partial
/// failure here routes to `Outcome::Manual`, per spec's "nothing half-
/// committed silently" rule.
async fn execute_commit(
  paper: &mut Paper,
  selected: Option<&CandidateView>,
  config: &Config,
  mount_table: &MountTable,
  store_api: &StoreApiClient,
  _token: CommitToken,
) -> Result<Outcome, ArchivistdErrors> {
  let filename = filename::generate(&paper.bibliographic);
  let decision = placement::place(
    &paper.source_pdf_path,
    &filename,
    &config.paths.publications_dir,
    mount_table,
  )?;

  if decision.action == PlacementAction::Skip {
    return Ok(Outcome::Manual(decision.error.clone().unwrap_or_else(|| "placement failed".into())));
  }

  let host_path = decision.cross_boundary_path.clone().unwrap_or_else(|| decision.target_absolute_path.display().to_string());

  let item_key = match selected {
    Some(view) => {
      let item = &view.item;
      if let Err(e) = store_api.attach_linked_file(&item.key, &host_path, &filename).await {
        warn!(error = %e, item_key = %item.key, "attach_linked_file failed after placement succeeded");
        return Ok(Outcome::Manual(format!(
          "file placed at {} but attachment to {} failed: {e}",
          decision.target_absolute_path.display(),
          item.key
        )));
      }
      if let Some(abstract_text) = &paper.bibliographic.abstract_text {
        let _ = store_api.set_field_if_empty(&item.key, "abstractNote", abstract_text).await;
      }
      Some(item.key.clone())
    },
    None => match store_api.create_item(&paper.bibliographic).await {
      Ok(key) => {
        if let Err(e) = store_api.attach_linked_file(&key, &host_path, &filename).await {
          warn!(error = %e, item_key = %key, "attach_linked_file failed after item creation");
          return Ok(Outcome::Manual(format!("item {key} created but attachment failed: {e}")));
        }
        Some(key)
      },
      Err(e) => {
        warn!(error = %e, "create_item failed after placement succeeded");
        return Ok(Outcome::Manual(format!(
          "file placed at {} but no bibliographic item was created: {e}",
          decision.target_absolute_path.display()
        )));
      },
    },
  };

  paper.provenance.record("commit", Provenance::User);
  info!(?item_key, target = %decision.target_absolute_path.display(), "document committed");

  Ok(Outcome::Committed {
    item_key,
    target_path: decision.target_absolute_path,
    stage_of_success: "committed",
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn happy_path_reaches_done_only_after_confirm_final() {
    let mut state = State::YearConfirm;
    let script = [
      Event::YearAccepted,
      Event::DocTypeChosen(DocumentType::JournalArticle),
      Event::Continue,
      Event::AuthorsChosen,
      Event::SelectItem("ABCD1234".into()),
      Event::UseExisting,
    ];
    for event in script {
      let (next, _) = transition(state, event).unwrap();
      state = next;
    }
    assert!(matches!(state, State::FinalConfirm { .. }));
    let (final_state, actions) = transition(state, Event::ConfirmFinal).unwrap();
    assert_eq!(final_state, State::Done);
    assert!(matches!(actions.as_slice(), [Action::Commit(_)]));
  }

  #[test]
  fn reject_final_returns_to_the_state_it_came_from() {
    let state = State::ItemReview { item_key: "XYZ".into() };
    let (confirming, _) = transition(state, Event::UseExisting).unwrap();
    let (back, _) = transition(confirming, Event::RejectFinal).unwrap();
    assert_eq!(back, State::ItemReview { item_key: "XYZ".into() });
  }

  #[test]
  fn reopen_item_selection_from_final_confirm_goes_to_zotero_search() {
    let state = State::ItemReview { item_key: "XYZ".into() };
    let (confirming, _) = transition(state, Event::UseExisting).unwrap();
    let (reopened, _) = transition(confirming, Event::ReopenItemSelection).unwrap();
    assert_eq!(reopened, State::ZoteroSearch);
  }

  #[test]
  fn quit_is_reachable_from_any_state_and_is_terminal() {
    let (state, actions) = transition(State::MetadataDisplay, Event::Quit).unwrap();
    assert_eq!(state, State::Quit);
    assert!(actions.is_empty());
  }

  #[test]
  fn illegal_transition_is_rejected_not_silently_absorbed() {
    let result = transition(State::YearConfirm, Event::ConfirmFinal);
    assert!(result.is_err());
  }

  #[test]
  fn editor_returns_to_the_state_that_opened_it() {
    let (editing, _) = transition(State::ZoteroSearch, Event::EditMetadata).unwrap();
    assert_eq!(editing, State::MetadataEditor { return_to: Box::new(State::ZoteroSearch) });
    let (back, _) = transition(editing, Event::FinishEditing).unwrap();
    assert_eq!(back, State::ZoteroSearch);
  }
}
