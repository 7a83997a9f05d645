//! Client for resolving DOIs against the Crossref catalog (C3).

use serde::Deserialize;
use tracing::debug;

use super::retry::{classify, with_retry};
use crate::{
  errors::ArchivistError,
  paper::{AuthorName, Bibliographic, DocumentType},
};

/// Response envelope from `GET /works/{doi}`.
#[derive(Debug, Deserialize)]
struct CrossrefResponse {
  message: CrossrefWork,
}

#[derive(Debug, Deserialize)]
struct CrossrefWork {
  title:            Vec<String>,
  #[serde(default)]
  author:           Vec<CrossrefAuthor>,
  #[serde(rename = "abstract")]
  abstract_text:    Option<String>,
  #[serde(rename = "container-title", default)]
  container_title:  Vec<String>,
  volume:           Option<String>,
  issue:            Option<String>,
  page:             Option<String>,
  publisher:        Option<String>,
  #[serde(rename = "type")]
  work_type:        Option<String>,
  published_print:  Option<CrossrefDate>,
  published_online: Option<CrossrefDate>,
  created:          Option<CrossrefDate>,
}

#[derive(Debug, Deserialize)]
struct CrossrefAuthor {
  given:  Option<String>,
  family: Option<String>,
  name:   Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrossrefDate {
  #[serde(rename = "date-parts")]
  date_parts: Vec<Vec<i32>>,
}

/// Client for fetching bibliographic metadata from Crossref by DOI.
pub struct CrossrefClient {
  client:   reqwest::Client,
  base_url: String,
}

impl CrossrefClient {
  /// Builds a client that identifies itself with `politeness_email` in its
  /// user agent, as Crossref's API etiquette recommends for priority access.
  pub fn new(politeness_email: Option<&str>) -> Self {
    let user_agent = match politeness_email {
      Some(email) => format!("archivist/0.1 (mailto:{email})"),
      None => "archivist/0.1".to_string(),
    };
    Self {
      client:   reqwest::Client::builder().user_agent(user_agent).build().expect("static client config"),
      base_url: "https://api.crossref.org/works".to_string(),
    }
  }

  /// Resolves `doi` to a partial [`Bibliographic`] record, retrying on
  /// transient Crossref failures.
  pub async fn resolve(&self, doi: &str) -> Result<Bibliographic, ArchivistError> {
    let url = format!("{}/{}", self.base_url, doi);
    debug!(%url, "querying crossref");

    let work = with_retry("crossref", |_| async {
      let response = self.client.get(&url).send().await?;
      classify(response.status())?;
      if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(super::retry::RetryableError::Fatal(ArchivistError::NotFound));
      }
      let text = response.text().await?;
      let parsed: CrossrefResponse = serde_json::from_str(&text)
        .map_err(|e| ArchivistError::ApiError(format!("crossref: failed to parse JSON: {e}")))
        .map_err(super::retry::RetryableError::Fatal)?;
      Ok(parsed.message)
    })
    .await?;

    let title = work.title.into_iter().next();
    let authors = work
      .author
      .into_iter()
      .filter_map(|a| AuthorName::new(a.given, a.family, a.name).ok())
      .collect();

    let year = work
      .published_print
      .as_ref()
      .or(work.published_online.as_ref())
      .or(work.created.as_ref())
      .and_then(parse_year);

    Ok(Bibliographic {
      document_type: work.work_type.as_deref().map(classify_crossref_type),
      title,
      authors,
      year,
      container: work.container_title.into_iter().next(),
      volume: work.volume,
      issue: work.issue,
      pages: work.page,
      publisher: work.publisher,
      abstract_text: work.abstract_text,
      keywords: Default::default(),
      language: None,
    })
  }
}

fn parse_year(date: &CrossrefDate) -> Option<u16> {
  let year = *date.date_parts.first()?.first()?;
  u16::try_from(year).ok()
}

fn classify_crossref_type(work_type: &str) -> DocumentType {
  match work_type {
    "journal-article" => DocumentType::JournalArticle,
    "book-chapter" => DocumentType::BookChapter,
    "proceedings-article" => DocumentType::ConferencePaper,
    "book" | "monograph" => DocumentType::Book,
    "report" | "report-series" => DocumentType::Report,
    "dissertation" => DocumentType::Thesis,
    "posted-content" => DocumentType::Preprint,
    _ => DocumentType::Unknown,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classifies_known_crossref_types() {
    assert_eq!(classify_crossref_type("journal-article"), DocumentType::JournalArticle);
    assert_eq!(classify_crossref_type("posted-content"), DocumentType::Preprint);
    assert_eq!(classify_crossref_type("monograph"), DocumentType::Book);
  }

  #[test]
  fn unrecognized_type_falls_back_to_unknown() {
    assert_eq!(classify_crossref_type("grant"), DocumentType::Unknown);
  }

  #[test]
  fn parse_year_reads_first_date_part() {
    let date = CrossrefDate { date_parts: vec![vec![2019, 3, 14]] };
    assert_eq!(parse_year(&date), Some(2019));
  }

  #[test]
  fn parse_year_handles_empty_date_parts() {
    let date = CrossrefDate { date_parts: vec![] };
    assert_eq!(parse_year(&date), None);
  }
}
