//! Client for resolving arXiv identifiers against the Atom feed API (C3).

use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::debug;

use super::retry::{classify, with_retry, RetryableError};
use crate::{
  errors::ArchivistError,
  paper::{AuthorName, Bibliographic, DocumentType},
};

#[derive(Debug, Deserialize)]
struct Feed {
  #[serde(rename = "entry", default)]
  entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
  title:     String,
  #[serde(rename = "author", default)]
  authors:   Vec<Author>,
  summary:   String,
  published: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct Author {
  name: String,
}

/// Client for the arXiv Atom feed API, accepting both new-style
/// (`2301.07041`) and legacy (`math.AG/0601001`) identifiers.
pub struct ArxivClient {
  client: reqwest::Client,
}

impl ArxivClient {
  /// Builds a new client with a fresh connection pool.
  pub fn new() -> Self { Self { client: reqwest::Client::new() } }

  /// Resolves an arXiv identifier to a partial [`Bibliographic`] record.
  pub async fn resolve(&self, identifier: &str) -> Result<Bibliographic, ArchivistError> {
    let url = format!("http://export.arxiv.org/api/query?id_list={identifier}&max_results=1");
    debug!(%url, "querying arxiv");

    let entry = with_retry("arxiv", |_| async {
      let response = self.client.get(&url).send().await?;
      classify(response.status())?;
      let body = response.text().await?;
      let feed: Feed = from_str(&body)
        .map_err(|e| ArchivistError::ApiError(format!("arxiv: failed to parse XML: {e}")))
        .map_err(RetryableError::Fatal)?;
      feed.entries.into_iter().next().ok_or(RetryableError::Fatal(ArchivistError::NotFound))
    })
    .await?;

    let authors = entry
      .authors
      .into_iter()
      .filter_map(|a| AuthorName::literal(a.name).ok())
      .collect();

    Ok(Bibliographic {
      document_type: Some(DocumentType::Preprint),
      title:          Some(normalize_whitespace(&entry.title)),
      authors,
      year:           u16::try_from(entry.published.format("%Y").to_string().parse::<i32>().unwrap_or(0)).ok(),
      container:      Some("arXiv".to_string()),
      volume:         None,
      issue:          None,
      pages:          None,
      publisher:      None,
      abstract_text:  Some(normalize_whitespace(&entry.summary)),
      keywords:       Default::default(),
      language:       None,
    })
  }
}

impl Default for ArxivClient {
  fn default() -> Self { Self::new() }
}

/// Atom feed titles/summaries often carry embedded newlines from the
/// source LaTeX; collapse runs of whitespace to single spaces.
fn normalize_whitespace(s: &str) -> String { s.split_whitespace().collect::<Vec<_>>().join(" ") }


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn collapses_embedded_newlines() {
    assert_eq!(normalize_whitespace("A title\nwith a\n  line break"), "A title with a line break");
  }
}
