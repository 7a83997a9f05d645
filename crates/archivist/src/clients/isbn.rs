//! Client for resolving ISBNs against Open Library (C3).
//!
//! Not present in the teacher's own client set — added because the spec's
//! document-type cascade needs a book/monograph catalog lookup alongside the
//! teacher's DOI and arXiv clients, following the same request/retry/convert
//! shape as [`super::crossref`].

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use super::retry::{classify, with_retry, RetryableError};
use crate::{
  errors::ArchivistError,
  paper::{AuthorName, Bibliographic, DocumentType},
};

#[derive(Debug, Deserialize)]
struct OpenLibraryAuthor {
  name: String,
}

#[derive(Debug, Deserialize)]
struct OpenLibraryEntry {
  title:            String,
  #[serde(default)]
  authors:           Vec<OpenLibraryAuthor>,
  publish_date:     Option<String>,
  publishers:       Option<Vec<String>>,
  number_of_pages:  Option<u32>,
}

/// Client for the Open Library "bibkeys" lookup API.
pub struct IsbnClient {
  client:   reqwest::Client,
  base_url: String,
}

impl IsbnClient {
  /// Builds a new client with a fresh connection pool.
  pub fn new() -> Self {
    Self {
      client:   reqwest::Client::new(),
      base_url: "https://openlibrary.org/api/books".to_string(),
    }
  }

  /// Resolves `isbn` (digits-only, canonical form) to a partial
  /// [`Bibliographic`] record.
  pub async fn resolve(&self, isbn: &str) -> Result<Bibliographic, ArchivistError> {
    let bibkey = format!("ISBN:{isbn}");
    let url = format!("{}?bibkeys={bibkey}&format=json&jscmd=data", self.base_url);
    debug!(%url, "querying open library");

    let entry = with_retry("open_library", |_| async {
      let response = self.client.get(&url).send().await?;
      classify(response.status())?;
      let body = response.text().await?;
      let mut parsed: HashMap<String, OpenLibraryEntry> = serde_json::from_str(&body)
        .map_err(|e| ArchivistError::ApiError(format!("open_library: failed to parse JSON: {e}")))
        .map_err(RetryableError::Fatal)?;
      parsed.remove(&bibkey).ok_or(RetryableError::Fatal(ArchivistError::NotFound))
    })
    .await?;

    let authors = entry
      .authors
      .into_iter()
      .filter_map(|a| AuthorName::literal(a.name).ok())
      .collect();

    Ok(Bibliographic {
      document_type: Some(DocumentType::Book),
      title:          Some(entry.title),
      authors,
      year:           entry.publish_date.as_deref().and_then(extract_year),
      container:      None,
      volume:         None,
      issue:          None,
      pages:          entry.number_of_pages.map(|n| n.to_string()),
      publisher:      entry.publishers.and_then(|p| p.into_iter().next()),
      abstract_text:  None,
      keywords:       Default::default(),
      language:       None,
    })
  }
}

impl Default for IsbnClient {
  fn default() -> Self { Self::new() }
}

/// Open Library's `publish_date` is a free-text string (e.g. "March 2019",
/// "2019"); pull the first four-digit run out of it.
fn extract_year(s: &str) -> Option<u16> {
  let digits: Vec<char> = s.chars().collect();
  for window in digits.windows(4) {
    if window.iter().all(|c| c.is_ascii_digit()) {
      let candidate: String = window.iter().collect();
      if let Ok(year) = candidate.parse::<u16>() {
        if (1000..=2100).contains(&year) {
          return Some(year);
        }
      }
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extracts_year_from_free_text_date() {
    assert_eq!(extract_year("March 2019"), Some(2019));
    assert_eq!(extract_year("2005"), Some(2005));
    assert_eq!(extract_year("unknown"), None);
  }
}
