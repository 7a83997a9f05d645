//! The bibliographic store's write-side REST client (C8).
//!
//! Every call here reports success/failure independently rather than
//! wrapping a multi-step commit in one atomic operation — per the resource
//! model, there is no multi-store transaction; a caller that creates an item
//! and then fails to attach a file must be able to tell the user exactly
//! which half succeeded.

use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::{config::ApisConfig, errors::ArchivistError, paper::Bibliographic};

/// Client for the store's item/attachment/tag write endpoints.
pub struct StoreApiClient {
  client:      reqwest::Client,
  base_url:    String,
  api_key:     Option<String>,
  library_id:  Option<String>,
}

impl StoreApiClient {
  /// Builds a client from the `[APIS]` config section.
  pub fn new(base_url: impl Into<String>, config: &ApisConfig) -> Self {
    Self {
      client:     reqwest::Client::new(),
      base_url:   base_url.into(),
      api_key:    config.bibliographic_api_key.clone(),
      library_id: config.bibliographic_library_id.clone(),
    }
  }

  fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match &self.api_key {
      Some(key) => builder.header("Authorization", format!("Bearer {key}")),
      None => builder,
    }
  }

  fn library_path(&self) -> String {
    match &self.library_id {
      Some(id) => format!("{}/libraries/{id}/items", self.base_url),
      None => format!("{}/items", self.base_url),
    }
  }

  /// Translates `record` into the store's native item schema and creates it,
  /// returning the new item's key.
  pub async fn create_item(&self, record: &Bibliographic) -> Result<String, ArchivistError> {
    let payload = to_store_schema(record);
    let response =
      self.authed(self.client.post(self.library_path())).json(&payload).send().await?;
    if !response.status().is_success() {
      return Err(ArchivistError::StoreApi(format!(
        "create_item failed with status {}",
        response.status()
      )));
    }
    let body: CreateItemResponse = response.json().await?;
    Ok(body.key)
  }

  /// Adds a linked-file child attachment under `item_key`. `host_os_path` is
  /// the already-translated cross-boundary path (see [`crate::placement`]);
  /// the display title is the filename, not the paper title, so the store's
  /// UI can resolve the path unambiguously.
  pub async fn attach_linked_file(
    &self,
    item_key: &str,
    host_os_path: &str,
    display_title: &str,
  ) -> Result<String, ArchivistError> {
    let payload = json!({
      "parentItem": item_key,
      "itemType": "attachment",
      "linkMode": "linked_file",
      "path": host_os_path,
      "title": display_title,
    });
    let response =
      self.authed(self.client.post(self.library_path())).json(&payload).send().await?;
    if !response.status().is_success() {
      return Err(ArchivistError::StoreApi(format!(
        "attach_linked_file failed with status {}",
        response.status()
      )));
    }
    let body: CreateItemResponse = response.json().await?;
    Ok(body.key)
  }

  /// Sets `field` on `item_key` only if it is currently empty, returning
  /// whether a write occurred. Used for abstract enrichment, which must
  /// never overwrite an existing value.
  pub async fn set_field_if_empty(
    &self,
    item_key: &str,
    field: &str,
    value: &str,
  ) -> Result<bool, ArchivistError> {
    let current = self.get_field(item_key, field).await?;
    if current.is_some_and(|v| !v.is_empty()) {
      return Ok(false);
    }
    let payload = json!({ field: value });
    let response = self
      .authed(self.client.patch(format!("{}/{item_key}", self.library_path())))
      .json(&payload)
      .send()
      .await?;
    if !response.status().is_success() {
      return Err(ArchivistError::StoreApi(format!(
        "set_field_if_empty({field}) failed with status {}",
        response.status()
      )));
    }
    Ok(true)
  }

  async fn get_field(&self, item_key: &str, field: &str) -> Result<Option<String>, ArchivistError> {
    let response = self
      .authed(self.client.get(format!("{}/{item_key}", self.library_path())))
      .send()
      .await?;
    if !response.status().is_success() {
      return Ok(None);
    }
    let body: serde_json::Value = response.json().await?;
    Ok(body.get(field).and_then(|v| v.as_str()).map(str::to_string))
  }

  /// Adds and removes tags in one call (set-union / set-difference).
  pub async fn update_tags(
    &self,
    item_key: &str,
    add: &[String],
    remove: &[String],
  ) -> Result<(), ArchivistError> {
    let payload = json!({ "add": add, "remove": remove });
    let response = self
      .authed(self.client.post(format!("{}/{item_key}/tags", self.library_path())))
      .json(&payload)
      .send()
      .await?;
    if !response.status().is_success() {
      return Err(ArchivistError::StoreApi(format!(
        "update_tags failed with status {}",
        response.status()
      )));
    }
    debug!(item_key, ?add, ?remove, "tags updated");
    Ok(())
  }
}

#[derive(Debug, serde::Deserialize)]
struct CreateItemResponse {
  key: String,
}

#[derive(Debug, Serialize)]
struct StoreSchema<'a> {
  #[serde(rename = "itemType")]
  item_type: &'a str,
  title:     Option<&'a str>,
  creators:  Vec<StoreCreator<'a>>,
  date:      Option<String>,
  #[serde(rename = "publicationTitle", skip_serializing_if = "Option::is_none")]
  publication_title: Option<&'a str>,
  volume:    Option<&'a str>,
  issue:     Option<&'a str>,
  pages:     Option<&'a str>,
  publisher: Option<&'a str>,
  #[serde(rename = "abstractNote")]
  abstract_note: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct StoreCreator<'a> {
  #[serde(rename = "creatorType")]
  creator_type: &'static str,
  #[serde(rename = "firstName", skip_serializing_if = "Option::is_none")]
  first_name: Option<&'a str>,
  #[serde(rename = "lastName")]
  last_name: String,
}

fn to_store_schema(record: &Bibliographic) -> StoreSchema<'_> {
  let item_type = match record.document_type {
    Some(crate::paper::DocumentType::JournalArticle) => "journalArticle",
    Some(crate::paper::DocumentType::BookChapter) => "bookSection",
    Some(crate::paper::DocumentType::ConferencePaper) => "conferencePaper",
    Some(crate::paper::DocumentType::Book) => "book",
    Some(crate::paper::DocumentType::Thesis) => "thesis",
    Some(crate::paper::DocumentType::Report) => "report",
    Some(crate::paper::DocumentType::Preprint) => "preprint",
    Some(crate::paper::DocumentType::NewsArticle) => "magazineArticle",
    Some(crate::paper::DocumentType::Unknown) | None => "document",
  };

  StoreSchema {
    item_type,
    title: record.title.as_deref(),
    creators: record
      .authors
      .iter()
      .map(|a| StoreCreator {
        creator_type: "author",
        first_name:   a.given.as_deref(),
        last_name:    a.family.clone().or_else(|| a.literal.clone()).unwrap_or_default(),
      })
      .collect(),
    date: record.year.map(|y| y.to_string()),
    publication_title: record.container.as_deref(),
    volume: record.volume.as_deref(),
    issue: record.issue.as_deref(),
    pages: record.pages.as_deref(),
    publisher: record.publisher.as_deref(),
    abstract_note: record.abstract_text.as_deref(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::paper::{AuthorName, DocumentType};

  #[test]
  fn maps_document_type_to_store_item_type() {
    let mut bib = Bibliographic { document_type: Some(DocumentType::BookChapter), ..Default::default() };
    assert_eq!(to_store_schema(&bib).item_type, "bookSection");
    bib.document_type = Some(DocumentType::Unknown);
    assert_eq!(to_store_schema(&bib).item_type, "document");
  }

  #[test]
  fn creator_falls_back_to_literal_name_when_family_is_absent() {
    let bib = Bibliographic {
      authors: vec![AuthorName::literal("Anonymous Collective").unwrap()],
      ..Default::default()
    };
    let schema = to_store_schema(&bib);
    assert_eq!(schema.creators[0].last_name, "Anonymous Collective");
    assert!(schema.creators[0].first_name.is_none());
  }
}
