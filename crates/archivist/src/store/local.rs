//! Read-only queries against the local bibliographic store's SQLite file
//! (C7). The store is opened immutable — this process never writes to it;
//! all mutation goes through [`super::api`] instead.

use std::path::{Path, PathBuf};

use rusqlite::OpenFlags;
use strsim::jaro_winkler;
use tokio_rusqlite::Connection;

use crate::errors::ArchivistError;

/// One matched record from the local store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreItem {
  pub key:                String,
  pub item_type:          String,
  pub title:               String,
  pub authors:             Vec<String>,
  pub year:                Option<u16>,
  pub doi:                 Option<String>,
  pub abstract_text:       Option<String>,
  pub has_pdf_attachment:  bool,
}

/// `(label, value)` describing a container field, derived from `item_type`
/// per the registry in `get_container_info`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInfo {
  pub label: String,
  pub value: Option<String>,
}

/// Handle onto the local store, opened read-only.
pub struct LocalStore {
  conn: Connection,
}

impl LocalStore {
  /// Opens `path` in immutable mode where supported, falling back to a
  /// plain read-only open. The store's own client may be holding write
  /// locks concurrently; this process must never contend with it.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, ArchivistError> {
    let path_buf: PathBuf = path.as_ref().to_path_buf();
    let conn = Connection::open_with_flags(
      path_buf,
      OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
    )
    .await?;
    Ok(Self { conn })
  }

  /// Exact match on a normalized DOI. Reuses the fully-populated item loader
  /// so the returned record carries its real title/authors/year, not just
  /// the DOI column a narrower single-field query would surface.
  pub async fn search_by_doi(&self, doi: &str) -> Result<Vec<StoreItem>, ArchivistError> {
    let needle = crate::identifiers::normalize_doi(doi);
    let items = self.all_titled_items().await?;
    Ok(
      items
        .into_iter()
        .filter(|item| {
          item
            .doi
            .as_deref()
            .is_some_and(|d| crate::identifiers::normalize_doi(d) == needle)
        })
        .collect(),
    )
  }

  /// Token-sorted Jaro-Winkler similarity search over item titles.
  pub async fn search_by_title_fuzzy(
    &self,
    title: &str,
    threshold: f64,
  ) -> Result<Vec<StoreItem>, ArchivistError> {
    let needle = normalize_for_matching(title);
    let candidates = self.all_titled_items().await?;
    let mut scored: Vec<(f64, StoreItem)> = candidates
      .into_iter()
      .map(|item| (jaro_winkler(&needle, &normalize_for_matching(&item.title)), item))
      .filter(|(score, _)| *score >= threshold)
      .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    Ok(scored.into_iter().map(|(_, item)| item).collect())
  }

  /// Ranks items by number of matching family names in the exact order
  /// given, ties broken by year proximity to `year`.
  pub async fn search_by_authors_ordered(
    &self,
    author_family_names: &[String],
    year: Option<u16>,
    limit: usize,
  ) -> Result<Vec<StoreItem>, ArchivistError> {
    let candidates = self.all_titled_items().await?;
    let needles: Vec<String> = author_family_names.iter().map(|n| n.to_lowercase()).collect();

    let mut scored: Vec<(usize, u32, StoreItem)> = candidates
      .into_iter()
      .map(|item| {
        let matches = needles
          .iter()
          .enumerate()
          .take_while(|(i, name)| item.authors.get(*i).is_some_and(|a| a.to_lowercase() == **name))
          .count();
        let year_distance = match (item.year, year) {
          (Some(a), Some(b)) => (a as i32 - b as i32).unsigned_abs(),
          _ => u32::MAX,
        };
        (matches, year_distance, item)
      })
      .filter(|(matches, _, _)| *matches > 0)
      .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    Ok(scored.into_iter().take(limit).map(|(_, _, item)| item).collect())
  }

  /// Tags currently attached to `item_key`.
  pub async fn get_tags(&self, item_key: &str) -> Result<Vec<String>, ArchivistError> {
    let key = item_key.to_string();
    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT tags.name FROM tags
           JOIN itemTags ON itemTags.tagID = tags.tagID
           JOIN items ON items.itemID = itemTags.itemID
           WHERE items.key = ?1",
        )?;
        let rows = stmt.query_map([key], |row| row.get::<_, String>(0))?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await
      .map_err(Into::into)
  }

  /// The link-mode of the item's attachment, if any (`"linked_file"`,
  /// `"imported_file"`, `"imported_url"`), or `None` if it has no attachment.
  pub async fn get_attachment_kind(&self, item_key: &str) -> Result<Option<String>, ArchivistError> {
    let key = item_key.to_string();
    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT itemAttachments.linkMode FROM itemAttachments
           JOIN items ON items.itemID = itemAttachments.parentItemID
           WHERE items.key = ?1 LIMIT 1",
        )?;
        let kind = stmt.query_row([key], |row| row.get::<_, String>(0)).ok();
        Ok(kind)
      })
      .await
      .map_err(Into::into)
  }

  /// Derives `(label, value)` for the container field appropriate to the
  /// item's type: journalArticle → ("Journal", publicationTitle),
  /// bookSection → ("Book", bookTitle), conferencePaper → ("Conference",
  /// proceedingsTitle).
  pub async fn get_container_info(&self, item_key: &str) -> Result<ContainerInfo, ArchivistError> {
    let key = item_key.to_string();
    self
      .conn
      .call(move |conn| {
        let item_type: String = conn.query_row(
          "SELECT itemTypes.typeName FROM items
           JOIN itemTypes ON itemTypes.itemTypeID = items.itemTypeID
           WHERE items.key = ?1",
          [&key],
          |row| row.get(0),
        )?;

        let (label, field_name) = match item_type.as_str() {
          "journalArticle" => ("Journal", "publicationTitle"),
          "bookSection" => ("Book", "bookTitle"),
          "conferencePaper" => ("Conference", "proceedingsTitle"),
          _ => ("Container", "publicationTitle"),
        };

        let value: Option<String> = conn
          .query_row(
            "SELECT itemDataValues.value FROM itemData
             JOIN itemDataValues ON itemDataValues.valueID = itemData.valueID
             JOIN fields ON fields.fieldID = itemData.fieldID
             JOIN items ON items.itemID = itemData.itemID
             WHERE items.key = ?1 AND fields.fieldName = ?2",
            rusqlite::params![&key, field_name],
            |row| row.get(0),
          )
          .ok();

        Ok(ContainerInfo { label: label.to_string(), value })
      })
      .await
      .map_err(Into::into)
  }

  async fn all_titled_items(&self) -> Result<Vec<StoreItem>, ArchivistError> {
    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT items.itemID, items.key, itemTypes.typeName, itemDataValues.value
           FROM items
           JOIN itemData ON itemData.itemID = items.itemID
           JOIN itemDataValues ON itemDataValues.valueID = itemData.valueID
           JOIN fields ON fields.fieldID = itemData.fieldID
           JOIN itemTypes ON itemTypes.itemTypeID = items.itemTypeID
           WHERE fields.fieldName = 'title'
             AND items.itemID NOT IN (SELECT itemID FROM deletedItems)",
        )?;
        let mut authors_stmt = conn.prepare_cached(
          "SELECT creators.lastName FROM itemCreators
           JOIN creators ON creators.creatorID = itemCreators.creatorID
           WHERE itemCreators.itemID = ?1
           ORDER BY itemCreators.orderIndex ASC",
        )?;
        let mut year_stmt = conn.prepare_cached(
          "SELECT itemDataValues.value FROM itemData
           JOIN itemDataValues ON itemDataValues.valueID = itemData.valueID
           JOIN fields ON fields.fieldID = itemData.fieldID
           WHERE itemData.itemID = ?1 AND fields.fieldName = 'date'",
        )?;
        let mut doi_stmt = conn.prepare_cached(
          "SELECT itemDataValues.value FROM itemData
           JOIN itemDataValues ON itemDataValues.valueID = itemData.valueID
           JOIN fields ON fields.fieldID = itemData.fieldID
           WHERE itemData.itemID = ?1 AND fields.fieldName = 'DOI'",
        )?;
        let mut abstract_stmt = conn.prepare_cached(
          "SELECT itemDataValues.value FROM itemData
           JOIN itemDataValues ON itemDataValues.valueID = itemData.valueID
           JOIN fields ON fields.fieldID = itemData.fieldID
           WHERE itemData.itemID = ?1 AND fields.fieldName = 'abstractNote'",
        )?;
        let mut attachment_stmt = conn.prepare_cached(
          "SELECT 1 FROM itemAttachments
           WHERE itemAttachments.parentItemID = ?1 LIMIT 1",
        )?;

        let ids: Vec<(i64, String, String, String)> = stmt
          .query_map([], |row| {
            Ok((row.get(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?, row.get::<_, String>(3)?))
          })?
          .collect::<Result<Vec<_>, _>>()?;

        let mut rows = Vec::with_capacity(ids.len());
        for (item_id, key, item_type, title) in ids {
          let authors = authors_stmt
            .query_map([item_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
          let year = year_stmt
            .query_row([item_id], |row| row.get::<_, String>(0))
            .ok()
            .and_then(|raw| extract_year(&raw));
          let doi = doi_stmt.query_row([item_id], |row| row.get::<_, String>(0)).ok();
          let abstract_text = abstract_stmt.query_row([item_id], |row| row.get::<_, String>(0)).ok();
          let has_pdf_attachment =
            attachment_stmt.query_row([item_id], |row| row.get::<_, i64>(0)).is_ok();

          rows.push(StoreItem {
            key,
            item_type,
            title,
            authors,
            year,
            doi,
            abstract_text,
            has_pdf_attachment,
          });
        }
        Ok(rows)
      })
      .await
      .map_err(Into::into)
  }
}

/// Pulls the first 4-digit run out of a free-form date string (Zotero's
/// `date` field is locale-formatted text, not a typed column).
fn extract_year(raw: &str) -> Option<u16> {
  let digits: Vec<char> = raw.chars().collect();
  for window in digits.windows(4) {
    if window.iter().all(|c| c.is_ascii_digit()) {
      if let Ok(year) = window.iter().collect::<String>().parse::<u16>() {
        return Some(year);
      }
    }
  }
  None
}

/// Lowercases, trims, and removes common abbreviation markers so two titles
/// that differ only by punctuation noise still compare as similar. Matching
/// only — stored display values are never altered.
fn normalize_for_matching(s: &str) -> String {
  s.to_lowercase()
    .chars()
    .filter(|c| c.is_alphanumeric() || c.is_whitespace())
    .collect::<String>()
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalization_strips_punctuation_noise() {
    assert_eq!(normalize_for_matching("The Title: A Study."), normalize_for_matching("the title a study"));
  }

  #[test]
  fn extract_year_finds_four_digit_run_in_locale_date() {
    assert_eq!(extract_year("2019-03-14"), Some(2019));
    assert_eq!(extract_year("March 2019"), Some(2019));
    assert_eq!(extract_year("n.d."), None);
  }
}
