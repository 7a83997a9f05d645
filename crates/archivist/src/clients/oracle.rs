//! Client for the local AI-oracle fallback stage (C5).
//!
//! The oracle is the cascade's last resort: a locally-hosted LLM prompted to
//! return a JSON object matching the neutral bibliographic schema. Its output
//! is untrusted by construction — [`extract_from_text`] runs every identifier
//! it returns back through [`crate::identifiers::validate`] and drops known
//! OCR-garbage author tokens before anything reaches the cascade result.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
  config::OllamaConfig,
  errors::ArchivistError,
  paper::{AuthorName, Bibliographic, DocumentType},
};

/// Author-name tokens the deny-list treats as OCR garbage rather than real
/// authors, e.g. a page-header fragment the oracle mistakes for a byline.
const AUTHOR_DENY_LIST: &[&str] =
  &["previously", "published", "uc berkeley", "unknown", "n/a", "et al"];

/// The strict JSON schema the oracle is prompted to return.
#[derive(Debug, Deserialize)]
struct OracleResponse {
  #[serde(default)]
  title:          Option<String>,
  #[serde(default)]
  authors:        Vec<OracleAuthor>,
  #[serde(default)]
  year:           Option<u16>,
  #[serde(default)]
  container:      Option<String>,
  #[serde(default)]
  publisher:      Option<String>,
  #[serde(default)]
  abstract_text:  Option<String>,
  #[serde(default)]
  document_type:  Option<String>,
  #[serde(default)]
  doi:            Option<String>,
}

#[derive(Debug, Deserialize)]
struct OracleAuthor {
  given:  Option<String>,
  family: Option<String>,
}

/// Envelope for the Ollama `/api/generate` non-streaming response.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
  response: String,
}

/// What the oracle stage recovers: the neutral bibliographic fields plus,
/// separately, a DOI that survived [`crate::identifiers::validate`] — kept
/// apart from [`Bibliographic`] because that record has no `doi` field of
/// its own (identifiers live in [`crate::paper::IdentifierSet`]).
#[derive(Debug)]
pub struct OracleExtraction {
  pub bibliographic: Bibliographic,
  pub doi:           Option<String>,
}

/// Client for the local Ollama-compatible oracle endpoint.
pub struct OracleClient {
  client: reqwest::Client,
  config: OllamaConfig,
}

impl OracleClient {
  /// Builds a client with the spec'd 120s oracle timeout.
  pub fn new(config: OllamaConfig) -> Self {
    Self {
      client: reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .expect("static client config"),
      config,
    }
  }

  /// Prompts the oracle with the first-N-page text and any fragments already
  /// recovered, parses the first JSON object in its response, and applies
  /// hallucination defenses before returning.
  ///
  /// Returns `Ok(None)` on timeout, transport failure, or an unparseable
  /// response — any of which simply ends the cascade with partial results.
  pub async fn extract_from_text(
    &self,
    text: &str,
    language_hint: Option<&str>,
    hints: &Bibliographic,
  ) -> Result<Option<OracleExtraction>, ArchivistError> {
    let prompt = build_prompt(text, language_hint, hints);
    let url = format!("{}/api/generate", self.config.base_url());

    let body = serde_json::json!({
      "model": self.config.model,
      "prompt": prompt,
      "stream": false,
      "format": "json",
    });

    let response = match self.client.post(&url).json(&body).send().await {
      Ok(r) => r,
      Err(e) => {
        warn!(error = %e, "oracle request failed or timed out, ending cascade");
        return Ok(None);
      },
    };

    if !response.status().is_success() {
      warn!(status = %response.status(), "oracle returned an error status");
      return Ok(None);
    }

    let envelope: GenerateResponse = match response.json().await {
      Ok(e) => e,
      Err(e) => {
        warn!(error = %e, "oracle envelope failed to parse");
        return Ok(None);
      },
    };

    let Some(json_slice) = first_json_object(&envelope.response) else {
      warn!("no JSON object found in oracle response");
      return Ok(None);
    };

    let parsed: OracleResponse = match serde_json::from_str(json_slice) {
      Ok(p) => p,
      Err(e) => {
        debug!(error = %e, "oracle JSON failed to parse against schema");
        return Ok(None);
      },
    };

    Ok(Some(defend_against_hallucination(parsed)))
  }
}

/// Extracts the substring spanning the first balanced `{...}` object, to
/// tolerate the oracle wrapping its answer in explanatory prose.
fn first_json_object(s: &str) -> Option<&str> {
  let start = s.find('{')?;
  let mut depth = 0i32;
  for (i, c) in s[start..].char_indices() {
    match c {
      '{' => depth += 1,
      '}' => {
        depth -= 1;
        if depth == 0 {
          return Some(&s[start..start + i + 1]);
        }
      },
      _ => {},
    }
  }
  None
}

fn build_prompt(text: &str, language_hint: Option<&str>, hints: &Bibliographic) -> String {
  let language = language_hint.unwrap_or("unknown");
  let hint_title = hints.title.as_deref().unwrap_or("none");
  format!(
    "Extract bibliographic metadata from the following document text and return ONLY a JSON \
     object with keys title, authors (array of {{given, family}}), year, container, publisher, \
     abstract_text, document_type, doi. Use null for anything not present; do not invent values. \
     Document language hint: {language}. Already-recovered title hint: {hint_title}.\n\n{text}"
  )
}

/// Drops any DOI that fails checksum/format validation and any author whose
/// name matches the OCR-garbage deny-list.
fn defend_against_hallucination(response: OracleResponse) -> OracleExtraction {
  let authors = response
    .authors
    .into_iter()
    .filter_map(|a| AuthorName::new(a.given, a.family, None).ok())
    .filter(|a| !AUTHOR_DENY_LIST.contains(&a.display_name().to_lowercase().as_str()))
    .collect();

  let document_type =
    response.document_type.as_deref().and_then(|s| s.parse::<DocumentType>().ok());

  let doi = response.doi.as_deref().and_then(|raw| {
    let normalized = crate::identifiers::normalize_doi(raw);
    if crate::identifiers::validate_doi(&normalized) {
      Some(normalized)
    } else {
      warn!(doi = raw, "oracle-proposed DOI failed validation, dropping");
      None
    }
  });

  let bibliographic = Bibliographic {
    document_type,
    title: response.title,
    authors,
    year: response.year,
    container: response.container,
    volume: None,
    issue: None,
    pages: None,
    publisher: response.publisher,
    abstract_text: response.abstract_text,
    keywords: Default::default(),
    language: None,
  };

  OracleExtraction { bibliographic, doi }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extracts_first_balanced_json_object() {
    let s = "Sure, here you go: {\"title\": \"X\", \"nested\": {\"a\": 1}} and some trailing prose";
    let found = first_json_object(s).unwrap();
    assert_eq!(found, "{\"title\": \"X\", \"nested\": {\"a\": 1}}");
  }

  #[test]
  fn drops_deny_listed_author_names() {
    let response = OracleResponse {
      title:         None,
      authors:       vec![
        OracleAuthor { given: None, family: Some("Previously".into()) },
        OracleAuthor { given: Some("Ada".into()), family: Some("Lovelace".into()) },
      ],
      year:          None,
      container:     None,
      publisher:     None,
      abstract_text: None,
      document_type: None,
      doi:           None,
    };
    let extraction = defend_against_hallucination(response);
    assert_eq!(extraction.bibliographic.authors.len(), 1);
    assert_eq!(extraction.bibliographic.authors[0].family.as_deref(), Some("Lovelace"));
  }

  fn response_with_doi(doi: &str) -> OracleResponse {
    OracleResponse {
      title:         None,
      authors:       vec![],
      year:          None,
      container:     None,
      publisher:     None,
      abstract_text: None,
      document_type: None,
      doi:           Some(doi.to_string()),
    }
  }

  #[test]
  fn valid_oracle_doi_survives_hallucination_defense() {
    let extraction = defend_against_hallucination(response_with_doi("10.1234/example.567"));
    assert_eq!(extraction.doi.as_deref(), Some("10.1234/example.567"));
  }

  #[test]
  fn malformed_oracle_doi_is_dropped() {
    let extraction = defend_against_hallucination(response_with_doi("not a doi at all"));
    assert!(extraction.doi.is_none());
  }
}
