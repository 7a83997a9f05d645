//! Client for the GROBID structured PDF-to-TEI-XML parser service (C4).

use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
  config::GrobidConfig,
  errors::ArchivistError,
  paper::{AuthorName, Bibliographic},
};

/// Minimal TEI header shape this crate cares about — GROBID's full TEI
/// output carries far more (references, figure anchors, funding
/// statements); only the fields the bibliographic schema needs are mapped.
#[derive(Debug, Default, Deserialize)]
#[serde(rename = "TEI")]
struct Tei {
  #[serde(rename = "teiHeader", default)]
  header: TeiHeader,
}

#[derive(Debug, Default, Deserialize)]
struct TeiHeader {
  #[serde(rename = "fileDesc", default)]
  file_desc: FileDesc,
  #[serde(rename = "profileDesc", default)]
  profile_desc: ProfileDesc,
}

#[derive(Debug, Default, Deserialize)]
struct FileDesc {
  #[serde(rename = "titleStmt", default)]
  title_stmt: TitleStmt,
  #[serde(rename = "sourceDesc", default)]
  source_desc: SourceDesc,
}

#[derive(Debug, Default, Deserialize)]
struct TitleStmt {
  title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SourceDesc {
  #[serde(rename = "biblStruct", default)]
  bibl_struct: BiblStruct,
}

#[derive(Debug, Default, Deserialize)]
struct BiblStruct {
  #[serde(rename = "analytic", default)]
  analytic: Analytic,
  #[serde(rename = "monogr", default)]
  monogr: Monogr,
}

#[derive(Debug, Default, Deserialize)]
struct Analytic {
  #[serde(rename = "author", default)]
  authors: Vec<TeiAuthor>,
}

#[derive(Debug, Default, Deserialize)]
struct Monogr {
  title: Option<String>,
  #[serde(rename = "imprint", default)]
  imprint: Imprint,
}

#[derive(Debug, Default, Deserialize)]
struct Imprint {
  date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TeiAuthor {
  #[serde(rename = "persName", default)]
  pers_name: Option<PersName>,
}

#[derive(Debug, Default, Deserialize)]
struct PersName {
  forename: Option<String>,
  surname:  Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileDesc {
  #[serde(rename = "abstract", default)]
  abstract_text: Option<String>,
}

/// Client for the GROBID `processHeaderDocument` endpoint.
pub struct GrobidClient {
  client: reqwest::Client,
  config: GrobidConfig,
}

impl GrobidClient {
  /// Builds a client pointed at the configured GROBID host.
  pub fn new(config: GrobidConfig) -> Self {
    Self {
      client: reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()
        .expect("static client config"),
      config,
    }
  }

  /// True if the parser service responds to its liveness endpoint.
  pub async fn is_alive(&self) -> bool {
    self
      .client
      .get(format!("{}/api/isalive", self.config.base_url()))
      .send()
      .await
      .map(|r| r.status().is_success())
      .unwrap_or(false)
  }

  /// Submits `pdf_bytes` (already truncated to at most `max_pages` pages by
  /// the caller) and parses the returned TEI-XML header.
  ///
  /// Returns `Ok(None)` on any HTTP-level failure — per spec, a parser-stage
  /// failure is non-fatal and the cascade falls through to the next stage.
  pub async fn extract(&self, pdf_bytes: Vec<u8>) -> Result<Option<Bibliographic>, ArchivistError> {
    let url = format!("{}/api/processHeaderDocument", self.config.base_url());
    let form = reqwest::multipart::Form::new()
      .part("input", reqwest::multipart::Part::bytes(pdf_bytes).file_name("input.pdf"));

    let response = match self.client.post(&url).multipart(form).send().await {
      Ok(r) => r,
      Err(e) => {
        warn!(error = %e, "grobid request failed, falling through");
        return Ok(None);
      },
    };

    if !response.status().is_success() {
      warn!(status = %response.status(), "grobid returned an error status, falling through");
      return Ok(None);
    }

    let body = response.text().await?;
    let tei: Tei = match from_str(&body) {
      Ok(tei) => tei,
      Err(e) => {
        warn!(error = %e, "grobid response failed to parse as TEI, falling through");
        return Ok(None);
      },
    };

    Ok(Some(tei_to_bibliographic(tei)))
  }
}

fn tei_to_bibliographic(tei: Tei) -> Bibliographic {
  let header = tei.header;
  let authors = header
    .file_desc
    .source_desc
    .bibl_struct
    .analytic
    .authors
    .into_iter()
    .filter_map(|a| {
      let pers = a.pers_name?;
      AuthorName::new(pers.forename, pers.surname, None).ok()
    })
    .collect();

  let year = header
    .file_desc
    .source_desc
    .bibl_struct
    .monogr
    .imprint
    .date
    .as_deref()
    .and_then(|d| d.get(0..4))
    .and_then(|y| y.parse::<u16>().ok());

  Bibliographic {
    document_type: None,
    title: header.file_desc.title_stmt.title,
    authors,
    year,
    container: header.file_desc.source_desc.bibl_struct.monogr.title,
    volume: None,
    issue: None,
    pages: None,
    publisher: None,
    abstract_text: header.profile_desc.abstract_text,
    keywords: Default::default(),
    language: None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_minimal_tei_header() {
    let xml = r#"<TEI>
      <teiHeader>
        <fileDesc>
          <titleStmt><title>A Sample Paper</title></titleStmt>
          <sourceDesc>
            <biblStruct>
              <analytic>
                <author><persName><forename>Ada</forename><surname>Lovelace</surname></persName></author>
              </analytic>
              <monogr>
                <title>Journal of Samples</title>
                <imprint><date>2019-05-01</date></imprint>
              </monogr>
            </biblStruct>
          </sourceDesc>
        </fileDesc>
        <profileDesc><abstract>An abstract.</abstract></profileDesc>
      </teiHeader>
    </TEI>"#;
    let tei: Tei = from_str(xml).unwrap();
    let bib = tei_to_bibliographic(tei);
    assert_eq!(bib.title.as_deref(), Some("A Sample Paper"));
    assert_eq!(bib.year, Some(2019));
    assert_eq!(bib.authors.len(), 1);
  }
}
