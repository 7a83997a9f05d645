//! Layered configuration: a shipped template overlaid by a personal file.
//!
//! Mirrors the two-file model: `archivist.toml` (the template, checked into
//! distribution defaults) is read first, then `archivist.local.toml` (a
//! personal overlay the user edits) is merged on top field-by-field. Neither
//! file is required to exist; missing files are treated as empty overlays, and
//! missing keys fall back to [`Config::default`]'s values so a fresh checkout
//! runs without any configuration at all.
//!
//! Each file is parsed into an all-`Option` shadow struct (`Partial*`) rather
//! than `Config` itself, so a file that sets only one key of a multi-field
//! section (e.g. `[grobid]\nhost = "x"`) deserializes cleanly instead of
//! failing on the section's other, unset fields; merging then happens
//! `Option`-by-`Option` onto the running `Config`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ArchivistError;

/// Watched/target/local-store paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
  pub scanner_papers_dir:  PathBuf,
  pub publications_dir:    PathBuf,
  pub local_store_db_path: PathBuf,
  pub log_dir:             PathBuf,
}

impl Default for PathsConfig {
  fn default() -> Self {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    Self {
      scanner_papers_dir:  home.join("Scans"),
      publications_dir:    home.join("Publications"),
      local_store_db_path: home.join(".local/share/zotero/zotero.sqlite"),
      log_dir:             home.join(".local/share/archivistd/logs"),
    }
  }
}

impl PathsConfig {
  /// Overlays every present field of `partial` onto `self`.
  fn merge_partial(&mut self, partial: PartialPaths) {
    if let Some(v) = partial.scanner_papers_dir {
      self.scanner_papers_dir = v;
    }
    if let Some(v) = partial.publications_dir {
      self.publications_dir = v;
    }
    if let Some(v) = partial.local_store_db_path {
      self.local_store_db_path = v;
    }
    if let Some(v) = partial.log_dir {
      self.log_dir = v;
    }
  }
}

/// All-`Option` shadow of [`PathsConfig`] used when parsing a layered file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PartialPaths {
  #[serde(default)]
  scanner_papers_dir:  Option<PathBuf>,
  #[serde(default)]
  publications_dir:    Option<PathBuf>,
  #[serde(default)]
  local_store_db_path: Option<PathBuf>,
  #[serde(default)]
  log_dir:             Option<PathBuf>,
}

/// GROBID (structured TEI) parser service connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrobidConfig {
  pub host:           String,
  pub port:           u16,
  pub auto_start:     bool,
  pub auto_stop:      bool,
  pub container_name: String,
  pub max_pages:      u32,
}

impl Default for GrobidConfig {
  fn default() -> Self {
    Self {
      host:           "127.0.0.1".into(),
      port:           8070,
      auto_start:     false,
      auto_stop:      false,
      container_name: "grobid".into(),
      max_pages:      50,
    }
  }
}

impl GrobidConfig {
  /// The base URL clients should issue requests against.
  pub fn base_url(&self) -> String { format!("http://{}:{}", self.host, self.port) }

  /// Overlays every present field of `partial` onto `self`.
  fn merge_partial(&mut self, partial: PartialGrobid) {
    if let Some(v) = partial.host {
      self.host = v;
    }
    if let Some(v) = partial.port {
      self.port = v;
    }
    if let Some(v) = partial.auto_start {
      self.auto_start = v;
    }
    if let Some(v) = partial.auto_stop {
      self.auto_stop = v;
    }
    if let Some(v) = partial.container_name {
      self.container_name = v;
    }
    if let Some(v) = partial.max_pages {
      self.max_pages = v;
    }
  }
}

/// All-`Option` shadow of [`GrobidConfig`] used when parsing a layered file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PartialGrobid {
  #[serde(default)]
  host:           Option<String>,
  #[serde(default)]
  port:           Option<u16>,
  #[serde(default)]
  auto_start:     Option<bool>,
  #[serde(default)]
  auto_stop:      Option<bool>,
  #[serde(default)]
  container_name: Option<String>,
  #[serde(default)]
  max_pages:      Option<u32>,
}

/// The local AI-oracle endpoint (C5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
  pub host:  String,
  pub port:  u16,
  pub model: String,
}

impl Default for OllamaConfig {
  fn default() -> Self {
    Self { host: "127.0.0.1".into(), port: 11434, model: "llama3.1".into() }
  }
}

impl OllamaConfig {
  pub fn base_url(&self) -> String { format!("http://{}:{}", self.host, self.port) }

  /// Overlays every present field of `partial` onto `self`.
  fn merge_partial(&mut self, partial: PartialOllama) {
    if let Some(v) = partial.host {
      self.host = v;
    }
    if let Some(v) = partial.port {
      self.port = v;
    }
    if let Some(v) = partial.model {
      self.model = v;
    }
  }
}

/// All-`Option` shadow of [`OllamaConfig`] used when parsing a layered file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PartialOllama {
  #[serde(default)]
  host:  Option<String>,
  #[serde(default)]
  port:  Option<u16>,
  #[serde(default)]
  model: Option<String>,
}

/// External API credentials and politeness tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApisConfig {
  #[serde(default = "default_bibliographic_api_base_url")]
  pub bibliographic_api_base_url: String,
  pub bibliographic_api_key:      Option<String>,
  pub bibliographic_library_id:   Option<String>,
  pub bibliographic_library_type: Option<String>,
  pub crossref_email:             Option<String>,
}

impl Default for ApisConfig {
  fn default() -> Self {
    Self {
      bibliographic_api_base_url: default_bibliographic_api_base_url(),
      bibliographic_api_key:      None,
      bibliographic_library_id:   None,
      bibliographic_library_type: None,
      crossref_email:             None,
    }
  }
}

impl ApisConfig {
  /// Overlays every present field of `partial` onto `self`.
  fn merge_partial(&mut self, partial: PartialApis) {
    if let Some(v) = partial.bibliographic_api_base_url {
      self.bibliographic_api_base_url = v;
    }
    if partial.bibliographic_api_key.is_some() {
      self.bibliographic_api_key = partial.bibliographic_api_key;
    }
    if partial.bibliographic_library_id.is_some() {
      self.bibliographic_library_id = partial.bibliographic_library_id;
    }
    if partial.bibliographic_library_type.is_some() {
      self.bibliographic_library_type = partial.bibliographic_library_type;
    }
    if partial.crossref_email.is_some() {
      self.crossref_email = partial.crossref_email;
    }
  }
}

fn default_bibliographic_api_base_url() -> String { "https://api.zotero.org".into() }

/// All-`Option` shadow of [`ApisConfig`] used when parsing a layered file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PartialApis {
  #[serde(default)]
  bibliographic_api_base_url: Option<String>,
  #[serde(default)]
  bibliographic_api_key:      Option<String>,
  #[serde(default)]
  bibliographic_library_id:   Option<String>,
  #[serde(default)]
  bibliographic_library_type: Option<String>,
  #[serde(default)]
  crossref_email:             Option<String>,
}

/// Daemon timing and remote-singleton settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
  pub poll_interval_seconds: u64,
  pub remote_check_host:     Option<String>,
}

impl Default for DaemonConfig {
  fn default() -> Self { Self { poll_interval_seconds: 2, remote_check_host: None } }
}

impl DaemonConfig {
  /// Overlays every present field of `partial` onto `self`.
  fn merge_partial(&mut self, partial: PartialDaemon) {
    if let Some(v) = partial.poll_interval_seconds {
      self.poll_interval_seconds = v;
    }
    if partial.remote_check_host.is_some() {
      self.remote_check_host = partial.remote_check_host;
    }
  }
}

/// All-`Option` shadow of [`DaemonConfig`] used when parsing a layered file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PartialDaemon {
  #[serde(default)]
  poll_interval_seconds: Option<u64>,
  #[serde(default)]
  remote_check_host:     Option<String>,
}

/// The comma-separated language-prefix allowlist used to filter the watched
/// directory and to set a paper's initial `language_hint`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguagePrefixesConfig {
  pub enabled: Vec<String>,
}

impl Default for LanguagePrefixesConfig {
  fn default() -> Self { Self { enabled: vec!["NO".into(), "EN".into(), "DE".into()] } }
}

impl LanguagePrefixesConfig {
  /// Overlays every present field of `partial` onto `self`.
  fn merge_partial(&mut self, partial: PartialLanguagePrefixes) {
    if let Some(v) = partial.enabled {
      self.enabled = v;
    }
  }
}

/// All-`Option` shadow of [`LanguagePrefixesConfig`] used when parsing a
/// layered file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PartialLanguagePrefixes {
  #[serde(default)]
  enabled: Option<Vec<String>>,
}

/// The fully merged configuration used throughout the daemon and CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub paths:             PathsConfig,
  #[serde(default)]
  pub grobid:             GrobidConfig,
  #[serde(default)]
  pub ollama:             OllamaConfig,
  #[serde(default)]
  pub apis:               ApisConfig,
  #[serde(default)]
  pub daemon:             DaemonConfig,
  #[serde(default, rename = "language_prefixes")]
  pub language_prefixes: LanguagePrefixesConfig,
}

/// All-`Option`-sectioned shadow of [`Config`] that a layered file is parsed
/// into, so a file that only sets one key of a section deserializes cleanly
/// instead of erroring on the section's other, unset fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PartialConfig {
  #[serde(default)]
  paths:             PartialPaths,
  #[serde(default)]
  grobid:             PartialGrobid,
  #[serde(default)]
  ollama:             PartialOllama,
  #[serde(default)]
  apis:               PartialApis,
  #[serde(default)]
  daemon:             PartialDaemon,
  #[serde(default, rename = "language_prefixes")]
  language_prefixes: PartialLanguagePrefixes,
}

impl Config {
  /// Loads the template file, then overlays the personal file on top.
  /// Either path may be absent; absence is not an error.
  pub fn load(template_path: &Path, personal_path: &Path) -> Result<Self, ArchivistError> {
    let mut config = Self::default();
    if let Some(template) = Self::read_partial(template_path)? {
      config.merge(template);
    }
    if let Some(personal) = Self::read_partial(personal_path)? {
      config.merge(personal);
    }
    Ok(config)
  }

  fn read_partial(path: &Path) -> Result<Option<PartialConfig>, ArchivistError> {
    match std::fs::read_to_string(path) {
      Ok(contents) => Ok(Some(toml::from_str(&contents)?)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  /// Overlays `other` onto `self`, field-by-field, so a personal file that
  /// only sets one key doesn't reset the rest of its section to defaults.
  fn merge(&mut self, other: PartialConfig) {
    self.paths.merge_partial(other.paths);
    self.grobid.merge_partial(other.grobid);
    self.ollama.merge_partial(other.ollama);
    self.apis.merge_partial(other.apis);
    self.daemon.merge_partial(other.daemon);
    self.language_prefixes.merge_partial(other.language_prefixes);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_files_fall_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("template.toml"), &dir.path().join("local.toml")).unwrap();
    assert_eq!(config.daemon.poll_interval_seconds, 2);
    assert_eq!(config.language_prefixes.enabled, vec!["NO", "EN", "DE"]);
  }

  #[test]
  fn personal_overlay_wins_over_template() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.toml");
    let personal = dir.path().join("local.toml");
    std::fs::write(&template, "[daemon]\npoll_interval_seconds = 2\n").unwrap();
    std::fs::write(&personal, "[daemon]\npoll_interval_seconds = 5\n").unwrap();
    let config = Config::load(&template, &personal).unwrap();
    assert_eq!(config.daemon.poll_interval_seconds, 5);
  }

  #[test]
  fn partial_section_does_not_reset_sibling_fields_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let personal = dir.path().join("local.toml");
    std::fs::write(&personal, "[grobid]\nhost = \"10.0.0.5\"\n").unwrap();
    let config = Config::load(&dir.path().join("missing.toml"), &personal).unwrap();
    assert_eq!(config.grobid.host, "10.0.0.5");
    assert_eq!(config.grobid.port, GrobidConfig::default().port);
    assert_eq!(config.grobid.max_pages, GrobidConfig::default().max_pages);
  }

  #[test]
  fn partial_paths_overlay_leaves_other_paths_at_default() {
    let dir = tempfile::tempdir().unwrap();
    let personal = dir.path().join("local.toml");
    std::fs::write(&personal, "[paths]\nscanner_papers_dir = \"/mnt/scans\"\n").unwrap();
    let config = Config::load(&dir.path().join("missing.toml"), &personal).unwrap();
    assert_eq!(config.paths.scanner_papers_dir, PathBuf::from("/mnt/scans"));
    assert_eq!(config.paths.log_dir, PathsConfig::default().log_dir);
  }
}
