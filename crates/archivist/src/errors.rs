//! Error types for the archivist library.
//!
//! This module provides a comprehensive error type that encompasses all possible
//! failure modes when extracting, reconciling, and placing bibliographic records,
//! including:
//! - Network and external-service errors
//! - Local database operations
//! - Identifier validation
//! - File system and placement errors
//!
//! Lower-level clients and validators never panic into the extraction cascade;
//! everything here is returned, never thrown.

use thiserror::Error;

/// Errors that can occur when working with the archivist library.
#[derive(Error, Debug)]
pub enum ArchivistError {
  /// An identifier string didn't match the expected format for its kind.
  #[error("invalid identifier format")]
  InvalidIdentifier,

  /// A value didn't parse against any known `DocumentType`/`Source` variant.
  #[error("invalid variant, see `archivist::paper`: {0}")]
  InvalidVariant(String),

  /// A network request failed.
  #[error(transparent)]
  Network(#[from] reqwest::Error),

  /// The requested record couldn't be found at the external source.
  #[error("record not found")]
  NotFound,

  /// An external API (catalog, parser, oracle) returned an error response or
  /// malformed payload.
  #[error("api error: {0}")]
  ApiError(String),

  /// Failed to parse a URL.
  #[error(transparent)]
  InvalidUrl(#[from] url::ParseError),

  /// A SQLite operation against the local bibliographic store failed.
  #[error(transparent)]
  Sqlite(#[from] rusqlite::Error),

  /// An async SQLite operation failed.
  #[error(transparent)]
  AsyncSqlite(#[from] tokio_rusqlite::Error),

  /// A file system operation failed.
  #[error(transparent)]
  Path(#[from] std::io::Error),

  /// A value failed identifier validation (bad checksum, bad format).
  #[error("validation failed: {0}")]
  ValidationFailed(String),

  /// `set_field_if_empty` or similar found the field already populated.
  #[error("field already populated, not overwritten")]
  FieldNotEmpty,

  /// The bibliographic-store write API reported a failure for one step of a
  /// multi-step commit; the caller must surface the partial state verbatim.
  #[error("store api error: {0}")]
  StoreApi(String),

  /// The file-placement algorithm could not verify a completed copy.
  #[error("placement verification failed for {path}: expected {expected} bytes, wrote {actual}")]
  PlacementVerification { path: String, expected: u64, actual: u64 },

  /// Configuration could not be parsed or was missing a required key.
  #[error("configuration error: {0}")]
  Config(String),

  /// A numeric conversion failed, typically in database row decoding.
  #[error(transparent)]
  ColumnOverflow(#[from] std::num::TryFromIntError),

  /// TOML parsing of a config file failed.
  #[error(transparent)]
  TomlParse(#[from] toml::de::Error),

  /// The local PDF page-cut utility could not produce a first-N-page
  /// excerpt (corrupt/encrypted source, page index out of range).
  #[error("pdf page-cut failed: {0}")]
  PdfCut(String),

  /// Neither a direct `fs::copy` nor the external-OS `cp` fallback could
  /// place the file (e.g. a destination mount that refuses writes from
  /// both this process's view and the host shell).
  #[error("file copy failed: {0}")]
  CopyFailed(String),
}

impl ArchivistError {
  /// Checks if this error represents a duplicate entry in the local store.
  ///
  /// Mirrors SQLite's unique-constraint-violation signal, which this crate
  /// never raises on its own (the local store is read-only) but which a
  /// `StoreApiClient` implementation backed by a similar SQL store may still
  /// need to distinguish from other REST failures.
  pub fn is_duplicate_error(&self) -> bool {
    matches!(
        self,
        ArchivistError::AsyncSqlite(tokio_rusqlite::Error::Rusqlite(
            rusqlite::Error::SqliteFailure(error, _)
        )) if error.code == rusqlite::ErrorCode::ConstraintViolation
    )
  }
}
