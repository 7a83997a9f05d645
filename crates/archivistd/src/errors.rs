//! Error types for the archivistd daemon and CLI.
//!
//! Wraps every dependency failure mode the daemon can hit into one enum, in
//! the transparent-pass-through style `archivist::errors::ArchivistError`
//! itself uses, plus a handful of daemon-specific variants (singleton
//! discipline, approval-flow invariant violations).

use thiserror::Error;

/// Errors that can occur while running the daemon or its CLI.
#[derive(Error, Debug)]
pub enum ArchivistdErrors {
  /// Errors from the archivist library (extraction, placement, store).
  #[error(transparent)]
  Archivist(#[from] archivist::errors::ArchivistError),

  /// Errors from user interaction dialogs.
  #[error(transparent)]
  Dialoguer(#[from] dialoguer::Error),

  /// File system and IO operation errors.
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// Glob pattern matching errors, used by the auxiliary cleanup pass.
  #[error(transparent)]
  Glob(#[from] glob::PatternError),

  /// Failure to send or interpret a POSIX signal.
  #[error("signal error: {0}")]
  Signal(String),

  /// Another instance already holds the local PID file.
  #[error("daemon already running with pid {0}")]
  AlreadyRunning(i32),

  /// A remote daemon already claims ownership of this bibliographic store.
  #[error("remote singleton at {0} is already processing this store")]
  RemoteSingletonActive(String),

  /// The watch directory or one of its required subdirectories is missing
  /// or not writable.
  #[error("watch directory misconfigured: {0}")]
  WatchDirInvalid(String),

  /// The approval state machine reached a state/event combination that the
  /// transition table doesn't define — a programmer error, not a user one.
  #[error("illegal approval transition: {0}")]
  IllegalTransition(String),
}
