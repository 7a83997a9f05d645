//! Metadata extraction, reconciliation, and placement primitives for turning
//! a folder of scanned academic PDFs into correctly-named, correctly-tagged
//! entries in a personal bibliographic library.
//!
//! The pipeline this crate implements runs as a cascade of increasingly
//! expensive stages — a cheap regex scan, an external-catalog lookup, a
//! structured PDF parser, and an AI oracle as a last resort — reconciling
//! whatever comes out against the local store before an interactive approval
//! step commits anything. This crate owns every stage except the interactive
//! approval UI and the file-watching loop, which live in `archivistd`.
//!
//! # Example
//! ```no_run
//! use archivist::{cascade::{self, CascadeOptions}, config::Config};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("archivist.toml".as_ref(), "archivist.local.toml".as_ref())?;
//! let pdf_bytes = std::fs::read("/scans/NO_20260101_120000_8.pdf")?;
//! let result = cascade::run(
//!   "/scans/NO_20260101_120000_8.pdf".into(),
//!   pdf_bytes,
//!   "recovered first-page text",
//!   Some("NO".into()),
//!   &config,
//!   &CascadeOptions::default(),
//! )
//! .await?;
//! println!("title: {:?}", result.paper.bibliographic.title);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

pub mod cascade;
pub mod clients;
pub mod config;
pub mod errors;
pub mod filename;
pub mod identifiers;
pub mod paper;
pub mod pdfcut;
pub mod placement;
pub mod store;
pub mod validators;
