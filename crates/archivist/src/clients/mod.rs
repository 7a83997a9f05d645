//! External-service clients used by the extraction cascade (C3, C4, C5).
//!
//! Each submodule owns one HTTP relationship:
//! - [`crossref`] — DOI resolution against Crossref.
//! - [`arxiv`] — arXiv identifier resolution against the Atom feed API.
//! - [`isbn`] — ISBN lookup against Open Library.
//! - [`grobid`] — the structured PDF-to-TEI-XML parser service.
//! - [`oracle`] — the local AI-oracle fallback, with hallucination defenses.
//!
//! [`retry`] is the one piece shared by all of them: bounded exponential
//! backoff on 429/5xx, per spec'd in the concurrency model as at most two
//! retries starting at 500ms.

pub mod arxiv;
pub mod crossref;
pub mod grobid;
pub mod isbn;
pub mod oracle;
mod retry;

pub use arxiv::ArxivClient;
pub use crossref::CrossrefClient;
pub use grobid::GrobidClient;
pub use isbn::IsbnClient;
pub use oracle::OracleClient;
pub(crate) use retry::with_retry;
