//! # chunkfilter - Filter Index for Local Code Search
//!
//! chunkfilter narrows a corpus of code chunks to the ones matching a set of
//! metadata filters (extension, language, kind, author, file path, relations,
//! declaration metadata and more) before any text scoring runs.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`corpus`] - Chunk records and metadata, decoded fail-closed
//! - [`index`] - Filter index building, bitmaps, snapshots and persistence
//! - [`query`] - Filter compilation, candidate sets and execution
//! - [`output`] - Result formatting for the CLI
//! - [`utils`] - Char-grams, needle tokenizing and engine configuration
//!
//! ## Quick Start
//!
//! ```no_run
//! use chunkfilter::corpus::Corpus;
//! use chunkfilter::index::{build_filter_index_for_corpus, default_backend, FilterIndexConfig};
//! use chunkfilter::query::{FilterExecutor, Filters, NullSink};
//! use serde_json::json;
//!
//! let corpus = Corpus::from_json(&json!([
//!     {"id": 0, "file": "src/a.js", "kind": "Function", "last_author": "Alice"},
//!     {"id": 1, "file": "src/b.py", "kind": "Class", "last_author": "Bob"}
//! ]));
//! let index = build_filter_index_for_corpus(&corpus, &FilterIndexConfig::default(), default_backend());
//!
//! let filters = Filters::from_json(&json!({"ext": ".js", "author": "alice"}));
//! let chunks = FilterExecutor::new(&corpus)
//!     .with_index(Some(&index))
//!     .filter(&filters, &mut NullSink)
//!     .unwrap();
//! assert_eq!(chunks.len(), 1);
//! ```
//!
//! ## Candidate Sets
//!
//! Index lookups produce either plain id sets or compressed bitmaps. An
//! allowlist of `None` means "no restriction"; an empty allowlist means
//! "nothing can match" and lets callers skip scoring entirely.

pub mod corpus;
pub mod error;
pub mod index;
pub mod output;
pub mod query;
pub mod utils;

pub use error::FilterError;
