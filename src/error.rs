//! Error types for the filter engine.

use thiserror::Error;

/// Errors surfaced to the caller of a filter query or an index load.
///
/// Malformed chunk data never produces one of these; it is absorbed as
/// "field absent" where it is read.
#[derive(Debug, Error)]
pub enum FilterError {
    /// A language filter was requested against an index built without
    /// language buckets.
    #[error("filter index missing byLang; rebuild indexes to use --lang filters")]
    MissingLanguageBucket,

    /// A serialized index failed validation.
    #[error("invalid filter index: {0}")]
    InvalidIndex(String),
}
