//! Shared helpers.
//!
//! - [`app_data`] - engine configuration and data directory layout
//! - [`chargram`] - file-path normalization and char n-gram extraction
//! - [`tokenizer`] - needle list splitting and word n-grams
//!
//! ```no_run
//! use chunkfilter::utils::{extract_chargrams, normalize_list};
//!
//! // Char-grams of a normalized path
//! let grams = extract_chargrams("src/util.ts", 3);
//! // Returns: [".ts", "/ut", "c/u", ...] sorted and deduplicated
//!
//! // Filter needles split on commas and whitespace
//! let needles = normalize_list(&["Function, Class"]);
//! // Returns: ["Function", "Class"]
//! ```

pub mod app_data;
pub mod chargram;
pub mod tokenizer;

pub use app_data::*;
pub use chargram::*;
pub use tokenizer::*;
