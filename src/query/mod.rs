pub mod candidate;
pub mod diagnostics;
pub mod executor;
pub mod file_matcher;
pub mod filters;
pub mod predicates;

pub use candidate::{
    build_candidate, collect_any_substring_matches, collect_exact_matches, collect_substring_matches,
    intersect_candidates, merge_candidates, restrict_candidates, Allowlist, Candidate, IntersectOptions,
};
pub use diagnostics::{CollectingSink, DiagnosticSink, FilterEvent, NullSink, PrefilterSkip};
pub use executor::{filter_chunk_ids, filter_chunks, AllowlistOptions, FilterExecutor};
pub use file_matcher::{collect_file_prefilter, FileMatcher, RegexConfig};
pub use filters::{CompiledFilters, Filters, MetaFilter};
