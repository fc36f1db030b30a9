//! Per-query diagnostics.
//!
//! Filter compilation and execution report noteworthy events (regex
//! fallbacks, skipped prefilters, short-circuits) to a sink owned by the
//! caller. Nothing here is global, so two concurrent queries never share
//! warning state.

/// Why the file prefilter was not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefilterSkip {
    Disabled,
    NoIndex,
    /// Requested char-gram length differs from the one the index was built with
    ChargramMismatch { requested: usize, indexed: usize },
    /// A matcher has no literal of at least `n` chars, so no superset can be derived
    NoUsableLiteral { matcher: String },
}

/// Event reported while compiling or running a filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterEvent {
    /// A `/regex/` file filter failed to compile and degraded to a substring
    RegexFallback {
        pattern: String,
        reason: String,
        needle: String,
    },
    PrefilterSkipped(PrefilterSkip),
    /// Index-derived candidates were intersected
    CandidatesResolved { clauses: usize, size: usize },
    /// Candidate intersection was empty; no chunk was scanned
    ShortCircuit,
    /// Per-chunk predicates ran over this many chunks
    Scanned { chunks: usize },
}

pub trait DiagnosticSink {
    fn record(&mut self, event: FilterEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record(&mut self, _event: FilterEvent) {}
}

/// Keeps every event in order
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    pub events: Vec<FilterEvent>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks scanned, if a scan happened
    pub fn scanned(&self) -> Option<usize> {
        self.events.iter().find_map(|e| match e {
            FilterEvent::Scanned { chunks } => Some(*chunks),
            _ => None,
        })
    }

    pub fn short_circuited(&self) -> bool {
        self.events.iter().any(|e| matches!(e, FilterEvent::ShortCircuit))
    }

    pub fn regex_fallbacks(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, FilterEvent::RegexFallback { .. }))
            .count()
    }

    pub fn prefilter_skips(&self) -> Vec<&PrefilterSkip> {
        self.events
            .iter()
            .filter_map(|e| match e {
                FilterEvent::PrefilterSkipped(reason) => Some(reason),
                _ => None,
            })
            .collect()
    }
}

impl DiagnosticSink for CollectingSink {
    fn record(&mut self, event: FilterEvent) {
        self.events.push(event);
    }
}
