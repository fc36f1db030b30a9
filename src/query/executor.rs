use crate::corpus::{ChunkRecord, Corpus, FileRelations};
use crate::error::FilterError;
use crate::index::bitmap::{create_from_ids, default_backend, BitmapBackend, BitmapOptions};
use crate::index::filter_index::FilterIndex;
use crate::index::types::IndexedField;
use crate::query::candidate::{
    collect_any_substring_matches, collect_exact_matches, collect_substring_matches,
    intersect_candidates, Allowlist, Candidate, IntersectOptions,
};
use crate::query::diagnostics::{DiagnosticSink, FilterEvent, PrefilterSkip};
use crate::query::file_matcher::collect_file_prefilter;
use crate::query::filters::{CompiledFilters, Filters};
use crate::query::predicates::chunk_matches;

/// Options for [`FilterExecutor::filter_chunk_ids`]
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowlistOptions {
    /// Return the index-derived candidate intersection without scanning.
    /// The result is then a superset of the exact matches.
    pub index_only: bool,
}

/// Runs compiled filters against one corpus and (optionally) its index
pub struct FilterExecutor<'a> {
    corpus: &'a Corpus,
    index: Option<&'a FilterIndex>,
    relations: Option<&'a FileRelations>,
    backend: &'a dyn BitmapBackend,
    options: IntersectOptions,
}

impl<'a> FilterExecutor<'a> {
    pub fn new(corpus: &'a Corpus) -> Self {
        Self {
            corpus,
            index: None,
            relations: None,
            backend: default_backend(),
            options: IntersectOptions::default(),
        }
    }

    pub fn with_index(mut self, index: Option<&'a FilterIndex>) -> Self {
        self.index = index;
        self
    }

    pub fn with_relations(mut self, relations: Option<&'a FileRelations>) -> Self {
        self.relations = relations;
        self
    }

    pub fn with_backend(mut self, backend: &'a dyn BitmapBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_options(mut self, options: IntersectOptions) -> Self {
        self.options = options;
        self
    }

    /// Compile a request and filter with it
    pub fn filter(&self, request: &Filters, sink: &mut dyn DiagnosticSink) -> Result<Vec<&'a ChunkRecord>, FilterError> {
        let compiled = CompiledFilters::compile(request, sink);
        self.filter_chunks(&compiled, sink)
    }

    /// Intersect every clause the index can answer.
    ///
    /// `None` when no clause was resolvable from the index.
    pub fn resolve_candidates(
        &self,
        filters: &CompiledFilters,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Option<Candidate>, FilterError> {
        if filters.impossible {
            return Ok(Some(Candidate::empty()));
        }
        let Some(index) = self.index else {
            if !filters.file_matchers.is_empty() {
                sink.record(FilterEvent::PrefilterSkipped(PrefilterSkip::NoIndex));
            }
            return Ok(None);
        };
        let backend = self.backend;
        let mut candidates = Vec::new();

        if !filters.lang_needles.is_empty() {
            let by_lang = index.by_lang.as_ref().ok_or(FilterError::MissingLanguageBucket)?;
            candidates.extend(collect_exact_matches(
                Some(by_lang),
                &filters.lang_needles,
                index.bitmap_buckets(IndexedField::Lang),
                backend,
            ));
        }
        if !filters.ext_needles.is_empty() {
            candidates.extend(collect_exact_matches(
                index.buckets(IndexedField::Ext),
                &filters.ext_needles,
                index.bitmap_buckets(IndexedField::Ext),
                backend,
            ));
        }
        if !filters.type_needles.is_empty() {
            candidates.extend(collect_exact_matches(
                index.buckets(IndexedField::Kind),
                &filters.type_needles,
                index.bitmap_buckets(IndexedField::Kind),
                backend,
            ));
        }
        if !filters.author_needles.is_empty() {
            candidates.extend(collect_any_substring_matches(
                index.buckets(IndexedField::Author),
                &filters.author_needles,
                index.bitmap_buckets(IndexedField::Author),
                backend,
            ));
        }
        if let Some(needle) = filters.chunk_author.as_deref() {
            candidates.extend(collect_substring_matches(
                index.buckets(IndexedField::ChunkAuthor),
                needle,
                index.bitmap_buckets(IndexedField::ChunkAuthor),
                backend,
            ));
        }
        if let Some(needle) = filters.visibility.as_deref() {
            candidates.extend(collect_substring_matches(
                index.buckets(IndexedField::Visibility),
                needle,
                index.bitmap_buckets(IndexedField::Visibility),
                backend,
            ));
        }
        if !filters.file_matchers.is_empty() {
            if filters.prefilter_enabled {
                let n = filters.prefilter_n.unwrap_or(index.file_chargram_n);
                candidates.extend(collect_file_prefilter(&filters.file_matchers, index, n, backend, sink));
            } else {
                sink.record(FilterEvent::PrefilterSkipped(PrefilterSkip::Disabled));
            }
        }

        let clauses = candidates.len();
        let resolved = intersect_candidates(&candidates, self.options, backend);
        if let Some(candidate) = &resolved {
            sink.record(FilterEvent::CandidatesResolved {
                clauses,
                size: candidate.len(),
            });
        }
        Ok(resolved)
    }

    /// Chunks satisfying every clause, in corpus order
    pub fn filter_chunks(
        &self,
        filters: &CompiledFilters,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Vec<&'a ChunkRecord>, FilterError> {
        let candidates = self.resolve_candidates(filters, sink)?;
        if let Some(candidate) = &candidates {
            if candidate.is_empty() {
                sink.record(FilterEvent::ShortCircuit);
                return Ok(Vec::new());
            }
        }
        Ok(self.scan(filters, candidates.as_ref(), sink))
    }

    /// Admissible chunk ids for a ranker.
    ///
    /// `None` means unrestricted (no clause narrows the corpus); an empty
    /// allowlist means nothing matches.
    pub fn filter_chunk_ids(
        &self,
        filters: &CompiledFilters,
        options: AllowlistOptions,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Option<Allowlist>, FilterError> {
        if filters.is_empty() {
            return Ok(None);
        }
        if options.index_only {
            return self.resolve_candidates(filters, sink);
        }

        let ids: Vec<u32> = self.filter_chunks(filters, sink)?.iter().map(|c| c.id).collect();
        if self.options.prefer_bitmap {
            let bitmap_options = BitmapOptions {
                min_size: self.options.bitmap_min_size,
                force: false,
            };
            if let Some(bitmap) = create_from_ids(self.backend, ids.iter().copied(), bitmap_options) {
                return Ok(Some(Candidate::Bitmap(bitmap)));
            }
        }
        Ok(Some(Candidate::Set(ids.into_iter().collect())))
    }

    /// Evaluate predicates over the candidate ids (or the whole corpus) in corpus order
    fn scan(
        &self,
        filters: &CompiledFilters,
        candidates: Option<&Candidate>,
        sink: &mut dyn DiagnosticSink,
    ) -> Vec<&'a ChunkRecord> {
        let corpus = self.corpus;
        let relations = self.relations;

        let (scanned, results) = match candidates {
            None => {
                let results: Vec<&'a ChunkRecord> = corpus
                    .chunks()
                    .iter()
                    .filter(|chunk| chunk_matches(filters, chunk, relations))
                    .collect();
                (corpus.len(), results)
            }
            Some(candidate) => {
                let mut positions: Vec<usize> = candidate
                    .to_sorted_vec()
                    .into_iter()
                    .filter_map(|id| corpus.position(id))
                    .collect();
                positions.sort_unstable();
                let results: Vec<&'a ChunkRecord> = positions
                    .iter()
                    .map(|&pos| &corpus.chunks()[pos])
                    .filter(|chunk| chunk_matches(filters, chunk, relations))
                    .collect();
                (positions.len(), results)
            }
        };

        sink.record(FilterEvent::Scanned { chunks: scanned });
        results
    }
}

/// Filter a corpus with a precompiled request
pub fn filter_chunks<'a>(
    corpus: &'a Corpus,
    filters: &CompiledFilters,
    index: Option<&'a FilterIndex>,
    relations: Option<&'a FileRelations>,
    sink: &mut dyn DiagnosticSink,
) -> Result<Vec<&'a ChunkRecord>, FilterError> {
    FilterExecutor::new(corpus)
        .with_index(index)
        .with_relations(relations)
        .filter_chunks(filters, sink)
}

/// Allowlist for a precompiled request; see [`FilterExecutor::filter_chunk_ids`]
pub fn filter_chunk_ids<'a>(
    corpus: &'a Corpus,
    filters: &CompiledFilters,
    index: Option<&'a FilterIndex>,
    relations: Option<&'a FileRelations>,
    options: AllowlistOptions,
    sink: &mut dyn DiagnosticSink,
) -> Result<Option<Allowlist>, FilterError> {
    FilterExecutor::new(corpus)
        .with_index(index)
        .with_relations(relations)
        .filter_chunk_ids(filters, options, sink)
}
