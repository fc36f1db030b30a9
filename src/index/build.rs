use crate::corpus::{ChunkRecord, Corpus, MetaView};
use crate::index::bitmap::BitmapBackend;
use crate::index::filter_index::FilterIndex;
use crate::index::types::{Buckets, FilterIndexConfig, IndexedField, UNKNOWN_LANGUAGE};
use crate::utils::{extract_chargrams, normalize, normalize_file_path};
use rayon::prelude::*;
use serde_json::Value;

/// Chunks whose keys are extracted in parallel before being merged
const BATCH_SIZE: usize = 4096;

/// Normalized values a chunk contributes to each indexed field
struct ChunkKeys {
    ext: Option<String>,
    lang: String,
    kinds: Vec<String>,
    authors: Vec<String>,
    chunk_authors: Vec<String>,
    visibility: Option<String>,
}

fn non_empty_lower<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = values
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(normalize)
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Extract normalized bucket keys for one chunk (runs independently per chunk)
fn chunk_keys(chunk: &ChunkRecord) -> ChunkKeys {
    let view = MetaView::new(chunk.meta_v2.as_ref(), chunk.docmeta.as_ref());
    ChunkKeys {
        ext: chunk.effective_ext(),
        lang: chunk
            .effective_language()
            .map(normalize)
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string()),
        kinds: non_empty_lower(chunk.kind.iter()),
        authors: non_empty_lower(chunk.last_author.iter()),
        chunk_authors: non_empty_lower(chunk.chunk_authors().iter()),
        visibility: view.visibility().map(normalize),
    }
}

fn empty_index(config: &FilterIndexConfig) -> FilterIndex {
    FilterIndex {
        file_chargram_n: config.effective_chargram_n(),
        by_lang: Some(Buckets::default()),
        ..Default::default()
    }
}

fn add_chunk(index: &mut FilterIndex, chunk: &ChunkRecord, keys: ChunkKeys) {
    let id = chunk.id;

    if let Some(ext) = keys.ext {
        index.add_to_bucket(IndexedField::Ext, ext, id);
    }
    index.add_to_bucket(IndexedField::Lang, keys.lang, id);
    for kind in keys.kinds {
        index.add_to_bucket(IndexedField::Kind, kind, id);
    }
    for author in keys.authors {
        index.add_to_bucket(IndexedField::Author, author, id);
    }
    for author in keys.chunk_authors {
        index.add_to_bucket(IndexedField::ChunkAuthor, author, id);
    }
    if let Some(visibility) = keys.visibility {
        index.add_to_bucket(IndexedField::Visibility, visibility, id);
    }

    let path = normalize_file_path(chunk.file.as_deref().unwrap_or(""));
    if path.is_empty() {
        return;
    }
    let (file_id, is_new) = index.intern_file(&path);
    index.file_chunks_by_id[file_id as usize].insert(id);
    if is_new {
        for gram in extract_chargrams(&path.to_lowercase(), index.file_chargram_n) {
            index.file_chargrams.entry(gram).or_default().insert(file_id);
        }
    }
}

/// Key extraction is parallel; merging stays sequential so file ids are
/// assigned in corpus order.
fn add_batch(index: &mut FilterIndex, batch: &[ChunkRecord]) {
    let keys: Vec<ChunkKeys> = batch.par_iter().map(chunk_keys).collect();
    for (chunk, keys) in batch.iter().zip(keys) {
        add_chunk(index, chunk, keys);
    }
}

fn finish(mut index: FilterIndex, config: &FilterIndexConfig, backend: &dyn BitmapBackend) -> FilterIndex {
    if config.include_bitmaps {
        index.build_bitmaps(backend, config.bitmap_min_size);
    }
    tracing::debug!(
        files = index.file_count(),
        chargrams = index.file_chargrams.len(),
        bitmaps = index.bitmap.as_ref().map(|b| b.len()).unwrap_or(0),
        backend = backend.name(),
        "filter index built"
    );
    index
}

/// Build a filter index in a single pass over the chunks.
///
/// Malformed fields were already resolved to absent when the chunks were
/// decoded, so construction never fails.
pub fn build_filter_index(
    chunks: &[ChunkRecord],
    config: &FilterIndexConfig,
    backend: &dyn BitmapBackend,
) -> FilterIndex {
    let mut index = empty_index(config);
    for batch in chunks.chunks(BATCH_SIZE) {
        add_batch(&mut index, batch);
    }
    finish(index, config, backend)
}

/// Build from a corpus
pub fn build_filter_index_for_corpus(
    corpus: &Corpus,
    config: &FilterIndexConfig,
    backend: &dyn BitmapBackend,
) -> FilterIndex {
    build_filter_index(corpus.chunks(), config, backend)
}

/// Build straight from JSON; a non-array value yields an empty index
pub fn build_filter_index_from_json(
    value: &Value,
    config: &FilterIndexConfig,
    backend: &dyn BitmapBackend,
) -> FilterIndex {
    let corpus = Corpus::from_json(value);
    build_filter_index_for_corpus(&corpus, config, backend)
}

/// Build with a progress bar for large corpora
#[cfg(feature = "progress")]
pub fn build_filter_index_with_progress(
    chunks: &[ChunkRecord],
    config: &FilterIndexConfig,
    backend: &dyn BitmapBackend,
    silent: bool,
) -> FilterIndex {
    use indicatif::{ProgressBar, ProgressStyle};

    if silent {
        return build_filter_index(chunks, config, backend);
    }

    let pb = ProgressBar::new(chunks.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
    {
        pb.set_style(style.progress_chars("█▓▒░  "));
    }
    pb.set_message("Indexing chunks...");

    let mut index = empty_index(config);
    for batch in chunks.chunks(BATCH_SIZE) {
        add_batch(&mut index, batch);
        pb.inc(batch.len() as u64);
    }
    pb.set_message("Building bitmaps...");
    let index = finish(index, config, backend);
    pb.finish_with_message(format!("Indexed {} chunks in {} files", chunks.len(), index.file_count()));
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::bitmap::{PlainBackend, RoaringBackend};
    use serde_json::json;

    fn corpus() -> Corpus {
        Corpus::from_json(&json!([
            {"id": 0, "file": "src/app.py", "kind": "FunctionDeclaration", "last_author": "Bob"},
            {"id": 1, "file": "src/app.js", "ext": ".js", "kind": ["Class", "Export"],
             "last_author": ["Alice", "Carol"], "chunk_authors": ["Dave"], "lang": "javascript",
             "docmeta": {"modifiers": {"visibility": "Public"}}},
            {"id": 2, "file": "src\\app.py", "last_author": "Alice", "metaV2": {"lang": "Python"}}
        ]))
    }

    #[test]
    fn test_field_buckets() {
        let index = build_filter_index_for_corpus(&corpus(), &FilterIndexConfig::default(), &PlainBackend);
        assert_eq!(index.by_ext[".py"].len(), 2);
        assert!(index.by_ext[".js"].contains(&1));
        assert!(index.by_kind["class"].contains(&1) && index.by_kind["export"].contains(&1));
        assert_eq!(index.by_author["alice"].len(), 2);
        assert!(index.by_author["carol"].contains(&1));
        assert!(index.by_chunk_author["dave"].contains(&1));
        assert!(index.by_visibility["public"].contains(&1));
        let by_lang = index.by_lang.as_ref().unwrap();
        assert!(by_lang["unknown"].contains(&0));
        assert!(by_lang["python"].contains(&2));
        assert!(by_lang["javascript"].contains(&1));
    }

    #[test]
    fn test_file_table() {
        let index = build_filter_index_for_corpus(&corpus(), &FilterIndexConfig::default(), &PlainBackend);
        assert_eq!(index.file_by_id, vec!["src/app.py", "src/app.js"]);
        assert_eq!(index.file_chunks_by_id[0].len(), 2);
        assert!(index.file_chargrams["app"].contains(&0));
        assert!(index.file_chargrams["app"].contains(&1));
        assert!(!index.file_chargrams.contains_key("APP"));
    }

    #[test]
    fn test_malformed_author_absent() {
        let value = json!([{"id": 0, "last_author": {"name": "x"}, "chunk_authors": 7}]);
        let index = build_filter_index_from_json(&value, &FilterIndexConfig::default(), &PlainBackend);
        assert!(index.by_author.is_empty());
        assert!(index.by_chunk_author.is_empty());
    }

    #[test]
    fn test_non_array_yields_empty_index() {
        let index = build_filter_index_from_json(&json!({"oops": true}), &FilterIndexConfig::default(), &RoaringBackend);
        assert!(index.by_ext.is_empty());
        assert_eq!(index.file_count(), 0);
        assert!(index.by_lang.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_chargram_n_configurable() {
        let config = FilterIndexConfig {
            file_chargram_n: 4,
            ..Default::default()
        };
        let index = build_filter_index_for_corpus(&corpus(), &config, &PlainBackend);
        assert_eq!(index.file_chargram_n, 4);
        assert!(index.file_chargrams.keys().all(|g| g.chars().count() == 4));
    }
}
