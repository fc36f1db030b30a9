//! On-disk persistence for filter indexes and chunk corpora.
//!
//! Indexes are written as the deterministic JSON snapshot from
//! [`serialize_filter_index`](crate::index::serialize::serialize_filter_index)
//! and read back through a memory map.

use crate::corpus::{Corpus, FileRelations};
use crate::index::bitmap::BitmapBackend;
use crate::index::filter_index::FilterIndex;
use crate::index::serialize::{hydrate_filter_index, serialize_filter_index, validate_serialized_filter_index};
use anyhow::{bail, Context, Result};
use memmap2::Mmap;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Memory-map a file and parse it as JSON
fn read_json(path: &Path) -> Result<Value> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let len = file.metadata()?.len();
    if len == 0 {
        bail!("{} is empty", path.display());
    }
    let mmap = unsafe { Mmap::map(&file)? };
    let value = serde_json::from_slice(&mmap).with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(value)
}

/// Write an index snapshot atomically (temp file + rename)
pub fn save_filter_index(index: &FilterIndex, path: &Path) -> Result<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let snapshot = serialize_filter_index(index);
    let tmp_path = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp_path).context("Failed to create index file")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &snapshot).context("Failed to serialize filter index")?;
        writer.flush()?;
    }
    fs::rename(&tmp_path, path).context("Failed to move index into place")?;

    let bytes = fs::metadata(path)?.len();
    tracing::info!(path = %path.display(), bytes, files = index.file_count(), "filter index saved");
    Ok(bytes)
}

/// Load and hydrate an index snapshot.
///
/// A snapshot that parses but fails validation is still hydrated leniently;
/// query-time checks report what is missing.
pub fn load_filter_index(
    path: &Path,
    backend: &dyn BitmapBackend,
    bitmap_min_size: usize,
    soft_limit_bytes: u64,
) -> Result<FilterIndex> {
    let len = fs::metadata(path)
        .with_context(|| format!("No filter index at {}", path.display()))?
        .len();
    if len > soft_limit_bytes {
        tracing::warn!(
            path = %path.display(),
            bytes = len,
            soft_limit = soft_limit_bytes,
            "filter index exceeds soft size limit"
        );
    }

    let value = read_json(path)?;
    if let Err(err) = validate_serialized_filter_index(&value) {
        tracing::warn!(path = %path.display(), error = %err, "filter index failed validation; rebuild recommended");
    }
    let index = hydrate_filter_index(&value, backend, bitmap_min_size)
        .with_context(|| format!("{} is not a filter index", path.display()))?;
    tracing::debug!(path = %path.display(), files = index.file_count(), "filter index loaded");
    Ok(index)
}

/// Load a chunk corpus (JSON array of chunk records)
pub fn load_corpus(path: &Path) -> Result<Corpus> {
    let value = read_json(path)?;
    if !value.is_array() {
        tracing::warn!(path = %path.display(), "chunk corpus is not an array");
    }
    let corpus = Corpus::from_json(&value);
    tracing::debug!(path = %path.display(), chunks = corpus.len(), "chunk corpus loaded");
    Ok(corpus)
}

/// Load per-file relations (object keyed by file path)
pub fn load_relations(path: &Path) -> Result<FileRelations> {
    let value = read_json(path)?;
    let relations = serde_json::from_value(value)
        .with_context(|| format!("Failed to decode relations from {}", path.display()))?;
    Ok(relations)
}
