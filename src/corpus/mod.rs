//! Chunk corpus consumed by the filter engine.
//!
//! - [`record`] - chunk records with fail-closed field decoding
//! - [`meta`] - metadata shapes and the merged [`MetaView`]

pub mod meta;
pub mod record;

pub use meta::{Counter, DocMeta, MetaView};
pub use record::{ChunkRecord, CodeRelations, FieldValue};

use crate::index::types::ChunkId;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;

/// Ordered chunk list plus an id -> position lookup
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    chunks: Vec<ChunkRecord>,
    positions: FxHashMap<ChunkId, usize>,
}

impl Corpus {
    pub fn new(chunks: Vec<ChunkRecord>) -> Self {
        let mut positions = FxHashMap::default();
        positions.reserve(chunks.len());
        for (pos, chunk) in chunks.iter().enumerate() {
            // First occurrence wins for duplicated ids
            positions.entry(chunk.id).or_insert(pos);
        }
        Self { chunks, positions }
    }

    /// Decode a corpus from JSON. Anything but an array is an empty corpus;
    /// entries without a usable integer `id` are skipped.
    pub fn from_json(value: &Value) -> Self {
        let Some(entries) = value.as_array() else {
            tracing::debug!("chunk corpus is not an array; treating as empty");
            return Self::default();
        };

        let mut chunks = Vec::with_capacity(entries.len());
        let mut skipped = 0usize;
        for entry in entries {
            match ChunkRecord::deserialize(entry) {
                Ok(chunk) => chunks.push(chunk),
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::debug!(skipped, "skipped chunk records without a valid id");
        }
        Self::new(chunks)
    }

    pub fn chunks(&self) -> &[ChunkRecord] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, id: ChunkId) -> Option<&ChunkRecord> {
        self.positions.get(&id).map(|&pos| &self.chunks[pos])
    }

    /// Corpus position of a chunk id
    pub fn position(&self, id: ChunkId) -> Option<usize> {
        self.positions.get(&id).copied()
    }
}

impl From<Vec<ChunkRecord>> for Corpus {
    fn from(chunks: Vec<ChunkRecord>) -> Self {
        Self::new(chunks)
    }
}

/// Per-file relation lookup (imports/usages) keyed by file path
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct FileRelations(FxHashMap<String, CodeRelations>);

impl FileRelations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: impl Into<String>, relations: CodeRelations) {
        self.0.insert(file.into(), relations);
    }

    pub fn get(&self, file: &str) -> Option<&CodeRelations> {
        self.0.get(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_array_corpus_is_empty() {
        assert!(Corpus::from_json(&json!({"id": 1})).is_empty());
        assert!(Corpus::from_json(&json!("chunks")).is_empty());
    }

    #[test]
    fn test_entries_without_id_skipped() {
        let corpus = Corpus::from_json(&json!([{"id": 0}, {"file": "a.js"}, {"id": -1}, {"id": 5}]));
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.position(5), Some(1));
        assert!(corpus.get(1).is_none());
    }

    #[test]
    fn test_file_relations_lookup() {
        let relations: FileRelations = serde_json::from_value(json!({
            "src/a.js": {"imports": ["fs"], "usages": ["readFile"]}
        }))
        .unwrap();
        let entry = relations.get("src/a.js").unwrap();
        assert_eq!(entry.imports.as_deref(), Some(&["fs".to_string()][..]));
        assert!(relations.get("src/b.js").is_none());
    }
}
