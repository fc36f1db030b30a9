//! Deterministic snapshot form of a [`FilterIndex`].
//!
//! Bucket keys are emitted in sorted order and ids within a bucket ascending,
//! so serializing the index of the same corpus twice yields identical bytes.
//! Hydration is lenient: a bucket of the wrong shape becomes an empty bucket
//! instead of failing the whole load.

use crate::error::FilterError;
use crate::index::bitmap::BitmapBackend;
use crate::index::filter_index::FilterIndex;
use crate::index::types::{
    Buckets, FileId, IdSet, IndexedField, DEFAULT_CHARGRAM_N, MIN_CHARGRAM_N, SCHEMA_VERSION,
};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub type SerializedBuckets = BTreeMap<String, Vec<u32>>;

/// Plain-data snapshot of a filter index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedFilterIndex {
    pub schema_version: u32,
    pub file_chargram_n: usize,
    pub by_ext: SerializedBuckets,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_lang: Option<SerializedBuckets>,
    pub by_kind: SerializedBuckets,
    pub by_author: SerializedBuckets,
    pub by_chunk_author: SerializedBuckets,
    pub by_visibility: SerializedBuckets,
    pub file_by_id: Vec<String>,
    pub file_chunks_by_id: Vec<Vec<u32>>,
    pub file_chargrams: SerializedBuckets,
}

fn sorted_ids(ids: &IdSet) -> Vec<u32> {
    let mut out: Vec<u32> = ids.iter().copied().collect();
    out.sort_unstable();
    out
}

fn serialize_buckets(buckets: &Buckets) -> SerializedBuckets {
    buckets
        .iter()
        .map(|(key, ids)| (key.clone(), sorted_ids(ids)))
        .collect()
}

/// Snapshot an index. Per-file chunk lists are aligned to `file_by_id`;
/// a missing entry is written as an empty list.
pub fn serialize_filter_index(index: &FilterIndex) -> SerializedFilterIndex {
    let file_chunks_by_id = (0..index.file_by_id.len())
        .map(|file_id| {
            index
                .file_chunks_by_id
                .get(file_id)
                .map(sorted_ids)
                .unwrap_or_default()
        })
        .collect();

    SerializedFilterIndex {
        schema_version: SCHEMA_VERSION,
        file_chargram_n: index.file_chargram_n,
        by_ext: serialize_buckets(&index.by_ext),
        by_lang: index.by_lang.as_ref().map(serialize_buckets),
        by_kind: serialize_buckets(&index.by_kind),
        by_author: serialize_buckets(&index.by_author),
        by_chunk_author: serialize_buckets(&index.by_chunk_author),
        by_visibility: serialize_buckets(&index.by_visibility),
        file_by_id: index.file_by_id.clone(),
        file_chunks_by_id,
        file_chargrams: serialize_buckets(&index.file_chargrams),
    }
}

/// Serialize straight to a JSON string
pub fn serialize_filter_index_json(index: &FilterIndex) -> serde_json::Result<String> {
    serde_json::to_string(&serialize_filter_index(index))
}

/// Ids from a JSON array; anything else is an empty list
fn ids_from_json(value: &Value) -> IdSet {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_u64)
            .filter_map(|id| u32::try_from(id).ok())
            .collect(),
        _ => IdSet::default(),
    }
}

fn buckets_from_json(value: Option<&Value>) -> Option<Buckets> {
    let map: &Map<String, Value> = value?.as_object()?;
    Some(
        map.iter()
            .map(|(key, ids)| (key.clone(), ids_from_json(ids)))
            .collect(),
    )
}

/// Rebuild an index from its serialized JSON form.
///
/// Returns `None` only when `value` is not an object. A missing `byLang`
/// table is preserved as absent so query-time language filters can report
/// the stale index.
pub fn hydrate_filter_index(
    value: &Value,
    backend: &dyn BitmapBackend,
    bitmap_min_size: usize,
) -> Option<FilterIndex> {
    let object = value.as_object()?;

    let file_chargram_n = object
        .get("fileChargramN")
        .and_then(Value::as_u64)
        .map(|n| (n as usize).max(MIN_CHARGRAM_N))
        .unwrap_or(DEFAULT_CHARGRAM_N);

    let bucket = |field: IndexedField| buckets_from_json(object.get(field.serialized_key()));

    let file_by_id: Vec<String> = match object.get("fileById") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .collect(),
        _ => Vec::new(),
    };

    let mut file_chunks_by_id: Vec<IdSet> = match object.get("fileChunksById") {
        Some(Value::Array(items)) => items.iter().map(ids_from_json).collect(),
        _ => Vec::new(),
    };
    file_chunks_by_id.resize_with(file_by_id.len(), IdSet::default);

    let mut file_id_by_path = FxHashMap::default();
    for (file_id, path) in file_by_id.iter().enumerate() {
        file_id_by_path.entry(path.clone()).or_insert(file_id as FileId);
    }

    let mut index = FilterIndex {
        file_chargram_n,
        by_ext: bucket(IndexedField::Ext).unwrap_or_default(),
        by_lang: bucket(IndexedField::Lang),
        by_kind: bucket(IndexedField::Kind).unwrap_or_default(),
        by_author: bucket(IndexedField::Author).unwrap_or_default(),
        by_chunk_author: bucket(IndexedField::ChunkAuthor).unwrap_or_default(),
        by_visibility: bucket(IndexedField::Visibility).unwrap_or_default(),
        file_by_id,
        file_id_by_path,
        file_chunks_by_id,
        file_chargrams: buckets_from_json(object.get("fileChargrams")).unwrap_or_default(),
        bitmap: None,
    };
    index.build_bitmaps(backend, bitmap_min_size);
    Some(index)
}

/// Check a serialized index carries everything a reload needs
pub fn validate_serialized_filter_index(value: &Value) -> Result<(), FilterError> {
    let object = value
        .as_object()
        .ok_or_else(|| FilterError::InvalidIndex("expected object".into()))?;
    if !object.get("schemaVersion").map(Value::is_number).unwrap_or(false) {
        return Err(FilterError::InvalidIndex("missing schemaVersion".into()));
    }
    if !object.get("fileChargramN").map(Value::is_number).unwrap_or(false) {
        return Err(FilterError::InvalidIndex("missing fileChargramN".into()));
    }
    if !object.get("fileById").map(Value::is_array).unwrap_or(false) {
        return Err(FilterError::InvalidIndex("missing fileById".into()));
    }
    if !object.get("fileChunksById").map(Value::is_array).unwrap_or(false) {
        return Err(FilterError::InvalidIndex("missing fileChunksById".into()));
    }
    if !object.get("byLang").map(Value::is_object).unwrap_or(false) {
        return Err(FilterError::InvalidIndex("missing byLang".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use crate::index::bitmap::{PlainBackend, RoaringBackend};
    use crate::index::build::build_filter_index_for_corpus;
    use crate::index::types::FilterIndexConfig;
    use serde_json::json;

    fn sample_index() -> FilterIndex {
        let corpus = Corpus::from_json(&json!([
            {"id": 0, "file": "src/b.ts", "kind": "Function", "last_author": "Bob"},
            {"id": 1, "file": "src/a.ts", "kind": "Class", "last_author": "Alice"},
            {"id": 2, "file": "src/b.ts", "kind": "Function", "last_author": "Alice"}
        ]));
        build_filter_index_for_corpus(&corpus, &FilterIndexConfig::default(), &RoaringBackend)
    }

    #[test]
    fn test_serialized_shape() {
        let serialized = serialize_filter_index(&sample_index());
        assert_eq!(serialized.schema_version, SCHEMA_VERSION);
        assert_eq!(serialized.file_by_id, vec!["src/b.ts", "src/a.ts"]);
        assert_eq!(serialized.file_chunks_by_id, vec![vec![0, 2], vec![1]]);
        assert_eq!(serialized.by_author["alice"], vec![1, 2]);
        assert!(serialized.by_lang.is_some());
    }

    #[test]
    fn test_serialize_is_deterministic() {
        let a = serialize_filter_index_json(&sample_index()).unwrap();
        let b = serialize_filter_index_json(&sample_index()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hydrate_round_trip() {
        let index = sample_index();
        let value = serde_json::to_value(serialize_filter_index(&index)).unwrap();
        let hydrated = hydrate_filter_index(&value, &PlainBackend, 256).unwrap();
        assert_eq!(serialize_filter_index(&hydrated), serialize_filter_index(&index));
        assert_eq!(hydrated.file_id("src/a.ts"), Some(1));
    }

    #[test]
    fn test_malformed_file_chunks_coerced_to_empty() {
        let value = json!({
            "schemaVersion": 1,
            "fileChargramN": 3,
            "byExt": {".ts": [0, 1], ".js": "broken"},
            "byLang": {"typescript": [0, 1]},
            "fileById": ["src/a.ts", "src/b.ts", "src/c.ts"],
            "fileChunksById": [[0], null],
            "fileChargrams": {"src": [0, 1, 2]}
        });
        let index = hydrate_filter_index(&value, &RoaringBackend, 256).unwrap();
        let serialized = serialize_filter_index(&index);
        assert_eq!(serialized.file_chunks_by_id, vec![vec![0], vec![], vec![]]);
        assert!(serialized.by_ext[".js"].is_empty());
    }

    #[test]
    fn test_hydrate_without_by_lang() {
        let value = json!({"fileChargramN": 3, "fileById": [], "fileChunksById": []});
        let index = hydrate_filter_index(&value, &PlainBackend, 256).unwrap();
        assert!(index.by_lang.is_none());
        assert!(serialize_filter_index(&index).by_lang.is_none());
    }

    #[test]
    fn test_hydrate_rejects_non_object() {
        assert!(hydrate_filter_index(&json!([1, 2]), &PlainBackend, 256).is_none());
    }

    #[test]
    fn test_validate() {
        let good = serde_json::to_value(serialize_filter_index(&sample_index())).unwrap();
        assert!(validate_serialized_filter_index(&good).is_ok());

        let mut missing_lang = good.clone();
        missing_lang.as_object_mut().unwrap().remove("byLang");
        let err = validate_serialized_filter_index(&missing_lang).unwrap_err();
        assert!(err.to_string().contains("byLang"));

        assert!(validate_serialized_filter_index(&json!("x")).is_err());
    }
}
