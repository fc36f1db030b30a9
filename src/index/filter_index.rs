use crate::index::bitmap::{create_from_ids, Bitmap, BitmapBackend, BitmapOptions};
use crate::index::types::{Buckets, ChunkId, FileId, IdSet, IndexedField};
use rustc_hash::FxHashMap;

/// Bitmap mirrors of the buckets large enough to benefit from compression.
///
/// A missing entry means "use the plain set", never "empty".
#[derive(Debug, Clone, Default)]
pub struct BitmapIndex {
    pub by_ext: FxHashMap<String, Bitmap>,
    pub by_lang: FxHashMap<String, Bitmap>,
    pub by_kind: FxHashMap<String, Bitmap>,
    pub by_author: FxHashMap<String, Bitmap>,
    pub by_chunk_author: FxHashMap<String, Bitmap>,
    pub by_visibility: FxHashMap<String, Bitmap>,
    /// Aligned to file id
    pub file_chunks_by_id: Vec<Option<Bitmap>>,
}

impl BitmapIndex {
    pub fn field(&self, field: IndexedField) -> &FxHashMap<String, Bitmap> {
        match field {
            IndexedField::Ext => &self.by_ext,
            IndexedField::Lang => &self.by_lang,
            IndexedField::Kind => &self.by_kind,
            IndexedField::Author => &self.by_author,
            IndexedField::ChunkAuthor => &self.by_chunk_author,
            IndexedField::Visibility => &self.by_visibility,
        }
    }

    fn field_mut(&mut self, field: IndexedField) -> &mut FxHashMap<String, Bitmap> {
        match field {
            IndexedField::Ext => &mut self.by_ext,
            IndexedField::Lang => &mut self.by_lang,
            IndexedField::Kind => &mut self.by_kind,
            IndexedField::Author => &mut self.by_author,
            IndexedField::ChunkAuthor => &mut self.by_chunk_author,
            IndexedField::Visibility => &mut self.by_visibility,
        }
    }

    /// Mirror for one file's chunk bucket, if that bucket was large enough
    pub fn file_chunks(&self, file_id: FileId) -> Option<&Bitmap> {
        self.file_chunks_by_id.get(file_id as usize).and_then(Option::as_ref)
    }

    /// Number of bitmaps held
    pub fn len(&self) -> usize {
        IndexedField::ALL.iter().map(|&f| self.field(f).len()).sum::<usize>()
            + self.file_chunks_by_id.iter().filter(|b| b.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&mut self) {
        for field in IndexedField::ALL {
            let map = self.field_mut(field);
            for bitmap in map.values_mut() {
                bitmap.clear();
            }
            map.clear();
            map.shrink_to_fit();
        }
        for bitmap in self.file_chunks_by_id.iter_mut().flatten() {
            bitmap.clear();
        }
        self.file_chunks_by_id.clear();
        self.file_chunks_by_id.shrink_to_fit();
    }
}

/// Pre-aggregated chunk ids by field value, plus the file-path tables used
/// for file prefiltering. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct FilterIndex {
    pub file_chargram_n: usize,
    pub by_ext: Buckets,
    /// `None` on indexes serialized before language bucketing existed
    pub by_lang: Option<Buckets>,
    pub by_kind: Buckets,
    pub by_author: Buckets,
    pub by_chunk_author: Buckets,
    pub by_visibility: Buckets,
    /// File id -> normalized path
    pub file_by_id: Vec<String>,
    pub file_id_by_path: FxHashMap<String, FileId>,
    /// File id -> chunk ids in that file
    pub file_chunks_by_id: Vec<IdSet>,
    /// Char-gram -> file ids whose lower-cased path contains it
    pub file_chargrams: Buckets,
    pub bitmap: Option<BitmapIndex>,
}

impl FilterIndex {
    /// Buckets for a field; `None` only for a missing language table
    pub fn buckets(&self, field: IndexedField) -> Option<&Buckets> {
        match field {
            IndexedField::Ext => Some(&self.by_ext),
            IndexedField::Lang => self.by_lang.as_ref(),
            IndexedField::Kind => Some(&self.by_kind),
            IndexedField::Author => Some(&self.by_author),
            IndexedField::ChunkAuthor => Some(&self.by_chunk_author),
            IndexedField::Visibility => Some(&self.by_visibility),
        }
    }

    fn buckets_mut(&mut self, field: IndexedField) -> Option<&mut Buckets> {
        match field {
            IndexedField::Ext => Some(&mut self.by_ext),
            IndexedField::Lang => self.by_lang.as_mut(),
            IndexedField::Kind => Some(&mut self.by_kind),
            IndexedField::Author => Some(&mut self.by_author),
            IndexedField::ChunkAuthor => Some(&mut self.by_chunk_author),
            IndexedField::Visibility => Some(&mut self.by_visibility),
        }
    }

    /// Bitmap mirrors for a field, if any were built
    pub fn bitmap_buckets(&self, field: IndexedField) -> Option<&FxHashMap<String, Bitmap>> {
        self.bitmap.as_ref().map(|b| b.field(field))
    }

    pub fn file_count(&self) -> usize {
        self.file_by_id.len()
    }

    pub fn file_id(&self, normalized_path: &str) -> Option<FileId> {
        self.file_id_by_path.get(normalized_path).copied()
    }

    /// Register a file path, reusing its id if already seen
    pub(crate) fn intern_file(&mut self, normalized_path: &str) -> (FileId, bool) {
        if let Some(&id) = self.file_id_by_path.get(normalized_path) {
            return (id, false);
        }
        let id = self.file_by_id.len() as FileId;
        self.file_by_id.push(normalized_path.to_string());
        self.file_id_by_path.insert(normalized_path.to_string(), id);
        self.file_chunks_by_id.push(IdSet::default());
        (id, true)
    }

    pub(crate) fn add_to_bucket(&mut self, field: IndexedField, key: String, id: ChunkId) {
        if let Some(buckets) = self.buckets_mut(field) {
            buckets.entry(key).or_default().insert(id);
        }
    }

    /// (Re)build bitmap mirrors for every bucket meeting `min_size`
    pub fn build_bitmaps(&mut self, backend: &dyn BitmapBackend, min_size: usize) {
        if !backend.available() {
            self.bitmap = None;
            return;
        }
        let options = BitmapOptions { min_size, force: false };
        let mut index = BitmapIndex::default();
        for field in IndexedField::ALL {
            let Some(buckets) = self.buckets(field) else {
                continue;
            };
            let target = index.field_mut(field);
            for (key, ids) in buckets {
                if let Some(bitmap) = create_from_ids(backend, ids.iter().copied(), options) {
                    target.insert(key.clone(), bitmap);
                }
            }
        }
        index.file_chunks_by_id = self
            .file_chunks_by_id
            .iter()
            .map(|ids| create_from_ids(backend, ids.iter().copied(), options))
            .collect();
        self.bitmap = Some(index);
    }

    /// Chunk ids of the given files
    pub fn chunks_for_files<'a, I>(&self, file_ids: I) -> IdSet
    where
        I: IntoIterator<Item = &'a FileId>,
    {
        let mut out = IdSet::default();
        for &file_id in file_ids {
            if let Some(chunks) = self.file_chunks_by_id.get(file_id as usize) {
                out.extend(chunks.iter().copied());
            }
        }
        out
    }
}

fn release_buckets(buckets: &mut Buckets) {
    for ids in buckets.values_mut() {
        ids.clear();
        ids.shrink_to_fit();
    }
    buckets.clear();
    buckets.shrink_to_fit();
}

/// Empty every container of an index before it is dropped.
///
/// Nested sets are cleared individually so nothing retained elsewhere keeps
/// the bulk of the index alive.
pub fn release_filter_index_memory(index: &mut FilterIndex) {
    release_buckets(&mut index.by_ext);
    if let Some(by_lang) = index.by_lang.as_mut() {
        release_buckets(by_lang);
    }
    release_buckets(&mut index.by_kind);
    release_buckets(&mut index.by_author);
    release_buckets(&mut index.by_chunk_author);
    release_buckets(&mut index.by_visibility);
    release_buckets(&mut index.file_chargrams);

    for ids in index.file_chunks_by_id.iter_mut() {
        ids.clear();
        ids.shrink_to_fit();
    }
    index.file_chunks_by_id.clear();
    index.file_chunks_by_id.shrink_to_fit();
    index.file_by_id.clear();
    index.file_by_id.shrink_to_fit();
    index.file_id_by_path.clear();
    index.file_id_by_path.shrink_to_fit();

    if let Some(bitmap) = index.bitmap.as_mut() {
        bitmap.release();
    }
    index.bitmap = None;
}
