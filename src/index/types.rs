use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Unique identifier for a chunk within one corpus snapshot
pub type ChunkId = u32;

/// Dense identifier for a normalized file path, assigned on first sighting
pub type FileId = u32;

/// Plain set of chunk (or file) ids
pub type IdSet = FxHashSet<u32>;

/// Normalized field value -> ids carrying that value
pub type Buckets = FxHashMap<String, IdSet>;

/// Version written into every serialized filter index
pub const SCHEMA_VERSION: u32 = 1;

/// Default char-gram length for the file-path prefilter
pub const DEFAULT_CHARGRAM_N: usize = 3;

/// Smallest char-gram length accepted anywhere
pub const MIN_CHARGRAM_N: usize = 2;

/// Buckets at or above this cardinality get a bitmap mirror
pub const DEFAULT_BITMAP_MIN_SIZE: usize = 256;

/// Bucket key used when no language can be resolved for a chunk
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Indexed chunk fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexedField {
    Ext,
    Lang,
    Kind,
    Author,
    ChunkAuthor,
    Visibility,
}

impl IndexedField {
    pub const ALL: [IndexedField; 6] = [
        IndexedField::Ext,
        IndexedField::Lang,
        IndexedField::Kind,
        IndexedField::Author,
        IndexedField::ChunkAuthor,
        IndexedField::Visibility,
    ];

    /// Key of this field's bucket object in the serialized index
    pub fn serialized_key(self) -> &'static str {
        match self {
            IndexedField::Ext => "byExt",
            IndexedField::Lang => "byLang",
            IndexedField::Kind => "byKind",
            IndexedField::Author => "byAuthor",
            IndexedField::ChunkAuthor => "byChunkAuthor",
            IndexedField::Visibility => "byVisibility",
        }
    }
}

/// Configuration for building a filter index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterIndexConfig {
    /// Char-gram length for file-path prefiltering
    pub file_chargram_n: usize,
    /// Minimum bucket cardinality for a bitmap mirror
    pub bitmap_min_size: usize,
    /// Whether to build bitmap mirrors at all
    pub include_bitmaps: bool,
}

impl Default for FilterIndexConfig {
    fn default() -> Self {
        Self {
            file_chargram_n: DEFAULT_CHARGRAM_N,
            bitmap_min_size: DEFAULT_BITMAP_MIN_SIZE,
            include_bitmaps: true,
        }
    }
}

impl FilterIndexConfig {
    /// Char-gram length clamped to the accepted minimum
    pub fn effective_chargram_n(&self) -> usize {
        self.file_chargram_n.max(MIN_CHARGRAM_N)
    }
}
