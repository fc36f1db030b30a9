//! Compressed bitmap layer with a plain-set fallback.
//!
//! Every bitmap in the engine is created through a [`BitmapBackend`]. When the
//! selected backend is unavailable no bitmap is ever produced and callers keep
//! working on plain [`IdSet`]s, so results never depend on which backend is
//! active, only speed and memory do.

use crate::index::types::{ChunkId, DEFAULT_BITMAP_MIN_SIZE, IdSet};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Environment variable that forces the plain-set backend (`off`, `plain`, `0`, `false`)
pub const BITMAP_ENV_VAR: &str = "CHUNKFILTER_BITMAP";

/// A compressed set of chunk ids
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bitmap(RoaringBitmap);

impl Bitmap {
    pub fn len(&self) -> u64 {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: ChunkId) -> bool {
        self.0.contains(id)
    }

    /// Ids in ascending order
    pub fn iter(&self) -> impl Iterator<Item = ChunkId> + '_ {
        self.0.iter()
    }

    pub fn to_set(&self) -> IdSet {
        let mut out = IdSet::default();
        out.reserve(self.0.len() as usize);
        out.extend(self.0.iter());
        out
    }

    pub fn to_vec(&self) -> Vec<ChunkId> {
        self.0.iter().collect()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn serialized_size(&self) -> usize {
        self.0.serialized_size()
    }
}

/// Strategy for producing compressed bitmaps.
///
/// Call sites only ever ask the backend; they never check for a concrete
/// implementation.
pub trait BitmapBackend: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Whether this backend can produce bitmaps at all
    fn available(&self) -> bool;

    /// Build a bitmap from ids. `None` when unavailable.
    fn build(&self, ids: &[ChunkId]) -> Option<Bitmap>;
}

/// Backend backed by the `roaring` crate
#[derive(Debug, Default)]
pub struct RoaringBackend;

impl BitmapBackend for RoaringBackend {
    fn name(&self) -> &'static str {
        "roaring"
    }

    fn available(&self) -> bool {
        true
    }

    fn build(&self, ids: &[ChunkId]) -> Option<Bitmap> {
        Some(Bitmap(ids.iter().copied().collect()))
    }
}

/// Backend that never produces bitmaps; everything stays a plain set
#[derive(Debug, Default)]
pub struct PlainBackend;

impl BitmapBackend for PlainBackend {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn available(&self) -> bool {
        false
    }

    fn build(&self, _ids: &[ChunkId]) -> Option<Bitmap> {
        None
    }
}

static ROARING: RoaringBackend = RoaringBackend;
static PLAIN: PlainBackend = PlainBackend;
static DEFAULT_BACKEND: OnceLock<&'static dyn BitmapBackend> = OnceLock::new();

/// Requested backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Roaring unless disabled through [`BITMAP_ENV_VAR`]
    #[default]
    Auto,
    Roaring,
    Plain,
}

/// Resolve a backend kind to a backend instance
pub fn select_backend(kind: BackendKind) -> &'static dyn BitmapBackend {
    match kind {
        BackendKind::Roaring => &ROARING,
        BackendKind::Plain => &PLAIN,
        BackendKind::Auto => {
            let disabled = std::env::var(BITMAP_ENV_VAR)
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "off" | "plain" | "0" | "false"))
                .unwrap_or(false);
            if disabled { &PLAIN } else { &ROARING }
        }
    }
}

/// Install the process-wide default backend. Returns false if one was already chosen.
pub fn init_default_backend(kind: BackendKind) -> bool {
    let backend = select_backend(kind);
    let installed = DEFAULT_BACKEND.set(backend).is_ok();
    if installed {
        tracing::debug!(backend = backend.name(), "bitmap backend selected");
    }
    installed
}

/// Process-wide default backend, detected once on first use
pub fn default_backend() -> &'static dyn BitmapBackend {
    *DEFAULT_BACKEND.get_or_init(|| {
        let backend = select_backend(BackendKind::Auto);
        tracing::debug!(backend = backend.name(), "bitmap backend detected");
        backend
    })
}

/// Options for [`create_from_ids`]
#[derive(Debug, Clone, Copy)]
pub struct BitmapOptions {
    pub min_size: usize,
    pub force: bool,
}

impl Default for BitmapOptions {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_BITMAP_MIN_SIZE,
            force: false,
        }
    }
}

impl BitmapOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }
}

/// Create a bitmap when the ids are non-empty and either `force` is set or
/// their count reaches `min_size`. `None` tells the caller to keep a plain set.
pub fn create_from_ids<I>(backend: &dyn BitmapBackend, ids: I, options: BitmapOptions) -> Option<Bitmap>
where
    I: IntoIterator<Item = ChunkId>,
{
    if !backend.available() {
        return None;
    }
    let ids: Vec<ChunkId> = ids.into_iter().collect();
    if ids.is_empty() {
        return None;
    }
    if !options.force && ids.len() < options.min_size {
        return None;
    }
    backend.build(&ids)
}

/// Union of one or more bitmaps
pub fn union_bitmaps(bitmaps: &[&Bitmap]) -> Bitmap {
    let mut out = RoaringBitmap::new();
    for bitmap in bitmaps {
        out |= &bitmap.0;
    }
    Bitmap(out)
}

/// Intersection of one or more bitmaps; empty if any input is empty
pub fn intersect_bitmaps(bitmaps: &[&Bitmap]) -> Bitmap {
    if bitmaps.is_empty() || bitmaps.iter().any(|b| b.is_empty()) {
        return Bitmap::default();
    }

    // Start from the smallest input
    let mut ordered: Vec<&Bitmap> = bitmaps.to_vec();
    ordered.sort_by_key(|b| b.len());

    let mut acc = ordered[0].0.clone();
    for bitmap in &ordered[1..] {
        acc &= &bitmap.0;
        if acc.is_empty() {
            break;
        }
    }
    Bitmap(acc)
}

/// Ids of `set` that are also in `bitmap`
pub fn intersect_set_with_bitmap(set: &IdSet, bitmap: &Bitmap) -> IdSet {
    set.iter().copied().filter(|&id| bitmap.contains(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap(ids: &[u32]) -> Bitmap {
        RoaringBackend.build(ids).unwrap()
    }

    #[test]
    fn test_create_respects_min_size() {
        let opts = BitmapOptions { min_size: 4, force: false };
        assert!(create_from_ids(&RoaringBackend, [1, 2, 3], opts).is_none());
        assert!(create_from_ids(&RoaringBackend, [1, 2, 3, 4], opts).is_some());
    }

    #[test]
    fn test_create_forced() {
        let opts = BitmapOptions { min_size: 100, force: true };
        let bm = create_from_ids(&RoaringBackend, [7], opts).unwrap();
        assert_eq!(bm.to_vec(), vec![7]);
    }

    #[test]
    fn test_create_empty_is_none() {
        assert!(create_from_ids(&RoaringBackend, [], BitmapOptions::forced()).is_none());
    }

    #[test]
    fn test_plain_backend_never_builds() {
        assert!(!PlainBackend.available());
        assert!(create_from_ids(&PlainBackend, [1, 2, 3], BitmapOptions::forced()).is_none());
    }

    #[test]
    fn test_union_and_intersect() {
        let a = bitmap(&[1, 2, 3]);
        let b = bitmap(&[2, 3, 4]);
        assert_eq!(union_bitmaps(&[&a, &b]).to_vec(), vec![1, 2, 3, 4]);
        assert_eq!(intersect_bitmaps(&[&a, &b]).to_vec(), vec![2, 3]);
    }

    #[test]
    fn test_intersect_short_circuits_on_empty() {
        let a = bitmap(&[1, 2, 3]);
        let empty = Bitmap::default();
        assert!(intersect_bitmaps(&[&a, &empty]).is_empty());
        assert!(intersect_bitmaps(&[]).is_empty());
    }

    #[test]
    fn test_set_with_bitmap() {
        let set: IdSet = [1, 5, 9].into_iter().collect();
        let bm = bitmap(&[5, 9, 10]);
        let out = intersect_set_with_bitmap(&set, &bm);
        assert_eq!(out.len(), 2);
        assert!(out.contains(&5) && out.contains(&9));
    }

    #[test]
    fn test_explicit_selection() {
        assert!(select_backend(BackendKind::Roaring).available());
        assert!(!select_backend(BackendKind::Plain).available());
    }
}
