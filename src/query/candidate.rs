//! Candidate algebra.
//!
//! A [`Candidate`] is the set of chunk ids that might satisfy one clause,
//! held either as a plain set or as a bitmap. Functions here return
//! `Option<Candidate>`: `None` means the clause could not be resolved from
//! the index (no restriction), `Some` of an empty candidate means the clause
//! matches nothing.

use crate::index::bitmap::{
    create_from_ids, intersect_bitmaps, intersect_set_with_bitmap, union_bitmaps, Bitmap,
    BitmapBackend, BitmapOptions,
};
use crate::index::types::{Buckets, ChunkId, IdSet, DEFAULT_BITMAP_MIN_SIZE};
use rustc_hash::FxHashMap;

/// Ids that might satisfy a clause
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    Set(IdSet),
    Bitmap(Bitmap),
}

/// Final set of admissible chunk ids handed to rankers
pub type Allowlist = Candidate;

impl Default for Candidate {
    fn default() -> Self {
        Candidate::Set(IdSet::default())
    }
}

impl Candidate {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        match self {
            Candidate::Set(set) => set.len(),
            Candidate::Bitmap(bitmap) => bitmap.len() as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Candidate::Set(set) => set.is_empty(),
            Candidate::Bitmap(bitmap) => bitmap.is_empty(),
        }
    }

    #[inline]
    pub fn contains(&self, id: ChunkId) -> bool {
        match self {
            Candidate::Set(set) => set.contains(&id),
            Candidate::Bitmap(bitmap) => bitmap.contains(id),
        }
    }

    pub fn is_bitmap(&self) -> bool {
        matches!(self, Candidate::Bitmap(_))
    }

    pub fn to_set(&self) -> IdSet {
        match self {
            Candidate::Set(set) => set.clone(),
            Candidate::Bitmap(bitmap) => bitmap.to_set(),
        }
    }

    /// Ids in ascending order
    pub fn to_sorted_vec(&self) -> Vec<ChunkId> {
        match self {
            Candidate::Set(set) => {
                let mut ids: Vec<ChunkId> = set.iter().copied().collect();
                ids.sort_unstable();
                ids
            }
            Candidate::Bitmap(bitmap) => bitmap.to_vec(),
        }
    }
}

impl From<IdSet> for Candidate {
    fn from(set: IdSet) -> Self {
        Candidate::Set(set)
    }
}

impl From<Bitmap> for Candidate {
    fn from(bitmap: Bitmap) -> Self {
        Candidate::Bitmap(bitmap)
    }
}

/// Representation policy for [`intersect_candidates`]
#[derive(Debug, Clone, Copy)]
pub struct IntersectOptions {
    /// Return a bitmap when the result is large enough and a backend is available
    pub prefer_bitmap: bool,
    pub bitmap_min_size: usize,
}

impl Default for IntersectOptions {
    fn default() -> Self {
        Self {
            prefer_bitmap: true,
            bitmap_min_size: DEFAULT_BITMAP_MIN_SIZE,
        }
    }
}

/// Union plain sets and bitmaps into one candidate.
///
/// Prefers a bitmap when the backend is available. `None` when there is
/// nothing to merge.
pub fn build_candidate(sets: &[&IdSet], bitmaps: &[&Bitmap], backend: &dyn BitmapBackend) -> Option<Candidate> {
    if sets.is_empty() && bitmaps.is_empty() {
        return None;
    }

    if backend.available() {
        let mut bitmap = (!bitmaps.is_empty()).then(|| union_bitmaps(bitmaps));
        if !sets.is_empty() {
            let ids = sets.iter().flat_map(|set| set.iter().copied());
            if let Some(extra) = create_from_ids(backend, ids, BitmapOptions::forced()) {
                bitmap = Some(match bitmap {
                    Some(existing) => union_bitmaps(&[&existing, &extra]),
                    None => extra,
                });
            }
        }
        if let Some(bitmap) = bitmap {
            return Some(Candidate::Bitmap(bitmap));
        }
    }

    let mut out = IdSet::default();
    for set in sets {
        out.extend(set.iter().copied());
    }
    for bitmap in bitmaps {
        out.extend(bitmap.iter());
    }
    Some(Candidate::Set(out))
}

/// Union several candidates (OR within one clause)
pub fn merge_candidates(candidates: &[Candidate], backend: &dyn BitmapBackend) -> Option<Candidate> {
    if candidates.is_empty() {
        return None;
    }
    let mut sets = Vec::new();
    let mut bitmaps = Vec::new();
    for candidate in candidates {
        match candidate {
            Candidate::Set(set) => sets.push(set),
            Candidate::Bitmap(bitmap) => bitmaps.push(bitmap),
        }
    }
    build_candidate(&sets, &bitmaps, backend)
}

/// Intersect plain sets, starting from the smallest
fn intersect_sets(sets: &[&IdSet]) -> IdSet {
    let Some(smallest) = sets.iter().min_by_key(|s| s.len()) else {
        return IdSet::default();
    };
    let mut acc: IdSet = (*smallest).clone();
    for set in sets {
        if std::ptr::eq(*set, *smallest) {
            continue;
        }
        acc.retain(|id| set.contains(id));
        if acc.is_empty() {
            break;
        }
    }
    acc
}

fn finalize(set: IdSet, options: IntersectOptions, backend: &dyn BitmapBackend) -> Candidate {
    if options.prefer_bitmap && set.len() >= options.bitmap_min_size {
        let opts = BitmapOptions {
            min_size: options.bitmap_min_size,
            force: false,
        };
        if let Some(bitmap) = create_from_ids(backend, set.iter().copied(), opts) {
            return Candidate::Bitmap(bitmap);
        }
    }
    Candidate::Set(set)
}

/// AND a list of candidates.
///
/// Returns an empty candidate as soon as any input is empty. Bitmaps are
/// intersected natively, then narrowed by the plain sets. The result is a
/// bitmap only under `prefer_bitmap` and at or above `bitmap_min_size`.
pub fn intersect_candidates(
    candidates: &[Candidate],
    options: IntersectOptions,
    backend: &dyn BitmapBackend,
) -> Option<Candidate> {
    if candidates.is_empty() {
        return None;
    }

    let mut sets = Vec::new();
    let mut bitmaps = Vec::new();
    for candidate in candidates {
        if candidate.is_empty() {
            return Some(Candidate::empty());
        }
        match candidate {
            Candidate::Set(set) => sets.push(set),
            Candidate::Bitmap(bitmap) => bitmaps.push(bitmap),
        }
    }

    if bitmaps.is_empty() {
        return Some(finalize(intersect_sets(&sets), options, backend));
    }

    let bitmap = intersect_bitmaps(&bitmaps);
    if bitmap.is_empty() {
        return Some(Candidate::empty());
    }
    if sets.is_empty() {
        if options.prefer_bitmap && bitmap.len() as usize >= options.bitmap_min_size {
            return Some(Candidate::Bitmap(bitmap));
        }
        return Some(Candidate::Set(bitmap.to_set()));
    }

    let narrowed = intersect_sets(&sets);
    if narrowed.is_empty() {
        return Some(Candidate::empty());
    }
    Some(finalize(intersect_set_with_bitmap(&narrowed, &bitmap), options, backend))
}

/// Exact bucket lookups, OR-ed across `values`.
///
/// `None` when there is no bucket map or no values; an empty candidate when
/// no value has a bucket.
pub fn collect_exact_matches<S: AsRef<str>>(
    buckets: Option<&Buckets>,
    values: &[S],
    bitmaps: Option<&FxHashMap<String, Bitmap>>,
    backend: &dyn BitmapBackend,
) -> Option<Candidate> {
    let buckets = buckets?;
    if values.is_empty() {
        return None;
    }
    let mut sets = Vec::new();
    let mut mirrors = Vec::new();
    for value in values {
        let value = value.as_ref();
        if value.is_empty() {
            continue;
        }
        let Some(set) = buckets.get(value) else {
            continue;
        };
        match bitmaps.and_then(|b| b.get(value)) {
            Some(bitmap) => mirrors.push(bitmap),
            None => sets.push(set),
        }
    }
    if sets.is_empty() && mirrors.is_empty() {
        return Some(Candidate::empty());
    }
    build_candidate(&sets, &mirrors, backend)
}

/// Union of every bucket whose key contains `needle`
pub fn collect_substring_matches(
    buckets: Option<&Buckets>,
    needle: &str,
    bitmaps: Option<&FxHashMap<String, Bitmap>>,
    backend: &dyn BitmapBackend,
) -> Option<Candidate> {
    let buckets = buckets?;
    if needle.is_empty() {
        return None;
    }
    let mut sets = Vec::new();
    let mut mirrors = Vec::new();
    for (key, set) in buckets {
        if !key.contains(needle) {
            continue;
        }
        match bitmaps.and_then(|b| b.get(key)) {
            Some(bitmap) => mirrors.push(bitmap),
            None => sets.push(set),
        }
    }
    if sets.is_empty() && mirrors.is_empty() {
        return Some(Candidate::empty());
    }
    build_candidate(&sets, &mirrors, backend)
}

/// [`collect_substring_matches`] OR-ed across several needles
pub fn collect_any_substring_matches<S: AsRef<str>>(
    buckets: Option<&Buckets>,
    values: &[S],
    bitmaps: Option<&FxHashMap<String, Bitmap>>,
    backend: &dyn BitmapBackend,
) -> Option<Candidate> {
    if buckets.is_none() || values.is_empty() {
        return None;
    }
    let candidates: Vec<Candidate> = values
        .iter()
        .filter_map(|v| collect_substring_matches(buckets, v.as_ref(), bitmaps, backend))
        .collect();
    merge_candidates(&candidates, backend)
}

/// Keep the ids of `candidates` admitted by `allowlist`, in input order.
/// A `None` allowlist admits everything.
pub fn restrict_candidates<I>(candidates: I, allowlist: Option<&Allowlist>) -> Vec<ChunkId>
where
    I: IntoIterator<Item = ChunkId>,
{
    match allowlist {
        None => candidates.into_iter().collect(),
        Some(allowed) => candidates.into_iter().filter(|&id| allowed.contains(id)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::bitmap::{PlainBackend, RoaringBackend};

    fn set(ids: &[u32]) -> IdSet {
        ids.iter().copied().collect()
    }

    fn bitmap(ids: &[u32]) -> Bitmap {
        RoaringBackend.build(ids).unwrap()
    }

    #[test]
    fn test_build_candidate_none_when_empty_inputs() {
        assert!(build_candidate(&[], &[], &RoaringBackend).is_none());
    }

    #[test]
    fn test_build_candidate_prefers_bitmap() {
        let a = set(&[1, 2]);
        let b = bitmap(&[3]);
        let candidate = build_candidate(&[&a], &[&b], &RoaringBackend).unwrap();
        assert!(candidate.is_bitmap());
        assert_eq!(candidate.to_sorted_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_build_candidate_plain_fallback() {
        let a = set(&[1, 2]);
        let candidate = build_candidate(&[&a], &[], &PlainBackend).unwrap();
        assert!(!candidate.is_bitmap());
        assert_eq!(candidate.to_sorted_vec(), vec![1, 2]);
    }

    #[test]
    fn test_intersect_short_circuit() {
        let list = vec![Candidate::Set(set(&[1, 2])), Candidate::empty(), Candidate::Bitmap(bitmap(&[1]))];
        let out = intersect_candidates(&list, IntersectOptions::default(), &RoaringBackend).unwrap();
        assert!(out.is_empty());
        assert!(intersect_candidates(&[], IntersectOptions::default(), &RoaringBackend).is_none());
    }

    #[test]
    fn test_intersect_mixed() {
        let list = vec![
            Candidate::Bitmap(bitmap(&[1, 2, 3, 4])),
            Candidate::Set(set(&[2, 3, 9])),
            Candidate::Bitmap(bitmap(&[3, 2])),
        ];
        let out = intersect_candidates(&list, IntersectOptions::default(), &RoaringBackend).unwrap();
        assert_eq!(out.to_sorted_vec(), vec![2, 3]);
        assert!(!out.is_bitmap());
    }

    #[test]
    fn test_intersect_prefers_bitmap_when_large() {
        let big: Vec<u32> = (0..10).collect();
        let options = IntersectOptions {
            prefer_bitmap: true,
            bitmap_min_size: 4,
        };
        let list = vec![Candidate::Set(big.iter().copied().collect()), Candidate::Set(set(&[1, 2, 3, 4, 5]))];
        let out = intersect_candidates(&list, options, &RoaringBackend).unwrap();
        assert!(out.is_bitmap());
        assert_eq!(out.len(), 5);

        let out = intersect_candidates(&list, options, &PlainBackend).unwrap();
        assert!(!out.is_bitmap());
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_collect_exact_matches() {
        let mut buckets = Buckets::default();
        buckets.insert("function".into(), set(&[1, 2]));
        buckets.insert("class".into(), set(&[3]));

        let out = collect_exact_matches(Some(&buckets), &["function", "class"], None, &PlainBackend).unwrap();
        assert_eq!(out.to_sorted_vec(), vec![1, 2, 3]);

        let out = collect_exact_matches(Some(&buckets), &["method"], None, &PlainBackend).unwrap();
        assert!(out.is_empty());

        assert!(collect_exact_matches::<&str>(Some(&buckets), &[], None, &PlainBackend).is_none());
        assert!(collect_exact_matches(None, &["class"], None, &PlainBackend).is_none());
    }

    #[test]
    fn test_collect_exact_uses_mirror() {
        let mut buckets = Buckets::default();
        buckets.insert(".ts".into(), set(&[1, 2]));
        let mut mirrors = FxHashMap::default();
        mirrors.insert(".ts".to_string(), bitmap(&[1, 2]));
        let out = collect_exact_matches(Some(&buckets), &[".ts"], Some(&mirrors), &RoaringBackend).unwrap();
        assert!(out.is_bitmap());
        assert_eq!(out.to_sorted_vec(), vec![1, 2]);
    }

    #[test]
    fn test_collect_substring_matches() {
        let mut buckets = Buckets::default();
        buckets.insert("alice smith".into(), set(&[1]));
        buckets.insert("alicia".into(), set(&[2]));
        buckets.insert("bob".into(), set(&[3]));

        let out = collect_substring_matches(Some(&buckets), "alic", None, &PlainBackend).unwrap();
        assert_eq!(out.to_sorted_vec(), vec![1, 2]);

        let out = collect_any_substring_matches(Some(&buckets), &["smith", "bob"], None, &RoaringBackend).unwrap();
        assert_eq!(out.to_sorted_vec(), vec![1, 3]);

        let out = collect_substring_matches(Some(&buckets), "zed", None, &PlainBackend).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_restrict_candidates() {
        let allow = Candidate::Set(set(&[2, 4]));
        assert_eq!(restrict_candidates([4, 1, 2], Some(&allow)), vec![4, 2]);
        assert_eq!(restrict_candidates([4, 1, 2], None), vec![4, 1, 2]);
    }
}
