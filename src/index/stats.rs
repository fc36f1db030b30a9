use crate::index::filter_index::FilterIndex;
use crate::index::serialize::serialize_filter_index_json;
use crate::index::types::{IdSet, IndexedField};
use serde::Serialize;
use std::fmt;

/// Size summary for one indexed field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldStats {
    pub field: &'static str,
    /// Distinct values; `None` when the table is absent
    pub buckets: Option<usize>,
    /// Largest bucket cardinality
    pub largest: usize,
    pub bitmaps: usize,
}

/// Summary of a filter index for the `stats` command and debug logging
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterIndexStats {
    pub files: usize,
    /// Distinct chunk ids reachable through file buckets
    pub chunks: usize,
    pub chargram_n: usize,
    pub chargrams: usize,
    pub fields: Vec<FieldStats>,
    pub bitmaps: usize,
    pub bitmap_bytes: usize,
    pub json_bytes: usize,
}

/// Walk an index and count what it holds
pub fn summarize_filter_index(index: &FilterIndex) -> FilterIndexStats {
    let mut chunks = IdSet::default();
    for ids in &index.file_chunks_by_id {
        chunks.extend(ids.iter().copied());
    }

    let fields = IndexedField::ALL
        .iter()
        .map(|&field| {
            let buckets = index.buckets(field);
            FieldStats {
                field: field.serialized_key(),
                buckets: buckets.map(|b| b.len()),
                largest: buckets
                    .and_then(|b| b.values().map(|ids| ids.len()).max())
                    .unwrap_or(0),
                bitmaps: index.bitmap_buckets(field).map(|b| b.len()).unwrap_or(0),
            }
        })
        .collect();

    let bitmap_bytes = index
        .bitmap
        .as_ref()
        .map(|b| {
            IndexedField::ALL
                .iter()
                .flat_map(|&f| b.field(f).values())
                .chain(b.file_chunks_by_id.iter().flatten())
                .map(|bitmap| bitmap.serialized_size())
                .sum()
        })
        .unwrap_or(0);

    FilterIndexStats {
        files: index.file_count(),
        chunks: chunks.len(),
        chargram_n: index.file_chargram_n,
        chargrams: index.file_chargrams.len(),
        fields,
        bitmaps: index.bitmap.as_ref().map(|b| b.len()).unwrap_or(0),
        bitmap_bytes,
        json_bytes: serialize_filter_index_json(index).map(|s| s.len()).unwrap_or(0),
    }
}

impl fmt::Display for FilterIndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Filter Index Statistics")?;
        writeln!(f, "=======================")?;
        writeln!(f)?;
        writeln!(f, "Files:            {}", self.files)?;
        writeln!(f, "Chunks:           {}", self.chunks)?;
        writeln!(f, "Char-gram n:      {}", self.chargram_n)?;
        writeln!(f, "Char-grams:       {}", self.chargrams)?;
        writeln!(f)?;
        writeln!(f, "Buckets by field:")?;
        for field in &self.fields {
            match field.buckets {
                Some(count) => writeln!(
                    f,
                    "  {:15} {:>8} values  largest {:>8}  bitmaps {:>6}",
                    field.field, count, field.largest, field.bitmaps
                )?,
                None => writeln!(f, "  {:15} missing", field.field)?,
            }
        }
        writeln!(f)?;
        writeln!(f, "Bitmaps:          {} ({})", self.bitmaps, format_size(self.bitmap_bytes as u64))?;
        write!(f, "Serialized size:  {}", format_size(self.json_bytes as u64))
    }
}

/// Format byte size to human readable
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use crate::index::bitmap::{PlainBackend, RoaringBackend};
    use crate::index::build::build_filter_index_for_corpus;
    use crate::index::types::FilterIndexConfig;
    use serde_json::json;

    fn corpus(n: u32) -> Corpus {
        let chunks: Vec<_> = (0..n)
            .map(|i| json!({"id": i, "file": format!("src/f{}.js", i % 4), "kind": "Function"}))
            .collect();
        Corpus::from_json(&json!(chunks))
    }

    #[test]
    fn test_summary_counts() {
        let index = build_filter_index_for_corpus(&corpus(10), &FilterIndexConfig::default(), &PlainBackend);
        let stats = summarize_filter_index(&index);

        assert_eq!(stats.files, 4);
        assert_eq!(stats.chunks, 10);
        assert_eq!(stats.bitmaps, 0);
        assert!(stats.json_bytes > 0);

        let kind = stats.fields.iter().find(|f| f.field == "byKind").unwrap();
        assert_eq!(kind.buckets, Some(1));
        assert_eq!(kind.largest, 10);
    }

    #[test]
    fn test_summary_bitmaps() {
        let config = FilterIndexConfig {
            bitmap_min_size: 5,
            ..Default::default()
        };
        let index = build_filter_index_for_corpus(&corpus(10), &config, &RoaringBackend);
        let stats = summarize_filter_index(&index);

        // byExt, byLang and byKind each hold one bucket of 10
        assert_eq!(stats.bitmaps, 3);
        assert!(stats.bitmap_bytes > 0);
    }

    #[test]
    fn test_missing_lang_reported() {
        let mut index = build_filter_index_for_corpus(&corpus(2), &FilterIndexConfig::default(), &PlainBackend);
        index.by_lang = None;
        let stats = summarize_filter_index(&index);
        let lang = stats.fields.iter().find(|f| f.field == "byLang").unwrap();
        assert_eq!(lang.buckets, None);
        assert!(stats.to_string().contains("missing"));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
