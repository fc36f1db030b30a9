//! Shared corpora for integration tests

use chunkfilter::corpus::{ChunkRecord, Corpus};
use chunkfilter::query::{CompiledFilters, Filters, NullSink};
use serde_json::{json, Value};

/// The three-chunk ext/author corpus
pub fn small_corpus() -> Corpus {
    Corpus::from_json(&json!([
        {"id": 0, "file": "src/a.py", "ext": ".py", "last_author": "Bob"},
        {"id": 1, "file": "src/b.js", "ext": ".js", "last_author": "Alice"},
        {"id": 2, "file": "src/c.py", "ext": ".py", "last_author": "Alice"}
    ]))
}

/// Mixed corpus large enough for bitmap mirrors at a low threshold
pub fn mixed_corpus(n: u32) -> Corpus {
    let langs = ["typescript", "python", "rust"];
    let exts = [".ts", ".py", ".rs"];
    let kinds = ["Function", "Class", "Method", "Interface"];
    let authors = ["Alice", "Bob", "Carol", "Dan", "Eve"];

    let chunks: Vec<Value> = (0..n)
        .map(|i| {
            let l = (i % 3) as usize;
            json!({
                "id": i,
                "file": format!("src/mod{}/file{}{}", i % 7, i % 11, exts[l]),
                "lang": langs[l],
                "kind": kinds[(i % 4) as usize],
                "last_author": authors[(i % 5) as usize],
                "chunk_authors": [authors[(i % 5) as usize], authors[((i + 2) % 5) as usize]],
                "docmeta": {
                    "signature": format!("fn item{}(x: u32)", i),
                    "modifiers": {"visibility": if i % 2 == 0 { "public" } else { "private" }}
                }
            })
        })
        .collect();
    Corpus::from_json(&Value::Array(chunks))
}

pub fn compile(value: Value) -> CompiledFilters {
    CompiledFilters::compile(&Filters::from_json(&value), &mut NullSink)
}

pub fn ids(chunks: &[&ChunkRecord]) -> Vec<u32> {
    chunks.iter().map(|c| c.id).collect()
}
