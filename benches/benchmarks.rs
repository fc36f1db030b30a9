//! Performance benchmarks for chunkfilter
//!
//! Run with: cargo bench

use chunkfilter::corpus::Corpus;
use chunkfilter::index::{
    build_filter_index_for_corpus, hydrate_filter_index, serialize_filter_index, BitmapBackend, FilterIndexConfig,
    PlainBackend, RoaringBackend,
};
use chunkfilter::query::{CompiledFilters, FilterExecutor, Filters, NullSink};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};

/// Synthetic corpus spread over a few hundred files
fn create_benchmark_corpus(n: u32) -> Corpus {
    let langs = ["typescript", "python", "rust", "go"];
    let exts = [".ts", ".py", ".rs", ".go"];
    let kinds = ["Function", "Class", "Method", "Interface", "Enum"];
    let authors = ["alice", "bob", "carol", "dan", "eve", "frank"];

    let chunks: Vec<Value> = (0..n)
        .map(|i| {
            let l = (i % 4) as usize;
            json!({
                "id": i,
                "file": format!("src/pkg{}/module{}{}", i % 37, i % 311, exts[l]),
                "lang": langs[l],
                "kind": kinds[(i % 5) as usize],
                "last_author": authors[(i % 6) as usize],
                "docmeta": {"signature": format!("item{}(a, b)", i)}
            })
        })
        .collect();
    Corpus::from_json(&Value::Array(chunks))
}

fn bench_index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");
    for size in [1_000u32, 20_000] {
        let corpus = create_benchmark_corpus(size);
        for (name, backend) in [("roaring", &RoaringBackend as &dyn BitmapBackend), ("plain", &PlainBackend)] {
            group.bench_with_input(BenchmarkId::new(name, size), &corpus, |b, corpus| {
                b.iter(|| build_filter_index_for_corpus(black_box(corpus), &FilterIndexConfig::default(), backend))
            });
        }
    }
    group.finish();
}

fn bench_filter(c: &mut Criterion) {
    let corpus = create_benchmark_corpus(20_000);
    let requests = vec![
        ("ext", json!({"ext": ".ts"})),
        ("ext_author", json!({"ext": ".py", "author": "alice"})),
        ("file_substring", json!({"file": "pkg12/"})),
        ("file_regex", json!({"file": "/module1\\d\\.rs$/"})),
        ("signature_scan", json!({"signature": "item99"})),
    ];

    let mut group = c.benchmark_group("filter");
    for (name, backend) in [("roaring", &RoaringBackend as &dyn BitmapBackend), ("plain", &PlainBackend)] {
        let index = build_filter_index_for_corpus(&corpus, &FilterIndexConfig::default(), backend);
        for (label, request) in &requests {
            let filters = CompiledFilters::compile(&Filters::from_json(request), &mut NullSink);
            group.bench_function(BenchmarkId::new(name, label), |b| {
                let executor = FilterExecutor::new(&corpus).with_index(Some(&index)).with_backend(backend);
                b.iter(|| executor.filter_chunks(black_box(&filters), &mut NullSink))
            });
        }
    }
    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let request = Filters::from_json(&json!({
        "ext": [".ts", ".tsx"],
        "file": ["/src\\/.*\\.test\\.ts$/i", "components"],
        "type": "function,method",
        "excludeTokens": ["todo", "fixme"]
    }));
    c.bench_function("compile_filters", |b| {
        b.iter(|| CompiledFilters::compile(black_box(&request), &mut NullSink))
    });
}

fn bench_serialize(c: &mut Criterion) {
    let corpus = create_benchmark_corpus(20_000);
    let index = build_filter_index_for_corpus(&corpus, &FilterIndexConfig::default(), &RoaringBackend);
    let value = serde_json::to_value(serialize_filter_index(&index)).unwrap_or(Value::Null);

    let mut group = c.benchmark_group("snapshot");
    group.bench_function("serialize", |b| b.iter(|| serialize_filter_index(black_box(&index))));
    group.bench_function("hydrate", |b| {
        b.iter(|| hydrate_filter_index(black_box(&value), &RoaringBackend, 256))
    });
    group.finish();
}

criterion_group!(benches, bench_index_build, bench_filter, bench_compile, bench_serialize);

criterion_main!(benches);
