/*!
 * Benchmarks for placeholder extraction.
 *
 * Measures the extractor over plain, ICU-heavy and mixed catalog texts, and
 * a full memory build over a generated catalog.
 */

use std::collections::BTreeMap;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::{Map, Value};

use i18n_translator::catalog::Catalog;
use i18n_translator::translation::memory::MemoryArtifact;
use i18n_translator::translation::placeholders::PlaceholderExtractor;

const SAMPLES: &[(&str, &str)] = &[
    ("plain", "Your changes have been saved."),
    ("mustache", "Welcome back, {{name}}! You have {{count}} new messages."),
    ("printf", "Uploaded %d of %s files (%1$s)"),
    ("icu", "{count, plural, one {# item} other {# items}} in {cart}"),
    ("html", "Read the <b>terms</b> and <a href=\"{url}\">privacy policy</a>."),
];

fn generate_catalog(count: usize) -> Catalog {
    let mut map = Map::new();
    for i in 0..count {
        let (_, text) = SAMPLES[i % SAMPLES.len()];
        map.insert(format!("section{}.key{}", i / 50, i), Value::String(text.to_string()));
    }
    Catalog::from_flat_json(Value::Object(map))
}

fn bench_extract(c: &mut Criterion) {
    let extractor = PlaceholderExtractor::default();
    let mut group = c.benchmark_group("extract");
    for (name, text) in SAMPLES {
        group.bench_with_input(BenchmarkId::from_parameter(name), text, |b, text| {
            b.iter(|| extractor.extract(black_box(text)))
        });
    }
    group.finish();
}

fn bench_memory_build(c: &mut Criterion) {
    let extractor = PlaceholderExtractor::default();
    let mut group = c.benchmark_group("memory_build");
    for size in [100usize, 1_000] {
        let source = generate_catalog(size);
        let mut targets = BTreeMap::new();
        targets.insert("fr".to_string(), Catalog::new());
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &source, |b, source| {
            b.iter(|| MemoryArtifact::build("en", black_box(source), &targets, &extractor))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_extract, bench_memory_build);
criterion_main!(benches);
