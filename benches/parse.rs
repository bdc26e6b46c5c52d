//! Parsing benchmarks
//!
//! Compares jparse sessions (system and counting allocators) against
//! `serde_json::Value` on the same documents.
//!
//! Run with: cargo bench --bench parse

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use jparse::{CountingAllocator, Session, SystemAllocator};

// ============================================================================
// Inputs
// ============================================================================

fn flat_numbers(n: usize) -> String {
    let items: Vec<String> = (0..n)
        .map(|i| if i % 2 == 0 { i.to_string() } else { format!("{}.5", i) })
        .collect();
    format!("[{}]", items.join(","))
}

fn records(n: usize) -> String {
    let items: Vec<String> = (0..n)
        .map(|i| {
            format!(
                r#"{{"id": {}, "name": "useré{}", "active": {}, "score": {}.25, "tags": ["a", "b\n", null]}}"#,
                i,
                i,
                i % 3 == 0,
                i
            )
        })
        .collect();
    format!("[{}]", items.join(",\n"))
}

fn nested(depth: usize) -> String {
    let mut s = String::new();
    for _ in 0..depth {
        s.push_str(r#"{"k": ["#);
    }
    s.push('0');
    for _ in 0..depth {
        s.push_str("]}");
    }
    s
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_documents(c: &mut Criterion) {
    let inputs = [
        ("flat_numbers", flat_numbers(10_000)),
        ("records", records(1_000)),
        ("nested", nested(60)),
    ];

    let mut group = c.benchmark_group("parse");
    for (name, input) in &inputs {
        group.throughput(Throughput::Bytes(input.len() as u64));

        group.bench_with_input(BenchmarkId::new("jparse", name), input, |b, input| {
            let session = Session::new(SystemAllocator);
            b.iter(|| {
                let doc = session.parse(black_box(input)).unwrap();
                black_box(doc.value_type());
            })
        });

        group.bench_with_input(
            BenchmarkId::new("jparse_counting", name),
            input,
            |b, input| {
                let session = Session::new(CountingAllocator::new());
                b.iter(|| {
                    let doc = session.parse(black_box(input)).unwrap();
                    black_box(doc.value_type());
                })
            },
        );

        group.bench_with_input(BenchmarkId::new("serde_json", name), input, |b, input| {
            b.iter(|| {
                let value: serde_json::Value = serde_json::from_str(black_box(input)).unwrap();
                black_box(value.is_array());
            })
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let fields: Vec<String> = (0..256).map(|i| format!(r#""field{}": {}"#, i, i)).collect();
    let input = format!("{{{}}}", fields.join(", "));
    let session = Session::new(SystemAllocator);
    let doc = session.parse(&input).unwrap();

    c.bench_function("object_get_256", |b| {
        b.iter(|| {
            for i in (0..256).step_by(17) {
                let key = format!("field{}", i);
                black_box(doc.object_get(black_box(&key)).unwrap());
            }
        })
    });
}

criterion_group!(benches, bench_documents, bench_lookup);
criterion_main!(benches);
