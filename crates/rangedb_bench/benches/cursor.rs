//! Bounded cursor benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rangedb_bench::{populated, random_keys, TABLE};
use rangedb_core::{BoundConfig, CursorConfig};

const KEYS: i64 = 100_000;

/// Benchmark scans of windows of increasing width.
fn bench_bounded_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounded_scan");
    let db = populated(KEYS, 64, 128);
    let session = db.open_session();

    for width in [10i64, 100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*width as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), width, |b, &width| {
            let mut cursor = session.open_cursor(TABLE, CursorConfig::new()).unwrap();
            let lower = KEYS / 2;
            cursor.set_key(lower);
            cursor.bound(BoundConfig::lower()).unwrap();
            cursor.set_key(lower + width - 1);
            cursor.bound(BoundConfig::upper()).unwrap();

            b.iter(|| {
                cursor.reset();
                let mut seen = 0;
                while cursor.next().is_ok() {
                    seen += 1;
                }
                black_box(seen)
            });
        });
    }
    group.finish();
}

/// Benchmark reverse scans ending at a lower bound.
fn bench_bounded_reverse_scan(c: &mut Criterion) {
    let db = populated(KEYS, 64, 128);
    let session = db.open_session();
    let mut cursor = session.open_cursor(TABLE, CursorConfig::new()).unwrap();
    cursor.set_key(KEYS - 1_000);
    cursor.bound(BoundConfig::lower()).unwrap();

    c.bench_function("bounded_reverse_scan_1000", |b| {
        b.iter(|| {
            cursor.reset();
            let mut seen = 0;
            while cursor.prev().is_ok() {
                seen += 1;
            }
            black_box(seen)
        });
    });
}

/// Benchmark search_near with lookups inside and outside the bounds.
fn bench_search_near(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_near");
    let db = populated(KEYS, 64, 128);
    let session = db.open_session();
    let targets = random_keys(1_000, KEYS);

    for bounded in [false, true].iter() {
        let name = if *bounded { "bounded" } else { "unbounded" };
        group.bench_with_input(BenchmarkId::from_parameter(name), bounded, |b, &bounded| {
            let mut cursor = session.open_cursor(TABLE, CursorConfig::new()).unwrap();
            if bounded {
                cursor.set_key(KEYS / 4);
                cursor.bound(BoundConfig::lower()).unwrap();
                cursor.set_key(KEYS / 2);
                cursor.bound(BoundConfig::upper().inclusive(false)).unwrap();
            }
            let mut i = 0;
            b.iter(|| {
                cursor.set_key(targets[i % targets.len()]);
                i += 1;
                black_box(cursor.search_near().unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_bounded_scan,
    bench_bounded_reverse_scan,
    bench_search_near,
);
criterion_main!(benches);
