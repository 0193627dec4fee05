//! Range truncate benchmarks.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rangedb_bench::{populated, TABLE};
use rangedb_core::{BeginConfig, CursorConfig, Database, RollbackConfig, Session};

const KEYS: i64 = 20_000;

fn truncate_range(session: &Session, lower: i64, upper: i64) {
    let mut start = session.open_cursor(TABLE, CursorConfig::new()).unwrap();
    let mut stop = session.open_cursor(TABLE, CursorConfig::new()).unwrap();
    start.set_key(lower);
    stop.set_key(upper);
    session.truncate(None, Some(&start), Some(&stop)).unwrap();
}

/// Benchmark committed truncates of half the table with different leaf
/// sizes; larger leaves leave fewer whole pages to delete at once.
fn bench_truncate_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("truncate_commit");
    group.sample_size(10);

    for leaf in [16usize, 128, 1_024].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(leaf), leaf, |b, &leaf| {
            b.iter_batched(
                || populated(KEYS, 32, leaf),
                |db: Database| {
                    let session = db.open_session();
                    truncate_range(&session, KEYS / 4, KEYS * 3 / 4);
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

/// Benchmark truncate followed by rollback, which restores every record.
fn bench_truncate_rollback(c: &mut Criterion) {
    let db = populated(KEYS, 32, 128);
    let session = db.open_session();

    c.bench_function("truncate_rollback", |b| {
        b.iter(|| {
            session.begin_transaction(&BeginConfig::new()).unwrap();
            truncate_range(&session, KEYS / 4, KEYS * 3 / 4);
            session.rollback_transaction(&RollbackConfig::new()).unwrap();
        });
    });
}

criterion_group!(benches, bench_truncate_commit, bench_truncate_rollback);
criterion_main!(benches);
