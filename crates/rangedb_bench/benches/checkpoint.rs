//! Checkpoint benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rangedb_bench::populated;
use rangedb_core::checkpoint::{decode, encode};
use rangedb_core::{CheckpointConfig, Database};
use tempfile::TempDir;

/// Benchmark in-memory checkpoints of tables of increasing size.
fn bench_checkpoint_capture(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkpoint_capture");
    group.sample_size(20);

    for count in [1_000i64, 10_000, 50_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let db = populated(count, 64, 128);
            let session = db.open_session();
            b.iter(|| black_box(session.checkpoint(&CheckpointConfig::new()).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark encoding and decoding of a checkpoint image.
fn bench_image_codec(c: &mut Criterion) {
    let db = populated(10_000, 64, 128);
    db.checkpoint(&CheckpointConfig::new().name("codec")).unwrap();
    let image = db.checkpoint_image("codec").unwrap();
    let data = encode(&image).unwrap();

    let mut group = c.benchmark_group("image_codec");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("encode", |b| b.iter(|| black_box(encode(&image).unwrap())));
    group.bench_function("decode", |b| b.iter(|| black_box(decode(&data).unwrap())));
    group.finish();
}

/// Benchmark checkpoints written to a home directory, with and without sync.
fn bench_checkpoint_to_disk(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkpoint_to_disk");
    group.sample_size(10);

    for sync in [false, true].iter() {
        let name = if *sync { "sync" } else { "nosync" };
        group.bench_with_input(BenchmarkId::from_parameter(name), sync, |b, &sync| {
            let home = TempDir::new().unwrap();
            let config = rangedb_core::DatabaseConfig::new().sync_checkpoints(sync);
            let db = Database::open_with_config(home.path(), config).unwrap();
            let session = db.open_session();
            session
                .create("table:disk", "key_format=q,value_format=S".parse().unwrap())
                .unwrap();
            let mut cursor = session
                .open_cursor("table:disk", rangedb_core::CursorConfig::new())
                .unwrap();
            for k in 0..5_000i64 {
                cursor.set_key(k);
                cursor.set_value("value");
                cursor.insert().unwrap();
            }
            drop(cursor);
            b.iter(|| black_box(session.checkpoint(&CheckpointConfig::new()).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_checkpoint_capture,
    bench_image_codec,
    bench_checkpoint_to_disk,
);
criterion_main!(benches);
