//! Engine benchmarks for DepotDB.
//!
//! Benchmarks for:
//! - Commit throughput, in memory and with a synced log
//! - Prefix scans
//! - Index lookups

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use depot_engine::{Engine, EngineConfig, KeyPrefix, ScanDirection, SyncPolicy};
use depot_schema::{Manifest, Record};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn open(config: EngineConfig) -> Engine {
    let manifest = Manifest::depot_catalog().expect("catalog");
    Engine::open_manifest(config, &manifest).expect("open")
}

fn rev(file: usize, rev: i32, change: i32) -> Record {
    Record::new()
        .with("depotFile", format!("//depot/main/dir{}/file{file}", file % 16))
        .with("depotRev", rev)
        .with("change", change)
        .with("action", "add")
}

fn load(engine: &Engine, files: usize) {
    let mut txn = engine.begin();
    for file in 0..files {
        txn.put("rev", rev(file, 1, file as i32)).expect("put");
    }
    txn.commit().expect("commit");
}

/// Benchmark single-row commits.
fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/commit");
    group.throughput(Throughput::Elements(1));

    group.bench_function("memory", |b| {
        let engine = open(EngineConfig::new());
        let mut change = 0;
        b.iter(|| {
            change += 1;
            let mut txn = engine.begin();
            txn.put("rev", rev(change as usize, 1, change)).expect("put");
            black_box(txn.commit().expect("commit"))
        });
    });

    group.bench_function("log_unsynced", |b| {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let engine = open(EngineConfig::durable(dir.path()).with_sync_mode(SyncPolicy::Never));
        let mut change = 0;
        b.iter(|| {
            change += 1;
            let mut txn = engine.begin();
            txn.put("rev", rev(change as usize, 1, change)).expect("put");
            black_box(txn.commit().expect("commit"))
        });
    });

    group.finish();
}

/// Benchmark prefix scans over tables of varying size.
fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/scan");

    for size in [1_000, 10_000].iter() {
        let engine = open(EngineConfig::new());
        load(&engine, *size);
        group.throughput(Throughput::Elements(*size as u64 / 16));
        group.bench_with_input(BenchmarkId::new("directory", size), size, |b, _| {
            b.iter(|| {
                let mut txn = engine.begin();
                let count = txn
                    .scan("rev", KeyPrefix::partial("//depot/main/dir3/"), ScanDirection::Forward)
                    .expect("scan")
                    .count();
                black_box(count)
            });
        });
    }

    group.finish();
}

/// Benchmark random index lookups.
fn bench_index_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/index");
    let engine = open(EngineConfig::new());
    load(&engine, 10_000);
    let mut rng = StdRng::seed_from_u64(42);

    group.bench_function("by_change", |b| {
        b.iter(|| {
            let change: i32 = rng.gen_range(0..10_000);
            let mut txn = engine.begin();
            black_box(
                txn.index_lookup("rev", "by_change", KeyPrefix::new([change]))
                    .expect("lookup"),
            )
        });
    });

    group.finish();
}

criterion_group!(benches, bench_commit, bench_scan, bench_index_lookup);
criterion_main!(benches);
