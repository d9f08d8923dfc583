//! Benchmarks for store operations
//!
//! Run with: cargo bench --bench store_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kvstore::prelude::*;
use std::thread;
use tempfile::TempDir;

fn open_store(capacity: usize) -> (Arc<Store<String, u64>>, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let db = KvDb::open(temp_dir.path().join("bench.db")).unwrap();
    let store = db
        .store_with_config(StoreConfig::new("bench").with_watch_capacity(capacity), JsonCodec)
        .unwrap();
    (Arc::new(store), temp_dir)
}

fn bench_set_get(c: &mut Criterion) {
    let (store, _temp) = open_store(100);
    let mut group = c.benchmark_group("single_key");

    let mut i = 0u64;
    group.bench_function("set", |b| {
        b.iter(|| {
            i += 1;
            store.set(format!("key_{}", i % 1000), black_box(i)).unwrap();
        })
    });

    group.bench_function("get", |b| {
        b.iter(|| black_box(store.get("key_1").unwrap()))
    });

    group.bench_function("has_missing", |b| {
        b.iter(|| black_box(store.has("missing").unwrap()))
    });

    group.finish();
}

fn bench_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("for_each");

    for size in [100u64, 1_000, 10_000].iter() {
        let (store, _temp) = open_store(100);
        store
            .run_transaction(|tx| {
                for i in 0..*size {
                    tx.set(format!("key_{:06}", i), i)?;
                }
                Ok(())
            })
            .unwrap();

        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut sum = 0u64;
                store
                    .for_each(Direction::Forward, |_, v| {
                        sum += v;
                        Ok(ControlFlow::Continue(()))
                    })
                    .unwrap();
                black_box(sum)
            })
        });
    }

    group.finish();
}

fn bench_watch_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_with_watchers");

    for watchers in [0usize, 1, 8].iter() {
        let (store, _temp) = open_store(1024);
        let (cancels, drains): (Vec<_>, Vec<_>) = (0..*watchers)
            .map(|_| {
                let (events, cancel) = store.watch_prefix("key_");
                let drain = thread::spawn(move || events.iter().count());
                (cancel, drain)
            })
            .unzip();

        group.bench_with_input(BenchmarkId::from_parameter(watchers), watchers, |b, _| {
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                store.set(format!("key_{}", i % 100), i).unwrap();
            })
        });

        for cancel in cancels {
            cancel.cancel();
        }
        for drain in drains {
            drain.join().unwrap();
        }
    }

    group.finish();
}

fn bench_transactions(c: &mut Criterion) {
    let mut group = c.benchmark_group("transactions");

    for batch in [1u64, 10, 100].iter() {
        let (store, _temp) = open_store(100);
        group.throughput(Throughput::Elements(*batch));
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &batch| {
            b.iter(|| {
                store
                    .run_transaction(|tx| {
                        for i in 0..batch {
                            tx.update(format!("key_{}", i).as_str(), |v| Ok(v.unwrap_or(0) + 1))?;
                        }
                        Ok(())
                    })
                    .unwrap();
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_set_get,
    bench_iteration,
    bench_watch_fan_out,
    bench_transactions
);
criterion_main!(benches);
