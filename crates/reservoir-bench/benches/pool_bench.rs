//! Handle pool benchmarks: check-out/release round trips, alone and contended.

use std::sync::{Arc, Barrier};
use std::thread;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use reservoir_bench::NoopFactory;
use reservoir_core::config::PoolConfig;
use reservoir_storage::HandlePool;

const ROUNDS_PER_THREAD: u64 = 1_000;

fn check_out_release_benchmark(c: &mut Criterion) {
    let pool = HandlePool::new(NoopFactory, &PoolConfig::default());
    // Warm the free list so the loop measures reuse, not creation.
    pool.check_out(0).unwrap().release();

    c.bench_function("pool_check_out_release", |b| {
        b.iter(|| {
            let handle = pool.check_out(std::hint::black_box(0)).unwrap();
            handle.release();
        });
    });
}

fn contended_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_contended");
    for threads in [2usize, 4, 8] {
        group.throughput(Throughput::Elements(threads as u64 * ROUNDS_PER_THREAD));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let pool = Arc::new(HandlePool::new(NoopFactory, &PoolConfig::default()));
            b.iter(|| {
                let barrier = Arc::new(Barrier::new(threads));
                let workers: Vec<_> = (0..threads)
                    .map(|_| {
                        let pool = Arc::clone(&pool);
                        let barrier = Arc::clone(&barrier);
                        thread::spawn(move || {
                            barrier.wait();
                            for _ in 0..ROUNDS_PER_THREAD {
                                pool.check_out(0).unwrap().release();
                            }
                        })
                    })
                    .collect();
                for worker in workers {
                    worker.join().unwrap();
                }
            });
        });
    }
    group.finish();
}

fn drain_benchmark(c: &mut Criterion) {
    c.bench_function("pool_refill_and_drain_32", |b| {
        let pool = HandlePool::new(NoopFactory, &PoolConfig::default());
        b.iter(|| {
            pool.unblockade();
            let held: Vec<_> = (0..32).map(|_| pool.check_out(0).unwrap()).collect();
            drop(held);
            pool.drain(|| {});
        });
    });
}

criterion_group!(benches, check_out_release_benchmark, contended_benchmark, drain_benchmark);
criterion_main!(benches);
