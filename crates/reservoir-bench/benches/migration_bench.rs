//! Migration benchmarks: moving a seeded table at several batch sizes.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use reservoir_bench::seed_migration_tables;
use reservoir_core::config::ReservoirConfig;
use reservoir_core::MigrationInfo;
use reservoir_storage::{Database, Migrator};

const ROWS: usize = 2_000;

fn migrate_table_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("migrate_table");
    group.sample_size(10);
    group.throughput(Throughput::Elements(ROWS as u64));

    for batch_size in [16usize, 64, 256] {
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| {
                b.iter_batched(
                    || {
                        let dir = tempfile::tempdir().unwrap();
                        let path = dir.path().join("bench.db");
                        seed_migration_tables(&path, "items_old", "items", ROWS).unwrap();
                        let mut config = ReservoirConfig::default();
                        config.migration.batch_size = batch_size;
                        let db = Database::open(&path, config).unwrap();
                        (dir, db)
                    },
                    |(_dir, db)| {
                        let mut migrator =
                            Migrator::with_infos([MigrationInfo::new("items", "items_old")]);
                        migrator.run_to_completion(db.pool()).unwrap()
                    },
                    BatchSize::PerIteration,
                );
            },
        );
    }
    group.finish();
}

criterion_group!(benches, migrate_table_benchmark);
criterion_main!(benches);
