// Sync and verify benchmarks

use criterion::async_executor::AsyncExecutor;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use shadowsync::repository::RepositorySource;
use shadowsync::sync::Synchronizer;
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;

mod common;

struct TokioExecutor(Runtime);

impl AsyncExecutor for TokioExecutor {
    fn block_on<T>(&self, future: impl std::future::Future<Output = T>) -> T {
        self.0.block_on(future)
    }
}

fn bench_initial_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_initial");
    for dirs in [100, 1_000] {
        let repo: Arc<dyn RepositorySource> = Arc::new(common::generate_repo(dirs, 10, 3));

        group.bench_with_input(BenchmarkId::new("dirs", dirs), &repo, |b, repo| {
            b.to_async(TokioExecutor(Runtime::new().unwrap())).iter(|| {
                let repo = repo.clone();
                async move {
                    let db = common::setup_bench_db().await;
                    let summary = Synchronizer::new(repo, &db, common::bench_config())
                        .sync()
                        .await
                        .unwrap();
                    black_box(summary)
                }
            });
        });
    }
    group.finish();
}

fn bench_incremental_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_incremental");
    let rt = Runtime::new().unwrap();
    for dirs in [100, 1_000] {
        let base = common::generate_repo(dirs, 10, 3);
        let mut changed = base.clone();
        common::add_changed_snapshot(&mut changed);
        let base: Arc<dyn RepositorySource> = Arc::new(base);
        let changed: Arc<dyn RepositorySource> = Arc::new(changed);

        // Each iteration starts from a database holding the base repository
        group.bench_with_input(BenchmarkId::new("one_new_snapshot", dirs), &dirs, |b, _| {
            b.to_async(TokioExecutor(Runtime::new().unwrap())).iter(|| {
                let base = base.clone();
                let changed = changed.clone();
                async move {
                    let db = common::setup_bench_db().await;
                    Synchronizer::new(base, &db, common::bench_config())
                        .sync()
                        .await
                        .unwrap();
                    let summary = Synchronizer::new(changed, &db, common::bench_config())
                        .sync()
                        .await
                        .unwrap();
                    black_box(summary)
                }
            });
        });

        let db = rt.block_on(common::setup_bench_db());
        rt.block_on(Synchronizer::new(base.clone(), &db, common::bench_config()).sync())
            .unwrap();
        group.bench_with_input(BenchmarkId::new("noop", dirs), &dirs, |b, _| {
            b.iter(|| {
                let summary = rt
                    .block_on(Synchronizer::new(base.clone(), &db, common::bench_config()).sync())
                    .unwrap();
                black_box(summary)
            });
        });
    }
    group.finish();
}

fn bench_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify");
    let rt = Runtime::new().unwrap();
    for dirs in [100, 1_000] {
        let repo: Arc<dyn RepositorySource> = Arc::new(common::generate_repo(dirs, 10, 3));
        let db = rt.block_on(common::setup_bench_db());
        rt.block_on(Synchronizer::new(repo.clone(), &db, common::bench_config()).sync())
            .unwrap();

        group.bench_with_input(BenchmarkId::new("dirs", dirs), &repo, |b, repo| {
            b.iter(|| {
                let report = rt
                    .block_on(Synchronizer::new(repo.clone(), &db, common::bench_config()).verify())
                    .unwrap();
                black_box(report)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_initial_sync, bench_incremental_sync, bench_verify);
criterion_main!(benches);
