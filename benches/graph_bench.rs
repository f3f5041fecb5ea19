// Repository graph builder benchmarks

use criterion::async_executor::AsyncExecutor;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rustc_hash::FxHashMap;
use shadowsync::model::{DirEntry, IntId};
use shadowsync::repository::scanner::{GraphScanner, resolve_paths};
use shadowsync::sync::RunContext;
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

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_scan");
    for dirs in [100, 1_000, 5_000] {
        let repo = Arc::new(common::generate_repo(dirs, 10, 3));

        group.bench_with_input(BenchmarkId::new("dirs", dirs), &repo, |b, repo| {
            b.to_async(TokioExecutor(Runtime::new().unwrap())).iter(|| {
                let repo = repo.clone();
                async move {
                    let ctx = RunContext::new(common::bench_config());
                    black_box(GraphScanner::new(&ctx).scan(repo).await.unwrap())
                }
            });
        });
    }
    group.finish();
}

fn bench_tree_workers(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_tree_workers");
    let repo = Arc::new(common::generate_repo(2_000, 5, 1));
    for workers in [1, 4, 16] {
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, &workers| {
            b.to_async(TokioExecutor(Runtime::new().unwrap())).iter(|| {
                let repo = repo.clone();
                async move {
                    let config = shadowsync::SyncConfig {
                        tree_workers: Some(workers),
                        ..common::bench_config()
                    };
                    let ctx = RunContext::new(config);
                    black_box(GraphScanner::new(&ctx).scan(repo).await.unwrap())
                }
            });
        });
    }
    group.finish();
}

fn bench_resolve_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_resolve_paths");
    let rt = Runtime::new().unwrap();
    for dirs in [1_000, 10_000] {
        let repo = Arc::new(common::generate_repo(dirs, 1, 1));
        let ctx = RunContext::new(common::bench_config());
        let graph = rt.block_on(GraphScanner::new(&ctx).scan(repo)).unwrap();
        let directories: FxHashMap<IntId, Vec<DirEntry>> = graph.directories.clone();
        let roots = graph.roots();

        group.bench_with_input(BenchmarkId::new("dirs", dirs), &directories, |b, directories| {
            b.iter(|| black_box(resolve_paths(directories, &roots)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scan, bench_tree_workers, bench_resolve_paths);
criterion_main!(benches);
