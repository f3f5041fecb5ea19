// Repository graph builder tests
// Drives GraphScanner directly against in-memory repositories

mod common;

use shadowsync::SyncError;
use shadowsync::model::{ContentId, IntId, RepositoryGraph};
use shadowsync::repository::MemoryRepository;
use shadowsync::repository::scanner::GraphScanner;
use shadowsync::repository::wire::NodeDoc;
use shadowsync::sync::RunContext;
use std::sync::Arc;
use time::Duration;
use time::macros::datetime;

use common::test_config;

async fn scan(repo: &MemoryRepository) -> Result<(RepositoryGraph, RunContext), SyncError> {
    let ctx = RunContext::new(test_config());
    let graph = GraphScanner::new(&ctx).scan(Arc::new(repo.clone())).await?;
    Ok((graph, ctx))
}

fn int(ctx: &RunContext, id: &ContentId) -> IntId {
    ctx.registry.get(id).unwrap()
}

#[tokio::test]
async fn test_snapshots_sorted_by_time() {
    let fixture = common::single_file_repo();
    let mut repo = fixture.repo;
    let t = datetime!(2023-06-01 12:00 UTC);
    let late = repo.add_snapshot_at("b", &["/"], fixture.root, t + Duration::hours(2));
    let tie_first = repo.add_snapshot_at("c", &["/"], fixture.root, t);
    let tie_second = repo.add_snapshot_at("d", &["/"], fixture.root, t);

    let (graph, _ctx) = scan(&repo).await.unwrap();
    let order: Vec<ContentId> = graph.snapshots.iter().map(|s| s.id).collect();
    // Equal times keep listing order; the fixture snapshot is dated 2024
    assert_eq!(order, vec![tie_first, tie_second, late, fixture.snapshot]);
}

#[tokio::test]
async fn test_paths_follow_tree_shape() {
    let fixture = common::home_repo();
    let (graph, ctx) = scan(&fixture.repo).await.unwrap();

    let path = |id: &ContentId| graph.paths.get(&int(&ctx, id)).cloned();
    assert_eq!(path(&fixture.root).as_deref(), Some("/"));
    assert_eq!(path(&fixture.home).as_deref(), Some("/home"));
    assert_eq!(path(&fixture.user).as_deref(), Some("/home/user"));
    assert_eq!(path(&fixture.etc).as_deref(), Some("/etc"));
    assert_eq!(graph.paths.len(), 4);
}

#[tokio::test]
async fn test_shared_subtree_keeps_first_path() {
    let mut repo = MemoryRepository::new();
    let leaf = repo.add_data(b"leaf");
    let shared = repo
        .add_tree(vec![NodeDoc::file("leaf", 4, vec![leaf])])
        .unwrap();
    let deep = repo.add_tree(vec![NodeDoc::dir("shared", shared)]).unwrap();
    let root = repo
        .add_tree(vec![
            NodeDoc::dir("a", deep),
            NodeDoc::dir("b", shared),
        ])
        .unwrap();
    repo.add_snapshot("host", &["/"], root);

    let (graph, ctx) = scan(&repo).await.unwrap();
    // Breadth-first: /b is one level up from /a/shared
    assert_eq!(graph.paths[&int(&ctx, &shared)], "/b");
    assert_eq!(graph.paths[&int(&ctx, &deep)], "/a");
}

#[tokio::test]
async fn test_closure_excludes_empty_tree() {
    let mut repo = MemoryRepository::new();
    let data = repo.add_data(b"x");
    let root = repo
        .add_tree(vec![
            NodeDoc::file("x", 1, vec![data]),
            NodeDoc::dir("empty", ContentId::empty_tree()),
        ])
        .unwrap();
    let snapshot = repo.add_snapshot("host", &["/"], root);
    let empty_snapshot = repo.add_snapshot("host", &["/"], ContentId::empty_tree());

    let (graph, ctx) = scan(&repo).await.unwrap();
    let closure = &graph.closure[&snapshot];
    assert_eq!(closure.len(), 1);
    assert!(closure.contains(&int(&ctx, &root)));
    assert!(graph.closure[&empty_snapshot].is_empty());
    assert!(!graph.blobs.contains_key(&IntId::EMPTY_TREE));
    assert!(graph.directories[&IntId::EMPTY_TREE].is_empty());
}

#[tokio::test]
async fn test_hash_mismatch_is_repository_corruption() {
    let mut fixture = common::home_repo();
    fixture.repo.corrupt_tree(&fixture.user, b"{\"nodes\":[]}\n");

    let err = scan(&fixture.repo).await.unwrap_err();
    assert!(matches!(err, SyncError::RepositoryCorruption(ref m) if m.contains("hash")), "{err}");
}

#[tokio::test]
async fn test_malformed_tree_is_repository_corruption() {
    let mut repo = MemoryRepository::new();
    let bad = repo.add_raw_tree(b"{\"nodes\": 7}");
    repo.add_snapshot("host", &["/"], bad);

    let err = scan(&repo).await.unwrap_err();
    assert!(matches!(err, SyncError::RepositoryCorruption(ref m) if m.contains("malformed")), "{err}");
}

#[tokio::test]
async fn test_duplicate_entry_name_is_repository_corruption() {
    let mut repo = MemoryRepository::new();
    let data = repo.add_data(b"twice");
    let root = repo
        .add_tree(vec![
            NodeDoc::file("same", 5, vec![data]),
            NodeDoc::file("same", 5, vec![data]),
        ])
        .unwrap();
    repo.add_snapshot("host", &["/"], root);

    let err = scan(&repo).await.unwrap_err();
    assert!(matches!(err, SyncError::RepositoryCorruption(ref m) if m.contains("twice")), "{err}");
}

#[tokio::test]
async fn test_missing_root_is_repository_corruption() {
    let mut fixture = common::single_file_repo();
    fixture.repo.forget_blob(&fixture.root);

    let err = scan(&fixture.repo).await.unwrap_err();
    assert!(matches!(err, SyncError::RepositoryCorruption(ref m) if m.contains("roots missing")), "{err}");
}

#[tokio::test]
async fn test_unindexed_content_is_repository_corruption() {
    let mut fixture = common::single_file_repo();
    fixture.repo.forget_blob(&fixture.blob);

    let err = scan(&fixture.repo).await.unwrap_err();
    assert!(matches!(err, SyncError::RepositoryCorruption(ref m) if m.contains("a.txt")), "{err}");
}

/// Chain of `depth` nested directories, each holding one file
fn deep_repo(depth: usize) -> (MemoryRepository, Vec<ContentId>) {
    let mut repo = MemoryRepository::new();
    let mut trees = Vec::with_capacity(depth);
    let mut child: Option<ContentId> = None;
    for level in 0..depth {
        let data = repo.add_data(format!("level {level}").as_bytes());
        let mut nodes = vec![NodeDoc::file("file", 8, vec![data])];
        if let Some(sub) = child {
            nodes.push(NodeDoc::dir(&format!("d{level}"), sub));
        }
        let tree = repo.add_tree(nodes).unwrap();
        trees.push(tree);
        child = Some(tree);
    }
    repo.add_snapshot("host", &["/"], trees[depth - 1]);
    (repo, trees)
}

#[tokio::test]
async fn test_single_worker_loads_every_tree() {
    let (repo, trees) = deep_repo(60);
    let ctx = RunContext::new(shadowsync::SyncConfig {
        tree_workers: Some(1),
        queue_capacity: 1,
        ..test_config()
    });
    let graph = GraphScanner::new(&ctx).scan(Arc::new(repo)).await.unwrap();

    for tree in &trees {
        assert!(graph.directories.contains_key(&ctx.registry.get(tree).unwrap()));
    }
    assert_eq!(graph.closure.values().next().unwrap().len(), 60);
    assert_eq!(graph.paths[&ctx.registry.get(&trees[0]).unwrap()].matches('/').count(), 59);
}

#[tokio::test]
async fn test_failure_among_many_trees_is_not_cancelled() {
    let (mut repo, trees) = deep_repo(40);
    repo.corrupt_tree(&trees[17], b"garbage");

    let ctx = RunContext::new(test_config());
    let err = GraphScanner::new(&ctx).scan(Arc::new(repo)).await.unwrap_err();
    assert!(matches!(err, SyncError::RepositoryCorruption(_)), "{err}");
    assert!(ctx.cancel.is_cancelled());
}
