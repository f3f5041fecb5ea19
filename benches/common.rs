// Shared benchmark helpers
// Functions here are used across different benchmark files
#![allow(dead_code)]

use shadowsync::SyncConfig;
use shadowsync::model::ContentId;
use shadowsync::repository::wire::NodeDoc;
use shadowsync::repository::{Database, MemoryRepository};

/// Generate a repository of `num_dirs` directories under one root, each
/// holding `files_per_dir` single-chunk files, with `snapshots` snapshots of it
pub fn generate_repo(num_dirs: usize, files_per_dir: usize, snapshots: usize) -> MemoryRepository {
    let mut repo = MemoryRepository::new();
    let mut subdirs = Vec::with_capacity(num_dirs);

    for d in 0..num_dirs {
        let nodes: Vec<NodeDoc> = (0..files_per_dir)
            .map(|f| {
                let blob = repo.add_data(format!("dir {d} file {f}").as_bytes());
                NodeDoc::file(&format!("file_{f}.dat"), 64, vec![blob]).with_inode(1, (d * files_per_dir + f) as u64)
            })
            .collect();
        let tree = repo.add_tree(nodes).unwrap();
        subdirs.push(NodeDoc::dir(&format!("dir_{d}"), tree));
        if d % 100 == 99 {
            repo.rotate_pack();
        }
    }

    let root = repo.add_tree(subdirs).unwrap();
    for _ in 0..snapshots {
        repo.add_snapshot("bench", &["/"], root);
    }
    repo
}

/// Add one more snapshot of a small, previously unseen tree
pub fn add_changed_snapshot(repo: &mut MemoryRepository) -> ContentId {
    let blob = repo.add_data(b"late arrival");
    let extra = repo
        .add_tree(vec![NodeDoc::file("late.dat", 12, vec![blob])])
        .unwrap();
    let root = repo.add_tree(vec![NodeDoc::dir("extra", extra)]).unwrap();
    repo.add_snapshot("bench", &["/"], root)
}

pub fn bench_config() -> SyncConfig {
    SyncConfig {
        tree_workers: Some(4),
        ..SyncConfig::default()
    }
}

/// Create an in-memory database with initialized schema
pub async fn setup_bench_db() -> Database {
    let db = Database::new(":memory:").await.unwrap();
    db.init_schema().await.unwrap();
    db
}
