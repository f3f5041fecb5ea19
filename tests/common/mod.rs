// Shared test fixtures for integration tests
// Functions here are used across different test files
#![allow(dead_code)]

use shadowsync::SyncConfig;
use shadowsync::model::ContentId;
use shadowsync::repository::wire::NodeDoc;
use shadowsync::repository::{Database, MemoryRepository};
use shadowsync::sync::Synchronizer;
use std::sync::Arc;

/// Tables in dependency order
pub const TABLES: [&str; 9] = [
    "packfiles",
    "index_repo",
    "names",
    "snapshots",
    "meta_dir",
    "idd_file",
    "contents",
    "fullname",
    "dir_path_id",
];

/// Create an in-memory test database
pub async fn create_test_db() -> Database {
    Database::new(":memory:").await.unwrap()
}

/// Create an in-memory test database with initialized schema
pub async fn setup_db() -> Database {
    let db = create_test_db().await;
    db.init_schema().await.unwrap();
    db
}

/// Small queues and two workers so that backpressure is exercised
pub fn test_config() -> SyncConfig {
    SyncConfig {
        tree_workers: Some(2),
        queue_capacity: 2,
        max_reported_mismatches: 50,
        insert_batch_size: 3,
        show_progress: false,
    }
}

/// Synchronizer over a snapshot of the repository's current state
pub fn synchronizer<'a>(repo: &MemoryRepository, db: &'a Database) -> Synchronizer<'a, Database> {
    Synchronizer::new(Arc::new(repo.clone()), db, test_config())
}

/// One snapshot whose root directory holds `a.txt` with one content blob
pub struct SingleFile {
    pub repo: MemoryRepository,
    pub snapshot: ContentId,
    pub root: ContentId,
    pub blob: ContentId,
}

pub fn single_file_repo() -> SingleFile {
    let mut repo = MemoryRepository::new();
    let blob = repo.add_data(b"hello world");
    let root = repo
        .add_tree(vec![NodeDoc::file("a.txt", 11, vec![blob])])
        .unwrap();
    let snapshot = repo.add_snapshot("host", &["/data"], root);
    SingleFile {
        repo,
        snapshot,
        root,
        blob,
    }
}

/// `/home/user/{notes.txt, photo.jpg}` plus `/etc/hosts`
pub struct HomeTree {
    pub repo: MemoryRepository,
    pub snapshot: ContentId,
    pub root: ContentId,
    pub home: ContentId,
    pub user: ContentId,
    pub etc: ContentId,
    pub notes: [ContentId; 2],
}

pub fn home_repo() -> HomeTree {
    let mut repo = MemoryRepository::new();
    let notes = [repo.add_data(b"notes part one"), repo.add_data(b"notes part two")];
    let photo = repo.add_data(b"jpeg bytes");
    let hosts = repo.add_data(b"127.0.0.1 localhost");

    let user = repo
        .add_tree(vec![
            NodeDoc::file("notes.txt", 28, notes.to_vec()).with_inode(1, 10),
            NodeDoc::file("photo.jpg", 10, vec![photo]).with_inode(1, 11),
        ])
        .unwrap();
    let home = repo.add_tree(vec![NodeDoc::dir("user", user)]).unwrap();
    let etc = repo
        .add_tree(vec![NodeDoc::file("hosts", 19, vec![hosts])])
        .unwrap();
    let root = repo
        .add_tree(vec![NodeDoc::dir("home", home), NodeDoc::dir("etc", etc)])
        .unwrap();
    let snapshot = repo.add_snapshot("laptop", &["/"], root);

    HomeTree {
        repo,
        snapshot,
        root,
        home,
        user,
        etc,
        notes,
    }
}

/// Primary keys of a table, ascending
pub async fn ids(db: &Database, table: &str) -> Vec<i64> {
    sqlx::query_scalar(&format!("SELECT id FROM {table} ORDER BY id"))
        .fetch_all(db.pool())
        .await
        .unwrap()
}

pub async fn count(db: &Database, table: &str) -> i64 {
    db.count_rows(table).await.unwrap()
}

/// Row count of every table, in dependency order
pub async fn counts(db: &Database) -> Vec<i64> {
    let mut all = Vec::new();
    for table in TABLES {
        all.push(count(db, table).await);
    }
    all
}

/// All values of a text column, sorted
pub async fn texts(db: &Database, table: &str, column: &str) -> Vec<String> {
    sqlx::query_scalar(&format!("SELECT {column} FROM {table} ORDER BY {column}"))
        .fetch_all(db.pool())
        .await
        .unwrap()
}
