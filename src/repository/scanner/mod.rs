//! Repository graph builder
//!
//! Turns a repository into a [`RepositoryGraph`].
//!
//! # Architecture
//!
//! - **interner**: content id ↔ compact id registry shared by all workers
//! - **pack**: blob index (kind, sizes, owning pack file)
//! - **tree**: bounded-queue worker pool loading and decoding trees
//! - **paths**: breadth-first absolute path assignment
//! - **progress**: progress reporting abstraction
//! - **GraphScanner**: orchestrates the phases below

mod interner;
mod pack;
mod paths;
mod progress;
mod tree;

pub use interner::IdRegistry;
pub use pack::PackIndex;
pub use paths::{ROOT_PATH, join_path, resolve_paths};
pub use progress::{CountingProgress, IndicatifProgress, NoopProgress, ProgressHandle, ProgressReporter, reporter};
pub use tree::TreeLoader;

use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult, format_capped};
use crate::model::{DirEntry, IntId, RepositoryGraph, SnapshotRecord};
use crate::repository::source::RepositorySource;
use crate::sync::RunContext;
use crate::util::format_size;

/// Builds the repository graph for one run
pub struct GraphScanner<'a> {
    ctx: &'a RunContext,
}

impl<'a> GraphScanner<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    /// Load snapshots, index and trees and assemble the graph
    pub async fn scan(&self, repo: Arc<dyn RepositorySource>) -> SyncResult<RepositoryGraph> {
        let total_start = Instant::now();
        let registry = &self.ctx.registry;

        // Phase 1: Snapshots
        let phase_start = Instant::now();
        let listed = repo.list_snapshots().await.map_err(SyncError::Backend)?;
        let mut snapshots: Vec<SnapshotRecord> = listed
            .into_iter()
            .map(|s| SnapshotRecord {
                int_id: registry.intern(&s.id),
                root: registry.intern(&s.tree),
                id: s.id,
                time: s.time.to_offset(time::UtcOffset::UTC),
                hostname: s.hostname,
                paths: s.paths,
            })
            .collect();
        // Stable: equal times keep listing order
        snapshots.sort_by_key(|s| s.time);
        self.phase("list snapshots", snapshots.len(), phase_start);

        // Phase 2: Blob index
        let phase_start = Instant::now();
        let listed = repo.list_indexed_blobs().await.map_err(SyncError::Backend)?;
        let index = PackIndex::build(listed, registry);
        self.phase("list indexed blobs", index.len(), phase_start);

        let missing: Vec<String> = snapshots
            .iter()
            .filter(|s| !s.root.is_empty_tree() && !index.contains(s.root))
            .map(|s| format!("{} (tree {})", s.id.short(), registry.resolve(s.root)))
            .collect();
        if !missing.is_empty() {
            return Err(SyncError::RepositoryCorruption(format!(
                "snapshot roots missing from the index: {}",
                format_capped(&missing)
            )));
        }

        // Phase 3: Trees
        let phase_start = Instant::now();
        let trees = index.trees_to_load();
        let tree_count = trees.len();
        let blobs = Arc::new(index.into_blobs());
        let progress = reporter(self.ctx.config.show_progress).start("Loading trees", tree_count as u64);
        let loader = TreeLoader {
            repo: repo.clone(),
            registry: registry.clone(),
            blobs: blobs.clone(),
            cancel: self.ctx.cancel.clone(),
            workers: self.ctx.config.tree_workers.unwrap_or_else(|| repo.connections()),
            queue_capacity: self.ctx.config.queue_capacity,
        };
        let mut directories = loader.load_all(trees, progress.clone()).await?;
        progress.finish();
        directories.entry(IntId::EMPTY_TREE).or_default();
        self.phase("load trees", tree_count, phase_start);

        // Phase 4: Topology
        let phase_start = Instant::now();
        let mut closure = FxHashMap::default();
        for snapshot in &snapshots {
            closure.insert(snapshot.id, reachable_dirs(&directories, snapshot.root));
        }
        let mut graph = RepositoryGraph {
            snapshots,
            directories,
            blobs: Arc::try_unwrap(blobs).unwrap_or_else(|shared| (*shared).clone()),
            closure,
            paths: FxHashMap::default(),
        };
        graph.paths = resolve_paths(&graph.directories, &graph.roots());
        self.phase("closure and paths", graph.paths.len(), phase_start);

        info!(
            snapshots = graph.snapshots.len(),
            blobs = graph.blobs.len(),
            packs = graph.pack_count(),
            directories = graph.directories.len(),
            entries = graph.entry_count(),
            stored = %format_size(graph.total_blob_bytes()),
            elapsed = ?total_start.elapsed(),
            "repository graph built"
        );
        Ok(graph)
    }

    fn phase(&self, name: &str, items: usize, start: Instant) {
        debug!(phase = name, items, elapsed = ?start.elapsed(), "scan phase done");
    }
}

/// Directories reachable from `root`, the empty-tree sentinel left out
pub fn reachable_dirs(directories: &FxHashMap<IntId, Vec<DirEntry>>, root: IntId) -> FxHashSet<IntId> {
    let mut seen = FxHashSet::default();
    let mut stack = vec![root];
    while let Some(dir) = stack.pop() {
        if dir.is_empty_tree() || !seen.insert(dir) {
            continue;
        }
        if let Some(entries) = directories.get(&dir) {
            stack.extend(entries.iter().filter_map(|e| e.subtree));
        }
    }
    seen
}
