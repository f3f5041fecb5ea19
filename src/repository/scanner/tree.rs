//! Parallel tree loading
//!
//! A single dispatcher streams tree ids into a bounded queue that a fixed
//! pool of workers drains. Each worker loads, verifies and decodes one tree
//! at a time and publishes the decoded entries into the shared node map.
//! The first failing worker cancels the run; everyone else stops at their
//! next handoff.

use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{SyncError, SyncResult, keep_first};
use crate::model::{BlobInfo, ContentId, DirEntry, EntryKind, IntId};
use crate::repository::source::RepositorySource;
use crate::repository::wire::{NodeDoc, decode_tree};

use super::interner::IdRegistry;
use super::progress::ProgressHandle;

type NodeMap = FxHashMap<IntId, Vec<DirEntry>>;

/// Loads every tree blob of the repository
pub struct TreeLoader {
    pub repo: Arc<dyn RepositorySource>,
    pub registry: Arc<IdRegistry>,
    pub blobs: Arc<FxHashMap<IntId, BlobInfo>>,
    pub cancel: CancellationToken,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl TreeLoader {
    /// Load `trees` (one load per id) and return the decoded directory nodes
    pub async fn load_all(
        self,
        trees: Vec<IntId>,
        progress: Arc<dyn ProgressHandle>,
    ) -> SyncResult<NodeMap> {
        let (tx, rx) = mpsc::channel::<IntId>(self.queue_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let nodes = Arc::new(Mutex::new(NodeMap::default()));

        let mut workers = JoinSet::new();
        for _ in 0..self.workers.max(1) {
            let worker = TreeWorker {
                repo: self.repo.clone(),
                registry: self.registry.clone(),
                blobs: self.blobs.clone(),
                queue: rx.clone(),
                nodes: nodes.clone(),
                cancel: self.cancel.clone(),
                progress: progress.clone(),
            };
            workers.spawn(worker.run());
        }

        let cancel = self.cancel.clone();
        let dispatch = async move {
            for tree in trees {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    sent = tx.send(tree) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            // tx dropped here, workers drain and exit
        };

        let cancel = self.cancel.clone();
        let collect = async move {
            let mut first_err = None;
            while let Some(joined) = workers.join_next().await {
                let err = match joined {
                    Ok(Ok(())) => continue,
                    Ok(Err(e)) => e,
                    Err(e) => SyncError::from(e),
                };
                cancel.cancel();
                keep_first(&mut first_err, err);
            }
            first_err
        };

        let ((), first_err) = tokio::join!(dispatch, collect);
        if let Some(err) = first_err {
            return Err(err);
        }

        let mut guard = nodes.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(std::mem::take(&mut *guard))
    }
}

struct TreeWorker {
    repo: Arc<dyn RepositorySource>,
    registry: Arc<IdRegistry>,
    blobs: Arc<FxHashMap<IntId, BlobInfo>>,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<IntId>>>,
    nodes: Arc<Mutex<NodeMap>>,
    cancel: CancellationToken,
    progress: Arc<dyn ProgressHandle>,
}

impl TreeWorker {
    async fn run(self) -> SyncResult<()> {
        let result = self.drain().await;
        if let Err(e) = &result {
            if !e.is_cancelled() {
                self.cancel.cancel();
            }
        }
        result
    }

    async fn drain(&self) -> SyncResult<()> {
        loop {
            let next = {
                let mut queue = self.queue.lock().await;
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
                    next = queue.recv() => next,
                }
            };
            let Some(tree) = next else {
                return Ok(());
            };

            let entries = self.load(tree).await?;
            self.nodes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(tree, entries);
            self.progress.inc(1);
        }
    }

    async fn load(&self, tree: IntId) -> SyncResult<Vec<DirEntry>> {
        let id = self.registry.resolve(tree);
        let bytes = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
            loaded = self.repo.load_tree(&id) => loaded.map_err(SyncError::Backend)?,
        };

        if ContentId::hash(&bytes) != id {
            return Err(SyncError::RepositoryCorruption(format!(
                "tree {id} does not match its content hash"
            )));
        }
        let doc = decode_tree(&bytes).map_err(|e| {
            SyncError::RepositoryCorruption(format!("tree {id} is malformed: {e}"))
        })?;

        let mut names = FxHashSet::default();
        for node in &doc.nodes {
            if !names.insert(node.name.as_str()) {
                return Err(SyncError::RepositoryCorruption(format!(
                    "tree {id} lists {:?} twice",
                    node.name
                )));
            }
        }

        doc.nodes
            .into_iter()
            .map(|node| self.convert(&id, node))
            .collect()
    }

    fn convert(&self, tree: &ContentId, node: NodeDoc) -> SyncResult<DirEntry> {
        let content = node
            .content
            .iter()
            .map(|blob| self.require(tree, &node.name, blob))
            .collect::<SyncResult<Vec<_>>>()?;

        let subtree = match (&node.subtree, node.kind) {
            (Some(subtree), _) => Some(self.require(tree, &node.name, subtree)?),
            (None, EntryKind::Dir) => {
                return Err(SyncError::RepositoryCorruption(format!(
                    "directory {:?} in tree {tree} has no subtree",
                    node.name
                )));
            }
            (None, _) => None,
        };

        Ok(DirEntry {
            name: node.name,
            kind: node.kind,
            size: node.size,
            device: node.device,
            inode: node.inode,
            mtime: node.mtime.to_offset(time::UtcOffset::UTC),
            content,
            subtree,
        })
    }

    /// Intern a referenced blob, which must be indexed or be the empty tree
    fn require(&self, tree: &ContentId, name: &str, blob: &ContentId) -> SyncResult<IntId> {
        let id = self.registry.intern(blob);
        if id.is_empty_tree() || self.blobs.contains_key(&id) {
            Ok(id)
        } else {
            Err(SyncError::RepositoryCorruption(format!(
                "entry {name:?} in tree {tree} references blob {blob} missing from the index"
            )))
        }
    }
}
