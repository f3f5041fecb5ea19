//! In-memory repository
//!
//! Holds trees, an index and snapshots in plain maps. Used by tests and
//! benchmarks to build exact repository shapes, including broken ones.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use crate::model::{BlobKind, ContentId};

use super::source::{IndexedBlob, RepositorySource, SnapshotInfo};
use super::wire::{NodeDoc, encode_tree};

const EPOCH: OffsetDateTime = datetime!(2024-01-01 00:00 UTC);

#[derive(Debug, Clone)]
pub struct MemoryRepository {
    snapshots: Vec<SnapshotInfo>,
    blobs: Vec<IndexedBlob>,
    positions: FxHashMap<ContentId, usize>,
    trees: FxHashMap<ContentId, Vec<u8>>,
    pack: ContentId,
    pack_seq: u32,
    snapshot_seq: u32,
    connections: usize,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            snapshots: Vec::new(),
            blobs: Vec::new(),
            positions: FxHashMap::default(),
            trees: FxHashMap::default(),
            pack: pack_id(0),
            pack_seq: 0,
            snapshot_seq: 0,
            connections: 4,
        }
    }

    pub fn with_connections(mut self, connections: usize) -> Self {
        self.connections = connections.max(1);
        self
    }

    /// Store a data blob in the current pack and return its id
    pub fn add_data(&mut self, data: &[u8]) -> ContentId {
        let id = ContentId::hash(data);
        self.index(id, BlobKind::Data, data.len() as u64);
        id
    }

    /// Encode and store a tree in the current pack and return its id
    pub fn add_tree(&mut self, nodes: Vec<NodeDoc>) -> Result<ContentId> {
        let bytes = encode_tree(&nodes)?;
        let id = ContentId::hash(&bytes);
        self.index(id, BlobKind::Tree, bytes.len() as u64);
        self.trees.insert(id, bytes);
        Ok(id)
    }

    /// Store arbitrary bytes as a tree blob, addressed by their hash
    pub fn add_raw_tree(&mut self, bytes: &[u8]) -> ContentId {
        let id = ContentId::hash(bytes);
        self.index(id, BlobKind::Tree, bytes.len() as u64);
        self.trees.insert(id, bytes.to_vec());
        id
    }

    /// Record a snapshot of `tree`; each new snapshot is one minute younger
    pub fn add_snapshot(&mut self, hostname: &str, paths: &[&str], tree: ContentId) -> ContentId {
        let time = EPOCH + Duration::minutes(i64::from(self.snapshot_seq + 1));
        self.add_snapshot_at(hostname, paths, tree, time)
    }

    pub fn add_snapshot_at(
        &mut self,
        hostname: &str,
        paths: &[&str],
        tree: ContentId,
        time: OffsetDateTime,
    ) -> ContentId {
        self.snapshot_seq += 1;
        let id = ContentId::hash(format!("snapshot/{}/{hostname}/{tree}", self.snapshot_seq).as_bytes());
        self.snapshots.push(SnapshotInfo {
            id,
            time,
            hostname: hostname.to_string(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
            tree,
        });
        id
    }

    pub fn remove_snapshot(&mut self, id: &ContentId) {
        self.snapshots.retain(|s| s.id != *id);
    }

    /// Start filling a fresh pack file
    pub fn rotate_pack(&mut self) -> ContentId {
        self.pack_seq += 1;
        self.pack = pack_id(self.pack_seq);
        self.pack
    }

    /// Move an indexed blob into a fresh pack, as a repack would
    pub fn repack(&mut self, blob: &ContentId) -> Option<ContentId> {
        let pos = *self.positions.get(blob)?;
        let pack = self.rotate_pack();
        self.blobs[pos].pack = pack;
        Some(pack)
    }

    /// Drop a blob from the index while leaving references to it in place
    pub fn forget_blob(&mut self, blob: &ContentId) {
        self.blobs.retain(|b| b.id != *blob);
        self.positions = self
            .blobs
            .iter()
            .enumerate()
            .map(|(i, b)| (b.id, i))
            .collect();
    }

    /// Overwrite a stored tree with arbitrary bytes
    pub fn corrupt_tree(&mut self, tree: &ContentId, bytes: &[u8]) {
        self.trees.insert(*tree, bytes.to_vec());
    }

    pub fn snapshot_ids(&self) -> Vec<ContentId> {
        self.snapshots.iter().map(|s| s.id).collect()
    }

    fn index(&mut self, id: ContentId, kind: BlobKind, length: u64) {
        if self.positions.contains_key(&id) {
            return;
        }
        self.positions.insert(id, self.blobs.len());
        self.blobs.push(IndexedBlob {
            id,
            kind,
            pack: self.pack,
            length,
            uncompressed_length: length,
        });
    }
}

fn pack_id(seq: u32) -> ContentId {
    ContentId::hash(format!("pack/{seq}").as_bytes())
}

#[async_trait]
impl RepositorySource for MemoryRepository {
    async fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>> {
        Ok(self.snapshots.clone())
    }

    async fn list_indexed_blobs(&self) -> Result<Vec<IndexedBlob>> {
        Ok(self.blobs.clone())
    }

    async fn load_tree(&self, id: &ContentId) -> Result<Vec<u8>> {
        self.trees
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("tree {id} not stored"))
    }

    fn connections(&self) -> usize {
        self.connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blobs_indexed_once() {
        let mut repo = MemoryRepository::new();
        let a = repo.add_data(b"same");
        let b = repo.add_data(b"same");
        assert_eq!(a, b);
        assert_eq!(repo.list_indexed_blobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repack_moves_blob() {
        let mut repo = MemoryRepository::new();
        let a = repo.add_data(b"a");
        let before = repo.list_indexed_blobs().await.unwrap()[0].pack;
        let after = repo.repack(&a).unwrap();
        assert_ne!(before, after);
        assert_eq!(repo.list_indexed_blobs().await.unwrap()[0].pack, after);
    }

    #[tokio::test]
    async fn test_snapshots_age_in_order() {
        let mut repo = MemoryRepository::new();
        let root = repo.add_tree(vec![]).unwrap();
        repo.add_snapshot("host", &["/home"], root);
        repo.add_snapshot("host", &["/home"], root);
        let snaps = repo.list_snapshots().await.unwrap();
        assert!(snaps[0].time < snaps[1].time);
        assert_ne!(snaps[0].id, snaps[1].id);
    }
}
