//! Blob index
//!
//! Interns every indexed blob and its owning pack file and records the
//! metadata the shadow `index_repo` and `packfiles` tables are built from.

use rustc_hash::FxHashMap;

use crate::model::{BlobInfo, BlobKind, IntId};
use crate::repository::source::IndexedBlob;

use super::interner::IdRegistry;

/// Index metadata keyed by compact id
pub struct PackIndex {
    blobs: FxHashMap<IntId, BlobInfo>,
    trees: Vec<IntId>,
    duplicates: usize,
}

impl PackIndex {
    /// Intern all listed blobs. A blob listed in several packs keeps the
    /// first listing.
    pub fn build(listed: Vec<IndexedBlob>, registry: &IdRegistry) -> Self {
        let mut blobs = FxHashMap::default();
        blobs.reserve(listed.len());
        let mut trees = Vec::new();
        let mut duplicates = 0;

        for blob in listed {
            let id = registry.intern(&blob.id);
            if blobs.contains_key(&id) {
                duplicates += 1;
                continue;
            }
            let pack = registry.intern(&blob.pack);
            if blob.kind == BlobKind::Tree {
                trees.push(id);
            }
            blobs.insert(
                id,
                BlobInfo {
                    kind: blob.kind,
                    length: blob.length,
                    uncompressed_length: blob.uncompressed_length,
                    pack,
                },
            );
        }

        if duplicates > 0 {
            tracing::debug!(duplicates, "blobs listed in more than one pack");
        }

        Self {
            blobs,
            trees,
            duplicates,
        }
    }

    pub fn contains(&self, id: IntId) -> bool {
        self.blobs.contains_key(&id)
    }

    pub fn get(&self, id: IntId) -> Option<&BlobInfo> {
        self.blobs.get(&id)
    }

    /// Tree blobs in listing order, the empty-tree sentinel left out
    pub fn trees_to_load(&self) -> Vec<IntId> {
        self.trees
            .iter()
            .copied()
            .filter(|id| !id.is_empty_tree())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn into_blobs(self) -> FxHashMap<IntId, BlobInfo> {
        self.blobs
    }
}
