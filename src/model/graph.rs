//! In-memory model of a repository: snapshots, directory nodes, blob index,
//! per-snapshot closures and computed paths.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::id::{ContentId, IntId};

/// Kind of an indexed blob
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobKind {
    Tree,
    Data,
}

impl BlobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BlobKind::Tree => "tree",
            BlobKind::Data => "data",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tree" => Some(BlobKind::Tree),
            "data" => Some(BlobKind::Data),
            _ => None,
        }
    }
}

/// Kind of a directory entry
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    #[serde(other)]
    Other,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Dir => "dir",
            EntryKind::Symlink => "symlink",
            EntryKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(EntryKind::File),
            "dir" => Some(EntryKind::Dir),
            "symlink" => Some(EntryKind::Symlink),
            "other" => Some(EntryKind::Other),
            _ => None,
        }
    }
}

/// Index metadata of one blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobInfo {
    pub kind: BlobKind,
    pub length: u64,
    pub uncompressed_length: u64,
    pub pack: IntId,
}

/// One entry of a directory node
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub device: u64,
    pub inode: u64,
    pub mtime: OffsetDateTime,
    /// Content blobs of a file, in order
    pub content: Vec<IntId>,
    /// Child node of a directory (possibly the empty-tree sentinel)
    pub subtree: Option<IntId>,
}

#[derive(Debug, Clone)]
pub struct SnapshotRecord {
    pub id: ContentId,
    pub int_id: IntId,
    pub time: OffsetDateTime,
    pub hostname: String,
    pub paths: Vec<String>,
    pub root: IntId,
}

/// The whole repository as seen by one run
#[derive(Debug, Default)]
pub struct RepositoryGraph {
    /// Ordered by creation time ascending
    pub snapshots: Vec<SnapshotRecord>,
    pub directories: FxHashMap<IntId, Vec<DirEntry>>,
    pub blobs: FxHashMap<IntId, BlobInfo>,
    /// Directories reachable from each snapshot root (sentinel excluded)
    pub closure: FxHashMap<ContentId, FxHashSet<IntId>>,
    pub paths: FxHashMap<IntId, String>,
}

impl RepositoryGraph {
    /// Distinct snapshot roots in snapshot order
    pub fn roots(&self) -> Vec<IntId> {
        let mut seen = FxHashSet::default();
        self.snapshots
            .iter()
            .map(|s| s.root)
            .filter(|root| seen.insert(*root))
            .collect()
    }

    pub fn pack_count(&self) -> usize {
        self.blobs
            .values()
            .map(|b| b.pack)
            .collect::<FxHashSet<_>>()
            .len()
    }

    pub fn entry_count(&self) -> usize {
        self.directories.values().map(Vec::len).sum()
    }

    pub fn total_blob_bytes(&self) -> u64 {
        self.blobs.values().map(|b| b.length).sum()
    }
}
