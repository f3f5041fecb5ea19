mod graph;
mod id;

pub use graph::{BlobInfo, BlobKind, DirEntry, EntryKind, RepositoryGraph, SnapshotRecord};
pub use id::{ContentId, EMPTY_TREE_BYTES, ID_LEN, IntId};
