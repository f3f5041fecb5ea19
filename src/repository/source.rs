//! Repository collaborator surface
//!
//! The sync engine only reads the backup repository through this trait, so the
//! repository implementation (chunking, encryption, pack layout) stays outside.

use anyhow::Result;
use async_trait::async_trait;
use time::OffsetDateTime;

use crate::model::{BlobKind, ContentId};

/// A snapshot as listed by the repository
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub id: ContentId,
    pub time: OffsetDateTime,
    pub hostname: String,
    pub paths: Vec<String>,
    pub tree: ContentId,
}

/// One entry of the repository index
#[derive(Debug, Clone)]
pub struct IndexedBlob {
    pub id: ContentId,
    pub kind: BlobKind,
    pub pack: ContentId,
    pub length: u64,
    pub uncompressed_length: u64,
}

/// Read access to a content-addressed backup repository
#[async_trait]
pub trait RepositorySource: Send + Sync {
    async fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>>;

    async fn list_indexed_blobs(&self) -> Result<Vec<IndexedBlob>>;

    /// Raw encoded tree. Decoding and hash verification are left to the
    /// caller so that a malformed tree is reported as corruption, not I/O.
    async fn load_tree(&self, id: &ContentId) -> Result<Vec<u8>>;

    /// Number of concurrent loads the backend tolerates
    fn connections(&self) -> usize {
        4
    }
}
