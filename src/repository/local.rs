//! Plain on-disk repository
//!
//! Reads an unencrypted repository directory:
//!
//! ```text
//! <root>/snapshots/<hex>        {"time", "hostname", "paths", "tree"}
//! <root>/index/<name>           {"packs": [{"id", "blobs": [{"id", "type", "offset", "length", "uncompressed_length"}]}]}
//! <root>/data/<xx>/<pack hex>   blobs stored back to back at their index offsets
//! ```

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::model::{BlobKind, ContentId};

use super::source::{IndexedBlob, RepositorySource, SnapshotInfo};

#[derive(Deserialize)]
struct SnapshotFile {
    #[serde(with = "time::serde::rfc3339")]
    time: OffsetDateTime,
    #[serde(default)]
    hostname: String,
    #[serde(default)]
    paths: Vec<String>,
    tree: ContentId,
}

#[derive(Deserialize)]
struct IndexFile {
    packs: Vec<PackEntry>,
}

#[derive(Deserialize)]
struct PackEntry {
    id: ContentId,
    blobs: Vec<BlobEntry>,
}

#[derive(Deserialize)]
struct BlobEntry {
    id: ContentId,
    #[serde(rename = "type")]
    kind: BlobKind,
    offset: u64,
    length: u64,
    #[serde(default)]
    uncompressed_length: u64,
}

#[derive(Debug, Clone, Copy)]
struct Location {
    pack: ContentId,
    offset: u64,
    length: u64,
}

/// Read-only view of a repository directory
pub struct LocalRepository {
    root: PathBuf,
    blobs: Vec<IndexedBlob>,
    locations: FxHashMap<ContentId, Location>,
    connections: usize,
}

impl LocalRepository {
    /// Open a repository directory and load its index
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let index_dir = root.join("index");
        let mut entries = tokio::fs::read_dir(&index_dir)
            .await
            .with_context(|| format!("Could not read index directory {}", index_dir.display()))?;

        let mut blobs = Vec::new();
        let mut locations = FxHashMap::default();
        while let Some(entry) = entries.next_entry().await? {
            let bytes = tokio::fs::read(entry.path()).await?;
            let index: IndexFile = serde_json::from_slice(&bytes)
                .with_context(|| format!("Invalid index file {}", entry.path().display()))?;
            for pack in index.packs {
                for blob in pack.blobs {
                    if locations.contains_key(&blob.id) {
                        continue;
                    }
                    locations.insert(
                        blob.id,
                        Location {
                            pack: pack.id,
                            offset: blob.offset,
                            length: blob.length,
                        },
                    );
                    blobs.push(IndexedBlob {
                        id: blob.id,
                        kind: blob.kind,
                        pack: pack.id,
                        length: blob.length,
                        uncompressed_length: if blob.uncompressed_length == 0 {
                            blob.length
                        } else {
                            blob.uncompressed_length
                        },
                    });
                }
            }
        }

        tracing::debug!(root = %root.display(), blobs = blobs.len(), "opened local repository");
        Ok(Self {
            root,
            blobs,
            locations,
            connections: 8,
        })
    }

    pub fn with_connections(mut self, connections: usize) -> Self {
        self.connections = connections.max(1);
        self
    }

    fn pack_path(&self, pack: &ContentId) -> PathBuf {
        let hex = pack.to_hex();
        self.root.join("data").join(&hex[..2]).join(hex)
    }
}

#[async_trait]
impl RepositorySource for LocalRepository {
    async fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>> {
        let dir = self.root.join("snapshots");
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("Could not read snapshot directory {}", dir.display()))?;

        let mut snapshots = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name
                .to_str()
                .ok_or_else(|| anyhow!("non UTF-8 snapshot file name {:?}", entry.file_name()))?;
            let id = ContentId::from_hex(name)?;
            let bytes = tokio::fs::read(entry.path()).await?;
            let file: SnapshotFile = serde_json::from_slice(&bytes)
                .with_context(|| format!("Invalid snapshot file {}", entry.path().display()))?;
            snapshots.push(SnapshotInfo {
                id,
                time: file.time,
                hostname: file.hostname,
                paths: file.paths,
                tree: file.tree,
            });
        }
        Ok(snapshots)
    }

    async fn list_indexed_blobs(&self) -> Result<Vec<IndexedBlob>> {
        Ok(self.blobs.clone())
    }

    async fn load_tree(&self, id: &ContentId) -> Result<Vec<u8>> {
        let location = self
            .locations
            .get(id)
            .ok_or_else(|| anyhow!("blob {id} is not in the index"))?;
        let path = self.pack_path(&location.pack);
        let mut file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("Could not open pack {}", path.display()))?;
        let pack_len = file.metadata().await?.len();
        if location
            .offset
            .checked_add(location.length)
            .is_none_or(|end| end > pack_len)
        {
            bail!(
                "blob {id} at offset {} with length {} lies outside pack {} ({pack_len} bytes)",
                location.offset,
                location.length,
                location.pack
            );
        }
        file.seek(SeekFrom::Start(location.offset)).await?;
        let mut buf = vec![0u8; location.length as usize];
        file.read_exact(&mut buf)
            .await
            .with_context(|| format!("Short read of blob {id} in pack {}", location.pack))?;
        Ok(buf)
    }

    fn connections(&self) -> usize {
        self.connections
    }
}
