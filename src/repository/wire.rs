//! Tree wire format
//!
//! A tree is the JSON document `{"nodes":[...]}` followed by a newline; its
//! content id is the SHA-256 of exactly those bytes.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::macros::datetime;

use crate::model::{ContentId, EntryKind};

/// Encoded tree document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeDoc {
    pub nodes: Vec<NodeDoc>,
}

/// One node of an encoded tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDoc {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default)]
    pub size: u64,
    #[serde(default, rename = "device_id")]
    pub device: u64,
    #[serde(default)]
    pub inode: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub mtime: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtree: Option<ContentId>,
}

const FIXTURE_MTIME: OffsetDateTime = datetime!(2024-01-01 00:00 UTC);

impl NodeDoc {
    /// A regular file node with the given content blobs
    pub fn file(name: &str, size: u64, content: Vec<ContentId>) -> Self {
        Self {
            name: name.to_string(),
            kind: EntryKind::File,
            size,
            device: 0,
            inode: 0,
            mtime: FIXTURE_MTIME,
            content,
            subtree: None,
        }
    }

    /// A directory node pointing at `subtree`
    pub fn dir(name: &str, subtree: ContentId) -> Self {
        Self {
            name: name.to_string(),
            kind: EntryKind::Dir,
            size: 0,
            device: 0,
            inode: 0,
            mtime: FIXTURE_MTIME,
            content: Vec::new(),
            subtree: Some(subtree),
        }
    }

    pub fn with_inode(mut self, device: u64, inode: u64) -> Self {
        self.device = device;
        self.inode = inode;
        self
    }
}

/// Encode nodes into tree bytes
pub fn encode_tree(nodes: &[NodeDoc]) -> serde_json::Result<Vec<u8>> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        nodes: &'a [NodeDoc],
    }
    let mut bytes = serde_json::to_vec(&Borrowed { nodes })?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn decode_tree(bytes: &[u8]) -> serde_json::Result<TreeDoc> {
    serde_json::from_slice(bytes)
}
