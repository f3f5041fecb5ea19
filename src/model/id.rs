//! Content-addressed and compact identifiers

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{SyncError, SyncResult};

/// Length of a content id in bytes
pub const ID_LEN: usize = 32;

/// Encoding of a tree with no nodes; its hash is the empty-tree sentinel.
pub const EMPTY_TREE_BYTES: &[u8] = b"{\"nodes\":[]}\n";

/// SHA-256 address of an immutable repository object
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ContentId([u8; ID_LEN]);

impl ContentId {
    /// Address of `data`
    pub fn hash(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// The canonical id of a tree without nodes
    pub fn empty_tree() -> Self {
        Self::hash(EMPTY_TREE_BYTES)
    }

    pub fn from_hex(hex_str: &str) -> SyncResult<Self> {
        let bytes = hex::decode(hex_str).map_err(|e| {
            SyncError::RepositoryCorruption(format!("content id {hex_str:?} is not hex: {e}"))
        })?;
        let arr: [u8; ID_LEN] = bytes.as_slice().try_into().map_err(|_| {
            SyncError::RepositoryCorruption(format!(
                "content id {hex_str:?} has {} bytes, expected {ID_LEN}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First four bytes as hex, the usual display form of a snapshot
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.short())
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Run-local compact identifier for a [`ContentId`]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct IntId(pub u32);

impl IntId {
    /// The node shared by every empty directory
    pub const EMPTY_TREE: IntId = IntId(1);
    /// First identifier handed out by the registry
    pub const FIRST: u32 = 2;

    pub fn is_empty_tree(self) -> bool {
        self == Self::EMPTY_TREE
    }
}

impl fmt::Display for IntId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let id = ContentId::hash(b"hello");
        assert_eq!(ContentId::from_hex(&id.to_hex()).unwrap(), id);
        assert_eq!(id.short().len(), 8);
        assert!(id.to_hex().starts_with(&id.short()));
    }

    #[test]
    fn test_wrong_length_is_corruption() {
        let err = ContentId::from_hex("abcd").unwrap_err();
        assert!(matches!(err, SyncError::RepositoryCorruption(_)));
        let err = ContentId::from_hex("zz").unwrap_err();
        assert!(matches!(err, SyncError::RepositoryCorruption(_)));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let id = ContentId::hash(b"x");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
        let back: ContentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
