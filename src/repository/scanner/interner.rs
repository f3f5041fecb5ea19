//! Content id interning
//!
//! Maps 32-byte content ids to dense u32 identifiers so the graph and the
//! shadow tables can key everything by a small integer.

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::SyncResult;
use crate::model::{ContentId, IntId};

#[derive(Default)]
struct Inner {
    map: FxHashMap<ContentId, IntId>,
    vec: Vec<ContentId>,
}

/// Append-only bidirectional map between content ids and [`IntId`]s.
///
/// Slot 0 is never handed out and slot 1 is the empty-tree sentinel, so the
/// first interned id gets `IntId(2)`. Safe to share between tree workers.
pub struct IdRegistry {
    inner: Mutex<Inner>,
}

impl Default for IdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdRegistry {
    pub fn new() -> Self {
        let empty = ContentId::empty_tree();
        let mut inner = Inner::default();
        inner.vec.push(ContentId::default());
        inner.vec.push(empty);
        inner.map.insert(empty, IntId::EMPTY_TREE);
        Self {
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Intern an id and return its compact identifier
    pub fn intern(&self, id: &ContentId) -> IntId {
        let mut inner = self.lock();
        if let Some(&int_id) = inner.map.get(id) {
            return int_id;
        }
        let int_id = IntId(inner.vec.len() as u32);
        inner.map.insert(*id, int_id);
        inner.vec.push(*id);
        int_id
    }

    /// Parse and intern a hex content id
    pub fn intern_hex(&self, hex_str: &str) -> SyncResult<IntId> {
        let id = ContentId::from_hex(hex_str)?;
        Ok(self.intern(&id))
    }

    /// Look up without assigning
    pub fn get(&self, id: &ContentId) -> Option<IntId> {
        self.lock().map.get(id).copied()
    }

    /// Content id of an identifier produced by [`IdRegistry::intern`]
    pub fn resolve(&self, int_id: IntId) -> ContentId {
        self.lock().vec[int_id.0 as usize]
    }

    /// Number of interned ids, reserved slots included
    pub fn len(&self) -> usize {
        self.lock().vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= IntId::FIRST as usize
    }
}

impl fmt::Debug for IdRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdRegistry").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_intern_returns_same_id() {
        let registry = IdRegistry::new();
        let id = ContentId::hash(b"foo");
        assert_eq!(registry.intern(&id), registry.intern(&id));
    }

    #[test]
    fn test_assignment_starts_after_reserved_slots() {
        let registry = IdRegistry::new();
        assert!(registry.is_empty());
        let first = registry.intern(&ContentId::hash(b"first"));
        let second = registry.intern(&ContentId::hash(b"second"));
        assert_eq!(first, IntId(IntId::FIRST));
        assert_eq!(second, IntId(IntId::FIRST + 1));
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_debug_shows_size() {
        let registry = IdRegistry::new();
        registry.intern(&ContentId::hash(b"foo"));
        assert_eq!(format!("{registry:?}"), "IdRegistry { len: 3 }");
    }

    #[test]
    fn test_empty_tree_is_sentinel() {
        let registry = IdRegistry::new();
        assert_eq!(registry.intern(&ContentId::empty_tree()), IntId::EMPTY_TREE);
        assert_eq!(registry.resolve(IntId::EMPTY_TREE), ContentId::empty_tree());
    }

    #[test]
    fn test_resolve_roundtrip() {
        let registry = IdRegistry::new();
        let ids: Vec<ContentId> = (0..100u32).map(|i| ContentId::hash(&i.to_le_bytes())).collect();
        for id in &ids {
            assert_eq!(registry.resolve(registry.intern(id)), *id);
        }
        assert_eq!(registry.get(&ContentId::hash(b"never")), None);
    }

    #[test]
    fn test_concurrent_interning_is_injective() {
        let registry = Arc::new(IdRegistry::new());
        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    // Overlapping ranges so threads race on the same ids
                    (t * 50..t * 50 + 200)
                        .map(|i| (i, registry.intern(&ContentId::hash(&i.to_le_bytes()))))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen: FxHashMap<u32, IntId> = FxHashMap::default();
        for handle in handles {
            for (i, int_id) in handle.join().unwrap() {
                let prev = seen.insert(i, int_id);
                assert!(prev.is_none() || prev == Some(int_id));
            }
        }
        let distinct: rustc_hash::FxHashSet<IntId> = seen.values().copied().collect();
        assert_eq!(distinct.len(), seen.len());
        assert_eq!(registry.len(), seen.len() + IntId::FIRST as usize);
    }
}
