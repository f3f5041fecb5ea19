//! Absolute path assignment for directory nodes
//!
//! Breadth-first walk seeded with every snapshot root at once. A directory
//! gets its path the first time it is dequeued, so a subtree shared by
//! several parents keeps the first path that reaches it. Roots are seeded in
//! snapshot order and children follow entry order, which makes the result a
//! function of the graph.

use rustc_hash::FxHashMap;
use std::collections::VecDeque;

use crate::model::{DirEntry, IntId};

pub const ROOT_PATH: &str = "/";

/// Join a child name onto a parent path without doubling the root slash
pub fn join_path(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// `parent -> [(child, name)]`, the empty-tree sentinel left out as a child
fn children_map(directories: &FxHashMap<IntId, Vec<DirEntry>>) -> FxHashMap<IntId, Vec<(IntId, &str)>> {
    directories
        .iter()
        .map(|(parent, entries)| {
            let children = entries
                .iter()
                .filter_map(|e| match e.subtree {
                    Some(child) if !child.is_empty_tree() => Some((child, e.name.as_str())),
                    _ => None,
                })
                .collect();
            (*parent, children)
        })
        .collect()
}

/// Assign one absolute path to every directory reachable from `roots`
pub fn resolve_paths(
    directories: &FxHashMap<IntId, Vec<DirEntry>>,
    roots: &[IntId],
) -> FxHashMap<IntId, String> {
    let children = children_map(directories);
    let mut paths: FxHashMap<IntId, String> = FxHashMap::default();
    let mut queue: VecDeque<(IntId, String)> = roots
        .iter()
        .map(|root| (*root, ROOT_PATH.to_string()))
        .collect();

    while let Some((dir, path)) = queue.pop_front() {
        if paths.contains_key(&dir) {
            continue;
        }
        if let Some(kids) = children.get(&dir) {
            for (child, name) in kids {
                if !paths.contains_key(child) {
                    queue.push_back((*child, join_path(&path, name)));
                }
            }
        }
        paths.insert(dir, path);
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryKind;
    use time::macros::datetime;

    fn dir(name: &str, subtree: IntId) -> DirEntry {
        DirEntry {
            name: name.to_string(),
            kind: EntryKind::Dir,
            size: 0,
            device: 0,
            inode: 0,
            mtime: datetime!(2024-01-01 00:00 UTC),
            content: Vec::new(),
            subtree: Some(subtree),
        }
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "home"), "/home");
        assert_eq!(join_path("/home", "user"), "/home/user");
    }

    #[test]
    fn test_tree_shaped_graph() {
        let (root, home, user, etc) = (IntId(2), IntId(3), IntId(4), IntId(5));
        let mut dirs = FxHashMap::default();
        dirs.insert(root, vec![dir("home", home), dir("etc", etc)]);
        dirs.insert(home, vec![dir("user", user)]);
        dirs.insert(user, vec![]);
        dirs.insert(etc, vec![]);

        let paths = resolve_paths(&dirs, &[root]);
        assert_eq!(paths.len(), 4);
        assert_eq!(paths[&root], "/");
        assert_eq!(paths[&home], "/home");
        assert_eq!(paths[&user], "/home/user");
        assert_eq!(paths[&etc], "/etc");
    }

    #[test]
    fn test_empty_tree_gets_no_path() {
        let root = IntId(2);
        let mut dirs = FxHashMap::default();
        dirs.insert(root, vec![dir("empty", IntId::EMPTY_TREE), dir("also", IntId::EMPTY_TREE)]);
        let paths = resolve_paths(&dirs, &[root]);
        assert_eq!(paths.len(), 1);
        assert!(!paths.contains_key(&IntId::EMPTY_TREE));
    }

    #[test]
    fn test_shared_subtree_gets_one_path() {
        let (root_a, root_b, shared) = (IntId(2), IntId(3), IntId(4));
        let mut dirs = FxHashMap::default();
        dirs.insert(root_a, vec![dir("a", shared)]);
        dirs.insert(root_b, vec![dir("b", shared)]);
        dirs.insert(shared, vec![]);

        let paths = resolve_paths(&dirs, &[root_a, root_b]);
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[&root_a], "/");
        assert_eq!(paths[&root_b], "/");
        // First root in snapshot order wins
        assert_eq!(paths[&shared], "/a");
    }

    #[test]
    fn test_root_reused_as_subdirectory_stays_root() {
        let (outer, inner) = (IntId(2), IntId(3));
        let mut dirs = FxHashMap::default();
        dirs.insert(outer, vec![dir("inner", inner)]);
        dirs.insert(inner, vec![]);
        let paths = resolve_paths(&dirs, &[outer, inner]);
        assert_eq!(paths[&inner], "/");
    }
}
