//! Remote subtree snapshot.
//!
//! Entries live in a flat arena indexed by position, each node pointing at its
//! parent. The arena is filled breadth first, one listing request per folder,
//! and walked depth first with an explicit stack, so neither building nor
//! rendering recurses.

use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::entry::{normalize_listing, DirectoryEntry};
use crate::path::RemotePath;
use crate::providers::{ProviderError, StorageBackend};
use crate::tree_ops::validate_name;

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub entry: DirectoryEntry,
    /// Folder containing this entry
    pub parent_path: RemotePath,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// 0 for entries directly under the walked root
    pub depth: usize,
}

impl TreeNode {
    pub fn path(&self) -> RemotePath {
        self.parent_path.join(self.entry.name())
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntryArena {
    root: RemotePath,
    nodes: Vec<TreeNode>,
    roots: Vec<usize>,
}

impl EntryArena {
    /// List `root` and every folder below it, down to `max_depth` levels
    /// (`None` for no limit).
    pub async fn build(
        backend: &dyn StorageBackend,
        root: &RemotePath,
        max_depth: Option<usize>,
    ) -> Result<Self, ProviderError> {
        let mut arena = EntryArena {
            root: root.clone(),
            ..Default::default()
        };
        let mut queue: VecDeque<(RemotePath, Option<usize>, usize)> = VecDeque::new();
        queue.push_back((root.clone(), None, 0));

        while let Some((folder, parent, depth)) = queue.pop_front() {
            let listing = normalize_listing(backend.list_folder(&folder).await?);
            debug!("walk {}: {} entries", folder, listing.len());
            for entry in listing {
                let id = arena.nodes.len();
                let mut descend = entry.is_folder() && max_depth.map_or(true, |max| depth + 1 < max);
                // A folder that cannot be addressed by name is kept as a leaf
                if descend {
                    if let Err(e) = validate_name(entry.name()) {
                        warn!("not descending into {:?} under {}: {}", entry.name(), folder, e);
                        descend = false;
                    }
                }
                if descend {
                    queue.push_back((folder.join(entry.name()), Some(id), depth + 1));
                }
                arena.nodes.push(TreeNode {
                    entry,
                    parent_path: folder.clone(),
                    parent,
                    children: Vec::new(),
                    depth,
                });
                match parent {
                    Some(p) => arena.nodes[p].children.push(id),
                    None => arena.roots.push(id),
                }
            }
        }
        Ok(arena)
    }

    pub fn root(&self) -> &RemotePath {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    /// Total size of all files in the snapshot
    pub fn total_size(&self) -> u64 {
        self.nodes.iter().map(|n| n.entry.size()).sum()
    }

    /// Pre-order traversal in listing order.
    pub fn iter_depth_first(&self) -> DepthFirst<'_> {
        DepthFirst {
            arena: self,
            stack: self.roots.iter().rev().copied().collect(),
        }
    }
}

pub struct DepthFirst<'a> {
    arena: &'a EntryArena,
    stack: Vec<usize>,
}

impl<'a> Iterator for DepthFirst<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = &self.arena.nodes[id];
        self.stack.extend(node.children.iter().rev().copied());
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{Call, MockBackend};
    use crate::providers::RawEntry;

    fn sample() -> MockBackend {
        MockBackend::new()
            .with_folder("/docs")
            .with_folder("/docs/old")
            .with_folder("/media")
            .with_file("/readme.md", b"hello", "text/markdown")
            .with_file("/docs/a.txt", b"aa", "text/plain")
            .with_file("/docs/old/b.txt", b"bbb", "text/plain")
    }

    #[tokio::test]
    async fn test_depth_first_order() {
        let backend = sample();
        let arena = EntryArena::build(&backend, &RemotePath::root(), None).await.unwrap();
        let rendered: Vec<(usize, String)> = arena
            .iter_depth_first()
            .map(|n| (n.depth, n.path().to_body_path(None)))
            .collect();
        assert_eq!(
            rendered,
            vec![
                (0, "/docs".to_string()),
                (1, "/docs/old".to_string()),
                (2, "/docs/old/b.txt".to_string()),
                (1, "/docs/a.txt".to_string()),
                (0, "/media".to_string()),
                (0, "/readme.md".to_string()),
            ]
        );
        assert_eq!(arena.total_size(), 10);
    }

    #[tokio::test]
    async fn test_lists_breadth_first() {
        let backend = sample();
        EntryArena::build(&backend, &RemotePath::root(), None).await.unwrap();
        assert_eq!(
            backend.calls(),
            vec![
                Call::List("/".into()),
                Call::List("/docs".into()),
                Call::List("/media".into()),
                Call::List("/docs/old".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_max_depth_stops_listing() {
        let backend = sample();
        let arena = EntryArena::build(&backend, &RemotePath::root(), Some(1)).await.unwrap();
        assert_eq!(arena.len(), 3);
        assert_eq!(backend.calls(), vec![Call::List("/".into())]);
    }

    #[tokio::test]
    async fn test_parent_links() {
        let backend = sample();
        let arena = EntryArena::build(&backend, &RemotePath::parse_body_path("/docs"), None)
            .await
            .unwrap();
        let b = arena
            .iter_depth_first()
            .find(|n| n.entry.name() == "b.txt")
            .unwrap();
        let parent = arena.get(b.parent.unwrap()).unwrap();
        assert_eq!(parent.entry.name(), "old");
        assert!(parent.parent.is_none());
        assert_eq!(b.depth, 1);
    }

    #[tokio::test]
    async fn test_deep_chain_walks_without_recursion() {
        let mut backend = MockBackend::new();
        let mut path = String::new();
        for i in 0..200 {
            path.push_str(&format!("/d{}", i));
            backend = backend.with_folder(&path);
        }
        let arena = EntryArena::build(&backend, &RemotePath::root(), None).await.unwrap();
        assert_eq!(arena.len(), 200);
        assert_eq!(arena.iter_depth_first().last().unwrap().depth, 199);
    }

    #[tokio::test]
    async fn test_unaddressable_folder_names_are_leaves() {
        let backend = MockBackend::new()
            .with_folder("/ok")
            .with_raw_entries("/", vec![RawEntry::folder(""), RawEntry::folder("a/b")])
            .with_raw_entries("/ok", vec![RawEntry::folder(".."), RawEntry::folder("")]);
        let arena = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            EntryArena::build(&backend, &RemotePath::root(), None),
        )
        .await
        .expect("walk must terminate")
        .unwrap();

        assert_eq!(arena.len(), 5);
        assert_eq!(
            backend.calls(),
            vec![Call::List("/".into()), Call::List("/ok".into())]
        );
        let leaves: Vec<&str> = arena
            .iter_depth_first()
            .filter(|n| n.entry.is_folder() && n.children.is_empty())
            .map(|n| n.entry.name())
            .collect();
        assert_eq!(leaves, vec!["", "a/b", "", ".."]);
    }

    #[tokio::test]
    async fn test_missing_root_is_not_found() {
        let backend = MockBackend::new();
        let err = EntryArena::build(&backend, &RemotePath::parse_body_path("/nope"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }
}
