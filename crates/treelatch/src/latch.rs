//! Concurrency discipline for lock operations
//!
//! The checks in `lock`, `unlock` and `upgrade_lock` read state spread over
//! a node's whole ancestor chain and subtree. Each of those reads is atomic on
//! its own, but the check-then-commit sequence is not, so two racing calls
//! (one on a node, one on its ancestor) could both see "no conflict" and both
//! commit. Every mutating call therefore runs while holding a [`Latch`] that
//! excludes all conflicting calls.
//!
//! # Disciplines
//!
//! ```text
//! Serialized                     Hierarchical (lock on v)
//!
//!   [tree RwLock] ── write         root   ── read
//!                                   │
//!                                  ...    ── read
//!                                   │
//!                                   v     ── write
//!                                  / \
//!                          (covered by v's write latch)
//! ```
//!
//! - `Serialized`: one tree-wide lock. Mutations take it exclusively.
//! - `Hierarchical`: shared latches root-down along the ancestor chain, then
//!   the target's latch exclusively. A call on an ancestor of `v` needs that
//!   ancestor exclusively; a call on a descendant of `v` needs `v` shared.
//!   Calls on disjoint subtrees proceed in parallel.
//!
//! All acquisitions follow the tree's breadth-first order, in which every
//! ancestor precedes its descendants, so no set of callers can deadlock.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::tree::{TreeNode, TreeStore};

/// How concurrent lock operations are kept from interleaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Discipline {
    /// One latch for the whole tree; operations run one at a time.
    #[default]
    Serialized,

    /// Per-node latches along the root-to-target path; operations on
    /// disjoint subtrees run in parallel.
    Hierarchical,
}

/// Guards held for the duration of one operation. Dropping it releases them.
pub(crate) struct Latch<'a> {
    _shared: Vec<RwLockReadGuard<'a, ()>>,
    _exclusive: Vec<RwLockWriteGuard<'a, ()>>,
}

/// Hands out [`Latch`]es according to the configured [`Discipline`].
#[derive(Debug)]
pub(crate) struct Latches {
    discipline: Discipline,
    tree: RwLock<()>,
}

impl Latches {
    pub(crate) fn new(discipline: Discipline) -> Self {
        Self {
            discipline,
            tree: RwLock::new(()),
        }
    }

    pub(crate) fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Latch for a mutating call on `node`.
    pub(crate) fn node<'a>(&'a self, tree: &'a TreeStore, node: &'a TreeNode) -> Latch<'a> {
        match self.discipline {
            Discipline::Serialized => Latch {
                _shared: Vec::new(),
                _exclusive: vec![self.tree.write()],
            },
            Discipline::Hierarchical => {
                let path: Vec<&'a TreeNode> = tree.ancestors(node.id()).collect();
                let shared: Vec<_> = path.into_iter().rev().map(|a| a.latch().read()).collect();
                let exclusive = node.latch().write();
                tracing::trace!(node = node.id(), ancestors = shared.len(), "path latched");

                Latch {
                    _shared: shared,
                    _exclusive: vec![exclusive],
                }
            }
        }
    }

    /// Latch the whole tree for reading (consistent snapshots).
    pub(crate) fn read_all<'a>(&'a self, tree: &'a TreeStore) -> Latch<'a> {
        let shared = match self.discipline {
            Discipline::Serialized => vec![self.tree.read()],
            Discipline::Hierarchical => tree
                .order()
                .iter()
                .filter_map(|&id| tree.get(id))
                .map(|n| n.latch().read())
                .collect(),
        };
        Latch {
            _shared: shared,
            _exclusive: Vec::new(),
        }
    }

    /// Latch the whole tree for writing (reset).
    pub(crate) fn write_all<'a>(&'a self, tree: &'a TreeStore) -> Latch<'a> {
        let exclusive = match self.discipline {
            Discipline::Serialized => vec![self.tree.write()],
            Discipline::Hierarchical => tree
                .order()
                .iter()
                .filter_map(|&id| tree.get(id))
                .map(|n| n.latch().write())
                .collect(),
        };
        Latch {
            _shared: Vec::new(),
            _exclusive: exclusive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> TreeStore {
        TreeStore::build(&["Root", "Child1", "Child2", "GC1", "GC2"], &[-1, 0, 0, 1, 1]).unwrap()
    }

    fn node(tree: &TreeStore, id: usize) -> &TreeNode {
        tree.get(id).unwrap()
    }

    #[test]
    fn test_serialized_excludes_everything() {
        let tree = tree();
        let latches = Latches::new(Discipline::Serialized);

        let _held = latches.node(&tree, node(&tree, 3));
        assert!(latches.tree.try_read().is_none());
        assert!(latches.tree.try_write().is_none());
    }

    #[test]
    fn test_hierarchical_holds_path_shared_and_target_exclusive() {
        let tree = tree();
        let latches = Latches::new(Discipline::Hierarchical);

        let held = latches.node(&tree, node(&tree, 3));

        // Ancestors are shared: readable, not writable.
        assert!(node(&tree, 0).latch().try_read().is_some());
        assert!(node(&tree, 0).latch().try_write().is_none());
        assert!(node(&tree, 1).latch().try_write().is_none());

        // Target is exclusive.
        assert!(node(&tree, 3).latch().try_read().is_none());

        // Sibling and unrelated subtree are free.
        assert!(node(&tree, 4).latch().try_write().is_some());
        assert!(node(&tree, 2).latch().try_write().is_some());

        drop(held);
        assert!(node(&tree, 0).latch().try_write().is_some());
        assert!(node(&tree, 3).latch().try_write().is_some());
    }

    #[test]
    fn test_hierarchical_siblings_latch_together() {
        let tree = tree();
        let latches = Latches::new(Discipline::Hierarchical);

        let _left = latches.node(&tree, node(&tree, 3));
        let _right = latches.node(&tree, node(&tree, 4));
        assert!(node(&tree, 1).latch().try_write().is_none());
    }

    #[test]
    fn test_whole_tree_latches() {
        let tree = tree();
        let latches = Latches::new(Discipline::Hierarchical);

        {
            let _read = latches.read_all(&tree);
            assert!(tree.nodes().all(|n| n.latch().try_write().is_none()));
            assert!(tree.nodes().all(|n| n.latch().try_read().is_some()));
        }
        {
            let _write = latches.write_all(&tree);
            assert!(tree.nodes().all(|n| n.latch().try_read().is_none()));
        }
        assert!(tree.nodes().all(|n| n.latch().try_write().is_some()));
    }
}
