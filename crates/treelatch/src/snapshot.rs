//! Point-in-time view of the tree's lock state

use std::fmt;

use serde::Serialize;

use crate::tree::{NodeId, TreeNode, TreeStore, UserId};

/// Recursive copy of one node and its subtree, as handed to visualizers.
///
/// Serializes with the field names `id`, `name`, `lockedBy`,
/// `lockedDescendantCount` and `children`; an unlocked node has
/// `lockedBy: null`.
///
/// `Display` renders an indented outline:
///
/// ```text
/// Root (ID: 0) [1 locked descendants]
///   Child1 (ID: 1) [LOCKED by User 7]
///   Child2 (ID: 2)
/// ```
///
/// Capturing, cloning, comparing, rendering and dropping use explicit
/// stacks, so they work on trees of any depth. JSON export nests one object
/// per level and is bounded by the thread's stack.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    /// Node id
    pub id: NodeId,

    /// Node label
    pub name: String,

    /// Holder, if locked
    pub locked_by: Option<UserId>,

    /// Held proper descendants
    pub locked_descendant_count: usize,

    /// Children in insertion order
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// Copy the current state of `tree`.
    ///
    /// The caller is responsible for excluding concurrent writers. Built
    /// bottom-up over the breadth-first order so deep trees do not recurse.
    pub(crate) fn capture(tree: &TreeStore) -> Self {
        let mut built: Vec<Option<NodeSnapshot>> = (0..tree.len()).map(|_| None).collect();

        // The root leads the breadth-first order; it is assembled last.
        for &id in tree.order().iter().skip(1).rev() {
            if let Some(node) = tree.get(id) {
                built[id] = Some(Self::assemble(node, &mut built));
            }
        }

        Self::assemble(tree.root(), &mut built)
    }

    /// Snapshot of `node` adopting its already-built children.
    fn assemble(node: &TreeNode, built: &mut [Option<NodeSnapshot>]) -> Self {
        NodeSnapshot {
            id: node.id(),
            name: node.name().to_string(),
            locked_by: node.locked_by(),
            locked_descendant_count: node.locked_descendant_count(),
            children: node
                .children()
                .iter()
                .filter_map(|&child| built[child].take())
                .collect(),
        }
    }

    /// Find the snapshot of `id` within this subtree.
    pub fn find(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.iter().find(|n| n.id == id)
    }

    /// Pre-order iteration over this node and all descendants.
    pub fn iter(&self) -> impl Iterator<Item = &NodeSnapshot> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    /// Number of nodes in this subtree, including this one.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Always false: a snapshot contains at least its own node.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Ids of every locked node in this subtree, pre-order.
    pub fn locked_nodes(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|n| n.locked_by.is_some())
            .map(|n| n.id)
            .collect()
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Serialize to an indented JSON string.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for NodeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pending = vec![(self, 0usize)];
        while let Some((node, depth)) = pending.pop() {
            write!(f, "{:indent$}{} (ID: {})", "", node.name, node.id, indent = depth * 2)?;
            if let Some(user) = node.locked_by {
                write!(f, " [LOCKED by User {}]", user)?;
            }
            if node.locked_descendant_count > 0 {
                write!(f, " [{} locked descendants]", node.locked_descendant_count)?;
            }
            writeln!(f)?;
            pending.extend(node.children.iter().rev().map(|child| (child, depth + 1)));
        }
        Ok(())
    }
}

impl Clone for NodeSnapshot {
    fn clone(&self) -> Self {
        // Reversed pre-order finishes every child before its parent; the
        // root comes first and is assembled from whatever remains.
        let mut finished: Vec<NodeSnapshot> = Vec::new();
        let nodes: Vec<&NodeSnapshot> = self.iter().skip(1).collect();

        for node in nodes.into_iter().rev() {
            let children = adopt(&mut finished, node.children.len());
            finished.push(NodeSnapshot {
                id: node.id,
                name: node.name.clone(),
                locked_by: node.locked_by,
                locked_descendant_count: node.locked_descendant_count,
                children,
            });
        }

        NodeSnapshot {
            id: self.id,
            name: self.name.clone(),
            locked_by: self.locked_by,
            locked_descendant_count: self.locked_descendant_count,
            children: adopt(&mut finished, self.children.len()),
        }
    }
}

/// Pop the last `count` finished subtrees, restoring their sibling order.
fn adopt(finished: &mut Vec<NodeSnapshot>, count: usize) -> Vec<NodeSnapshot> {
    let mut children = finished.split_off(finished.len().saturating_sub(count));
    children.reverse();
    children
}

impl PartialEq for NodeSnapshot {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some((a, b)) = pending.pop() {
            if a.id != b.id
                || a.name != b.name
                || a.locked_by != b.locked_by
                || a.locked_descendant_count != b.locked_descendant_count
                || a.children.len() != b.children.len()
            {
                return false;
            }
            pending.extend(a.children.iter().zip(&b.children));
        }
        true
    }
}

impl Eq for NodeSnapshot {}

impl Drop for NodeSnapshot {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}
