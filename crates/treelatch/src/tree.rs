//! Immutable tree topology: the node arena and id lookup

mod builder;
mod node;

pub use builder::TreeBuilder;
pub use node::TreeNode;

use std::collections::VecDeque;

use crate::error::ValidationError;

/// Stable node id: the node's position in the build input.
pub type NodeId = usize;

/// Identifier of a user requesting locks.
pub type UserId = u32;

/// Parent id marking the root in build input.
pub const ROOT_SENTINEL: i64 = -1;

/// The node arena of a lockable tree.
///
/// Built once from two aligned sequences (labels and parent ids) and never
/// reshaped afterwards. Nodes live in a flat `Vec` indexed by id; parents are
/// plain indices, so there are no reference cycles.
///
/// # Example
///
/// ```
/// use treelatch::TreeStore;
///
/// let tree = TreeStore::build(&["Root", "Child1", "Child2", "GC1"], &[-1, 0, 0, 1]).unwrap();
///
/// assert_eq!(tree.len(), 4);
/// assert_eq!(tree.root().name(), "Root");
/// assert_eq!(tree.get(1).map(|n| n.children()), Some(&[3][..]));
///
/// let chain: Vec<_> = tree.ancestors(3).map(|n| n.id()).collect();
/// assert_eq!(chain, vec![1, 0]);
/// ```
#[derive(Debug)]
pub struct TreeStore {
    nodes: Vec<TreeNode>,
    root: NodeId,

    /// All ids in breadth-first order from the root. Every ancestor precedes
    /// its descendants, which makes this the global latch acquisition order.
    order: Vec<NodeId>,
}

impl TreeStore {
    /// Build a tree from labels and positionally aligned parent ids.
    ///
    /// Exactly one entry of `parent_ids` must be [`ROOT_SENTINEL`]; every other
    /// entry must name another node in `0..n`. Children keep input order.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the sequences differ in length, the
    /// root is missing or duplicated, a parent id is out of range or
    /// self-referential, or the parent links form a cycle.
    pub fn build<S: AsRef<str>>(names: &[S], parent_ids: &[i64]) -> Result<Self, ValidationError> {
        if names.len() != parent_ids.len() {
            return Err(ValidationError::LengthMismatch {
                names: names.len(),
                parents: parent_ids.len(),
            });
        }

        let root = find_root(parent_ids)?;
        let len = names.len();

        let mut parents = Vec::with_capacity(len);
        for (node, &parent) in parent_ids.iter().enumerate() {
            if parent == ROOT_SENTINEL {
                parents.push(None);
                continue;
            }
            let parent_id = usize::try_from(parent)
                .ok()
                .filter(|&p| p < len)
                .ok_or(ValidationError::ParentOutOfRange { node, parent, len })?;
            if parent_id == node {
                return Err(ValidationError::SelfParent { node });
            }
            parents.push(Some(parent_id));
        }

        let mut nodes: Vec<TreeNode> = names
            .iter()
            .zip(&parents)
            .enumerate()
            .map(|(id, (name, &parent))| TreeNode::new(id, name.as_ref().to_string(), parent))
            .collect();

        for (child, parent) in parents.iter().enumerate() {
            if let Some(parent) = *parent {
                nodes[parent].push_child(child);
            }
        }

        let order = breadth_first_order(&mut nodes, root);
        if order.len() != len {
            let mut reached = vec![false; len];
            for &id in &order {
                reached[id] = true;
            }
            let node = reached.iter().position(|r| !r).unwrap_or(root);
            return Err(ValidationError::Unreachable { node });
        }

        tracing::info!(nodes = len, root, "built lock tree");

        Ok(Self { nodes, root, order })
    }

    /// Start a [`TreeBuilder`].
    pub fn builder() -> TreeBuilder {
        TreeBuilder::new()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Lookup
    // ═══════════════════════════════════════════════════════════════════

    /// Look up a node by id.
    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    /// The root node.
    pub fn root(&self) -> &TreeNode {
        &self.nodes[self.root]
    }

    /// Id of the root node.
    pub fn root_id(&self) -> NodeId {
        self.root
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a built tree; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Distance of a node from the root.
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.get(id).map(TreeNode::depth)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Traversal
    // ═══════════════════════════════════════════════════════════════════

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.iter()
    }

    /// The ancestor chain of `id`: its parent, then the parent's parent, up to
    /// the root. Empty for the root and for unknown ids.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.get(id).and_then(TreeNode::parent),
        }
    }

    /// Breadth-first walk of the subtree rooted at `id`, starting with `id`
    /// itself. Empty for unknown ids.
    pub fn breadth_first(&self, id: NodeId) -> BreadthFirst<'_> {
        let mut queue = VecDeque::new();
        if id < self.nodes.len() {
            queue.push_back(id);
        }
        BreadthFirst { tree: self, queue }
    }

    /// Ids in global breadth-first order (ancestors before descendants).
    pub(crate) fn order(&self) -> &[NodeId] {
        &self.order
    }
}

fn find_root(parent_ids: &[i64]) -> Result<NodeId, ValidationError> {
    let mut root = None;
    for (node, &parent) in parent_ids.iter().enumerate() {
        if parent != ROOT_SENTINEL {
            continue;
        }
        if let Some(first) = root {
            return Err(ValidationError::MultipleRoots {
                first,
                second: node,
            });
        }
        root = Some(node);
    }
    root.ok_or(ValidationError::MissingRoot)
}

/// Assign depths and return the breadth-first order of everything reachable
/// from `root`.
fn breadth_first_order(nodes: &mut [TreeNode], root: NodeId) -> Vec<NodeId> {
    let mut order = Vec::with_capacity(nodes.len());
    let mut queue = VecDeque::from([(root, 0)]);

    while let Some((id, depth)) = queue.pop_front() {
        nodes[id].set_depth(depth);
        order.push(id);
        for &child in nodes[id].children() {
            queue.push_back((child, depth + 1));
        }
    }

    order
}

/// Iterator over a node's ancestor chain. See [`TreeStore::ancestors`].
pub struct Ancestors<'a> {
    tree: &'a TreeStore,
    next: Option<NodeId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.tree.get(self.next?)?;
        self.next = node.parent();
        Some(node)
    }
}

/// Breadth-first subtree iterator. See [`TreeStore::breadth_first`].
pub struct BreadthFirst<'a> {
    tree: &'a TreeStore,
    queue: VecDeque<NodeId>,
}

impl<'a> Iterator for BreadthFirst<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.tree.get(self.queue.pop_front()?)?;
        self.queue.extend(node.children());
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TreeStore {
        TreeStore::build(
            &["Root", "Child1", "Child2", "Child3", "GC1", "GC2", "GC3", "GC4"],
            &[-1, 0, 0, 0, 1, 1, 2, 2],
        )
        .unwrap()
    }

    #[test]
    fn test_build_links_children_in_order() {
        let tree = sample();
        assert_eq!(tree.root_id(), 0);
        assert_eq!(tree.root().children(), &[1, 2, 3]);
        assert_eq!(tree.get(1).unwrap().children(), &[4, 5]);
        assert_eq!(tree.get(2).unwrap().children(), &[6, 7]);
        assert!(tree.get(3).unwrap().children().is_empty());
    }

    #[test]
    fn test_depths() {
        let tree = sample();
        assert_eq!(tree.depth(0), Some(0));
        assert_eq!(tree.depth(3), Some(1));
        assert_eq!(tree.depth(7), Some(2));
        assert_eq!(tree.depth(8), None);
    }

    #[test]
    fn test_order_puts_ancestors_first() {
        let tree = TreeStore::build(&["a", "b", "c", "d"], &[2, 3, -1, 2]).unwrap();
        assert_eq!(tree.root_id(), 2);
        assert_eq!(tree.order(), &[2, 0, 3, 1]);
    }

    #[test]
    fn test_root_not_at_index_zero() {
        let tree = TreeStore::build(&["leaf", "root"], &[1, -1]).unwrap();
        assert_eq!(tree.root().name(), "root");
        assert_eq!(tree.get(0).unwrap().parent(), Some(1));
    }

    #[test]
    fn test_breadth_first_subtree() {
        let tree = sample();
        let ids: Vec<_> = tree.breadth_first(1).map(TreeNode::id).collect();
        assert_eq!(ids, vec![1, 4, 5]);
        assert_eq!(tree.breadth_first(99).count(), 0);
    }

    #[test]
    fn test_ancestors_of_root_is_empty() {
        let tree = sample();
        assert_eq!(tree.ancestors(0).count(), 0);
        assert_eq!(tree.ancestors(42).count(), 0);
    }

    #[test]
    fn test_cycle_is_rejected() {
        // 0 is the root; 1 and 2 point at each other.
        let err = TreeStore::build(&["r", "a", "b"], &[-1, 2, 1]).unwrap_err();
        assert_eq!(err, ValidationError::Unreachable { node: 1 });
    }
}
