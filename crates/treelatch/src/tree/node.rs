//! A single node of the lockable tree

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::{NodeId, UserId};

/// Owner word of an unlocked node. Never produced by encoding a `UserId`.
const UNOWNED: u64 = u64::MAX;

/// A node in a [`TreeStore`](super::TreeStore).
///
/// Topology (`id`, `name`, `parent`, `children`, `depth`) is fixed when the
/// tree is built. The lock state is two atomics so that point queries never
/// wait on an in-flight operation; all writes to them happen under the
/// controller's latches.
#[derive(Debug)]
pub struct TreeNode {
    id: NodeId,
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    depth: usize,

    /// Encoded holder, `UNOWNED` when free
    owner: AtomicU64,

    /// Number of held proper descendants
    locked_descendants: AtomicUsize,

    /// Per-node latch used by the hierarchical discipline
    latch: RwLock<()>,
}

impl TreeNode {
    pub(super) fn new(id: NodeId, name: String, parent: Option<NodeId>) -> Self {
        Self {
            id,
            name,
            parent,
            children: Vec::new(),
            depth: 0,
            owner: AtomicU64::new(UNOWNED),
            locked_descendants: AtomicUsize::new(0),
            latch: RwLock::new(()),
        }
    }

    pub(super) fn push_child(&mut self, child: NodeId) {
        self.children.push(child);
    }

    pub(super) fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    // ═══════════════════════════════════════════════════════════════════
    // Topology
    // ═══════════════════════════════════════════════════════════════════

    /// Stable id, equal to the node's position in the build input.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Display label. Labels need not be unique.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent id, `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child ids in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Distance from the root (the root has depth 0).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether this node is the root.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Lock State
    // ═══════════════════════════════════════════════════════════════════

    /// The user holding this node, if any.
    pub fn locked_by(&self) -> Option<UserId> {
        UserId::try_from(self.owner.load(Ordering::Acquire)).ok()
    }

    /// Whether any user holds this node.
    pub fn is_locked(&self) -> bool {
        self.owner.load(Ordering::Acquire) != UNOWNED
    }

    /// Number of held nodes strictly below this one.
    pub fn locked_descendant_count(&self) -> usize {
        self.locked_descendants.load(Ordering::Acquire)
    }

    pub(crate) fn set_owner(&self, owner: Option<UserId>) {
        let raw = owner.map_or(UNOWNED, u64::from);
        self.owner.store(raw, Ordering::Release);
    }

    pub(crate) fn increment_locked_descendants(&self) {
        self.locked_descendants.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn decrement_locked_descendants(&self) {
        let previous = self.locked_descendants.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "locked-descendant counter underflow at node {}", self.id);
    }

    /// Drop all lock state (used by reset).
    pub(crate) fn clear(&self) {
        self.owner.store(UNOWNED, Ordering::Release);
        self.locked_descendants.store(0, Ordering::Release);
    }

    pub(crate) fn latch(&self) -> &RwLock<()> {
        &self.latch
    }
}
