//! Lock, unlock and upgrade over a [`TreeStore`]
//!
//! # Algorithm
//!
//! Every node carries the number of held nodes strictly below it. With that
//! counter kept exact:
//!
//! - descendant conflicts are one load on the target (O(1))
//! - ancestor conflicts are a walk up the parent chain (O(depth))
//! - taking or releasing a node adjusts each ancestor's counter (O(depth))
//!
//! An upgrade replaces the caller's held descendants of a node with a single
//! hold on the node. It only descends into children whose counters are
//! nonzero, so it visits the M held descendants and their ancestor paths
//! rather than the whole subtree.
//!
//! All preconditions are evaluated before anything is written; a refused call
//! leaves the lock state exactly as it found it.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;

use crate::audit::{AuditSink, Operation, OperationLog, OperationResult, OperationStats};
use crate::config::LockConfig;
use crate::error::{Holder, InvariantViolation, LockError};
use crate::latch::{Discipline, Latches};
use crate::snapshot::NodeSnapshot;
use crate::tree::{NodeId, TreeNode, TreeStore, UserId};

/// Grants exclusive holds on tree nodes such that no held node has a held
/// ancestor or descendant.
///
/// The controller is `Send + Sync`; share it with `Arc` or scoped threads.
/// Concurrent calls are made safe by the configured [`Discipline`].
///
/// # Example
///
/// ```
/// use treelatch::{LockController, LockErrorKind};
///
/// let names = ["Root", "Child1", "Child2", "Child3", "GC1", "GC2", "GC3", "GC4"];
/// let parents = [-1, 0, 0, 0, 1, 1, 2, 2];
/// let locks = LockController::build(&names, &parents).unwrap();
///
/// locks.lock(4, 1).unwrap();
/// locks.lock(5, 1).unwrap();
///
/// // A held descendant blocks a plain lock, even for the same user...
/// let err = locks.lock(1, 1).unwrap_err();
/// assert_eq!(err.kind(), LockErrorKind::DescendantsLocked);
///
/// // ...but an upgrade swaps both holds for one on the parent.
/// locks.upgrade_lock(1, 1).unwrap();
/// assert_eq!(locks.locked_by(1), Some(1));
/// assert_eq!(locks.locked_by(4), None);
/// assert_eq!(locks.locked_descendant_count(1), Some(0));
/// ```
pub struct LockController {
    tree: TreeStore,
    config: LockConfig,
    latches: Latches,
    log: Option<Arc<OperationLog>>,
    stats: Arc<OperationStats>,
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl LockController {
    /// Create a controller over `tree` with default settings.
    pub fn new(tree: TreeStore) -> Self {
        Self::with_config(tree, LockConfig::default())
    }

    /// Create a controller over `tree` with the given settings.
    pub fn with_config(tree: TreeStore, config: LockConfig) -> Self {
        let log = config.record_operations.then(|| Arc::new(OperationLog::new()));
        let stats = Arc::new(OperationStats::new());

        let mut sinks: Vec<Arc<dyn AuditSink>> = Vec::new();
        if let Some(log) = &log {
            sinks.push(log.clone());
        }
        sinks.push(stats.clone());

        Self {
            tree,
            config,
            latches: Latches::new(config.discipline),
            log,
            stats,
            sinks,
        }
    }

    /// Build the tree from labels and parent ids and wrap it with defaults.
    ///
    /// # Errors
    ///
    /// [`TreeLatchError::Validation`](crate::TreeLatchError::Validation) when
    /// the input does not describe a single rooted tree.
    pub fn build<S: AsRef<str>>(names: &[S], parent_ids: &[i64]) -> crate::Result<Self> {
        Ok(Self::new(TreeStore::build(names, parent_ids)?))
    }

    /// Register an additional audit sink.
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// The underlying tree.
    pub fn tree(&self) -> &TreeStore {
        &self.tree
    }

    /// Active configuration.
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Active concurrency discipline.
    pub fn discipline(&self) -> Discipline {
        self.latches.discipline()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Operations
    // ═══════════════════════════════════════════════════════════════════

    /// Hold `node` for `user`.
    ///
    /// # Errors
    ///
    /// Checked in this order; the first failing check is reported:
    ///
    /// 1. `NodeNotFound` if the id is unknown
    /// 2. `AlreadyLocked` if anyone holds the node, the caller included
    /// 3. `DescendantsLocked` if any descendant is held, whoever holds it
    /// 4. `AncestorLocked` if any ancestor is held
    pub fn lock(&self, node: NodeId, user: UserId) -> Result<OperationResult, LockError> {
        self.execute(Operation::Lock, node, user, |target| {
            if let Some(owner) = target.locked_by() {
                return Err(LockError::AlreadyLocked {
                    node: target.id(),
                    owner,
                });
            }
            let count = target.locked_descendant_count();
            if count > 0 {
                return Err(LockError::DescendantsLocked {
                    node: target.id(),
                    count,
                });
            }
            self.check_ancestors(target)?;

            self.acquire(target, user);
            Ok(format!("Node {} locked by User {}", target.name(), user))
        })
    }

    /// Release `node`, which `user` must hold.
    ///
    /// # Errors
    ///
    /// `NodeNotFound` for an unknown id, `NotLockedOrWrongOwner` when the node
    /// is free or held by someone else (the `holder` field tells which).
    pub fn unlock(&self, node: NodeId, user: UserId) -> Result<OperationResult, LockError> {
        self.execute(Operation::Unlock, node, user, |target| {
            match target.locked_by() {
                Some(owner) if owner == user => {}
                holder => {
                    return Err(LockError::NotLockedOrWrongOwner {
                        node: target.id(),
                        user,
                        holder: holder.map_or(Holder::Unlocked, Holder::User),
                    })
                }
            }

            self.release(target);
            Ok(format!("Node {} unlocked by User {}", target.name(), user))
        })
    }

    /// Replace every hold `user` has below `node` with a single hold on `node`.
    ///
    /// # Errors
    ///
    /// Checked in this order:
    ///
    /// 1. `NodeNotFound` if the id is unknown
    /// 2. `AlreadyLocked` if the node itself is held
    /// 3. `AncestorLocked` if any ancestor is held
    /// 4. `NoLockedDescendants` if nothing below the node is held
    /// 5. `OwnershipMismatch` if some held descendant belongs to another user
    pub fn upgrade_lock(&self, node: NodeId, user: UserId) -> Result<OperationResult, LockError> {
        self.execute(Operation::Upgrade, node, user, |target| {
            if let Some(owner) = target.locked_by() {
                return Err(LockError::AlreadyLocked {
                    node: target.id(),
                    owner,
                });
            }
            self.check_ancestors(target)?;

            let locked = target.locked_descendant_count();
            if locked == 0 {
                return Err(LockError::NoLockedDescendants { node: target.id() });
            }

            let owned = self.held_below(target, user);
            if owned.len() != locked {
                return Err(LockError::OwnershipMismatch {
                    node: target.id(),
                    user,
                    owned: owned.len(),
                    locked,
                });
            }

            for descendant in &owned {
                self.release(descendant);
            }
            self.acquire(target, user);

            Ok(format!(
                "Node {} upgraded: unlocked {} descendants, locked by User {}",
                target.name(),
                owned.len(),
                user
            ))
        })
    }

    /// Release every hold and clear the audit sinks. Always succeeds.
    pub fn reset_all_locks(&self) {
        let _latch = self.latches.write_all(&self.tree);
        for node in self.tree.nodes() {
            node.clear();
        }
        for sink in &self.sinks {
            sink.reset();
        }
        tracing::info!(nodes = self.tree.len(), "all locks reset");
    }

    // ═══════════════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════════════

    /// Consistent copy of the whole tree's lock state.
    pub fn tree_state(&self) -> NodeSnapshot {
        let _latch = self.latches.read_all(&self.tree);
        NodeSnapshot::capture(&self.tree)
    }

    /// All recorded operations in completion order. Empty when the built-in
    /// log is disabled.
    pub fn operation_log(&self) -> Vec<OperationResult> {
        self.log.as_ref().map(|log| log.entries()).unwrap_or_default()
    }

    /// Drop recorded operations without touching any hold.
    pub fn clear_operation_log(&self) {
        if let Some(log) = &self.log {
            log.clear();
        }
    }

    /// Success and failure counters.
    pub fn stats(&self) -> &OperationStats {
        &self.stats
    }

    /// Whether `node` is held. False for unknown ids.
    pub fn is_locked(&self, node: NodeId) -> bool {
        self.tree.get(node).is_some_and(TreeNode::is_locked)
    }

    /// Holder of `node`, if any. `None` for unknown ids.
    pub fn locked_by(&self, node: NodeId) -> Option<UserId> {
        self.tree.get(node).and_then(TreeNode::locked_by)
    }

    /// Held descendants of `node`, or `None` for unknown ids.
    pub fn locked_descendant_count(&self, node: NodeId) -> Option<usize> {
        self.tree.get(node).map(TreeNode::locked_descendant_count)
    }

    /// Held nodes per user, users in order of first appearance in a
    /// breadth-first walk, nodes in breadth-first order.
    pub fn holdings(&self) -> IndexMap<UserId, Vec<NodeId>> {
        let _latch = self.latches.read_all(&self.tree);
        let mut holdings: IndexMap<UserId, Vec<NodeId>> = IndexMap::new();
        for node in self.tree.breadth_first(self.tree.root_id()) {
            if let Some(user) = node.locked_by() {
                holdings.entry(user).or_default().push(node.id());
            }
        }
        holdings
    }

    /// Recompute every counter from scratch and check mutual exclusion.
    ///
    /// # Errors
    ///
    /// The first [`InvariantViolation`] found: counters are checked
    /// bottom-up, then nested holds.
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        let _latch = self.latches.read_all(&self.tree);

        let mut actual = vec![0usize; self.tree.len()];
        for &id in self.tree.order().iter().rev() {
            let Some(node) = self.tree.get(id) else { continue };
            actual[id] = node
                .children()
                .iter()
                .filter_map(|&child| self.tree.get(child))
                .map(|child| actual[child.id()] + usize::from(child.is_locked()))
                .sum();

            let recorded = node.locked_descendant_count();
            if recorded != actual[id] {
                let violation = InvariantViolation::CounterMismatch {
                    node: id,
                    recorded,
                    actual: actual[id],
                };
                tracing::warn!(%violation, "lock tree invariant broken");
                return Err(violation);
            }
        }

        for node in self.tree.nodes().filter(|n| n.is_locked()) {
            if let Some(ancestor) = self.tree.ancestors(node.id()).find(|a| a.is_locked()) {
                let violation = InvariantViolation::NestedLocks {
                    ancestor: ancestor.id(),
                    descendant: node.id(),
                };
                tracing::warn!(%violation, "lock tree invariant broken");
                return Err(violation);
            }
        }

        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════

    /// Resolve, latch, run `apply`, and report the outcome to every sink
    /// before the latch is released.
    fn execute<F>(
        &self,
        operation: Operation,
        node_id: NodeId,
        user: UserId,
        apply: F,
    ) -> Result<OperationResult, LockError>
    where
        F: FnOnce(&TreeNode) -> Result<String, LockError>,
    {
        let started = Instant::now();

        let Some(node) = self.tree.get(node_id) else {
            let error = LockError::NodeNotFound { node: node_id };
            return Err(self.refuse(operation, node_id, user, error, started));
        };

        let _latch = self.latches.node(&self.tree, node);
        match apply(node) {
            Ok(summary) => {
                let elapsed = started.elapsed();
                let message = format!("{} ({:.2}ms)", summary, elapsed.as_secs_f64() * 1000.0);
                let result = OperationResult::succeeded(operation, node_id, user, message, elapsed);
                tracing::debug!(op = %operation, node = node_id, user, "operation applied");
                self.notify(&result);
                Ok(result)
            }
            Err(error) => Err(self.refuse(operation, node_id, user, error, started)),
        }
    }

    fn refuse(
        &self,
        operation: Operation,
        node_id: NodeId,
        user: UserId,
        error: LockError,
        started: Instant,
    ) -> LockError {
        let result = OperationResult::failed(operation, node_id, user, &error, started.elapsed());
        tracing::debug!(op = %operation, node = node_id, user, kind = ?error.kind(), "operation refused");
        self.notify(&result);
        error
    }

    fn notify(&self, result: &OperationResult) {
        for sink in &self.sinks {
            sink.record(result);
        }
    }

    fn check_ancestors(&self, node: &TreeNode) -> Result<(), LockError> {
        let held = self
            .tree
            .ancestors(node.id())
            .find_map(|a| a.locked_by().map(|owner| (a.id(), owner)));

        match held {
            Some((ancestor, owner)) => Err(LockError::AncestorLocked {
                node: node.id(),
                ancestor,
                owner,
            }),
            None => Ok(()),
        }
    }

    /// Descendants of `node` held by `user`, breadth-first. Subtrees whose
    /// counter is zero hold nothing and are skipped.
    fn held_below<'a>(&'a self, node: &'a TreeNode, user: UserId) -> Vec<&'a TreeNode> {
        let mut held = Vec::new();
        let mut frontier = vec![node];

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for current in frontier {
                for child in current.children().iter().filter_map(|&c| self.tree.get(c)) {
                    if child.locked_by() == Some(user) {
                        held.push(child);
                    }
                    if child.locked_descendant_count() > 0 {
                        next.push(child);
                    }
                }
            }
            frontier = next;
        }

        held
    }

    fn acquire(&self, node: &TreeNode, user: UserId) {
        node.set_owner(Some(user));
        for ancestor in self.tree.ancestors(node.id()) {
            ancestor.increment_locked_descendants();
        }
    }

    fn release(&self, node: &TreeNode) {
        node.set_owner(None);
        for ancestor in self.tree.ancestors(node.id()) {
            ancestor.decrement_locked_descendants();
        }
    }
}

impl fmt::Debug for LockController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockController")
            .field("nodes", &self.tree.len())
            .field("config", &self.config)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LockErrorKind;

    fn demo() -> LockController {
        LockController::build(
            &["Root", "Child1", "Child2", "Child3", "GC1", "GC2", "GC3", "GC4"],
            &[-1, 0, 0, 0, 1, 1, 2, 2],
        )
        .unwrap()
    }

    #[test]
    fn test_lock_counts_on_every_ancestor() {
        let locks = demo();
        locks.lock(4, 1).unwrap();
        assert_eq!(locks.locked_descendant_count(1), Some(1));
        assert_eq!(locks.locked_descendant_count(0), Some(1));
        assert_eq!(locks.locked_descendant_count(2), Some(0));
        assert_eq!(locks.locked_descendant_count(4), Some(0));
        locks.verify().unwrap();
    }

    #[test]
    fn test_already_locked_reported_before_descendants() {
        let locks = demo();
        locks.lock(1, 1).unwrap();
        let err = locks.lock(1, 1).unwrap_err();
        assert_eq!(err, LockError::AlreadyLocked { node: 1, owner: 1 });
    }

    #[test]
    fn test_descendant_conflict_on_root() {
        let locks = demo();
        locks.lock(4, 2).unwrap();
        let err = locks.lock(0, 1).unwrap_err();
        assert_eq!(err, LockError::DescendantsLocked { node: 0, count: 1 });
    }

    #[test]
    fn test_held_below_skips_empty_subtrees() {
        let locks = demo();
        locks.lock(4, 1).unwrap();
        locks.lock(6, 2).unwrap();
        let root = locks.tree().root();
        let held: Vec<_> = locks.held_below(root, 1).iter().map(|n| n.id()).collect();
        assert_eq!(held, vec![4]);
    }

    #[test]
    fn test_upgrade_reports_counts_on_mismatch() {
        let locks = demo();
        locks.lock(4, 1).unwrap();
        locks.lock(5, 2).unwrap();
        let err = locks.upgrade_lock(1, 1).unwrap_err();
        assert_eq!(
            err,
            LockError::OwnershipMismatch {
                node: 1,
                user: 1,
                owned: 1,
                locked: 2
            }
        );
    }

    #[test]
    fn test_refusals_are_logged() {
        let locks = demo();
        let _ = locks.unlock(3, 1);
        let log = locks.operation_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].error, Some(LockErrorKind::NotLockedOrWrongOwner));
    }

    #[test]
    fn test_log_disabled() {
        let tree = TreeStore::build(&["r", "a"], &[-1, 0]).unwrap();
        let locks = LockController::with_config(tree, LockConfig::new().with_record_operations(false));
        locks.lock(1, 1).unwrap();
        assert!(locks.operation_log().is_empty());
        assert_eq!(locks.stats().snapshot().locks, 1);
    }

    #[test]
    fn test_verify_detects_counter_drift() {
        let locks = demo();
        locks.tree().get(1).unwrap().increment_locked_descendants();
        assert_eq!(
            locks.verify(),
            Err(InvariantViolation::CounterMismatch {
                node: 1,
                recorded: 1,
                actual: 0
            })
        );
    }

    #[test]
    fn test_verify_detects_nested_holds() {
        let locks = demo();
        locks.lock(4, 1).unwrap();
        // Bypass the checks to plant a conflicting hold on the parent.
        locks.acquire(locks.tree().get(1).unwrap(), 2);
        assert_eq!(
            locks.verify(),
            Err(InvariantViolation::NestedLocks {
                ancestor: 1,
                descendant: 4
            })
        );
    }
}
