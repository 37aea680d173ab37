//! Error types for tree construction and lock operations

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::tree::{NodeId, UserId};

/// Rejected build input. A tree is never constructed from input that
/// produces one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `names` and `parent_ids` are not positionally aligned
    #[error("names and parent ids must have the same length ({names} names, {parents} parent ids)")]
    LengthMismatch {
        /// Number of labels supplied
        names: usize,
        /// Number of parent ids supplied
        parents: usize,
    },

    /// No entry carries the root sentinel
    #[error("no node is marked as root")]
    MissingRoot,

    /// More than one entry carries the root sentinel
    #[error("nodes {first} and {second} are both marked as root")]
    MultipleRoots {
        /// First root candidate
        first: NodeId,
        /// Second root candidate
        second: NodeId,
    },

    /// A parent id lies outside `[0, n)`
    #[error("node {node} references parent {parent}, outside 0..{len}")]
    ParentOutOfRange {
        /// The offending node
        node: NodeId,
        /// The parent id it declared
        parent: i64,
        /// Number of nodes in the input
        len: usize,
    },

    /// A node names itself as parent
    #[error("node {node} references itself as parent")]
    SelfParent {
        /// The offending node
        node: NodeId,
    },

    /// The parent links contain a cycle, so this node never reaches the root
    #[error("node {node} is not reachable from the root (parent cycle)")]
    Unreachable {
        /// A node on or below the cycle
        node: NodeId,
    },
}

/// Who holds a node when an unlock is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holder {
    /// Nobody holds the node
    Unlocked,
    /// Another user holds the node
    User(UserId),
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holder::Unlocked => write!(f, "it is not locked"),
            Holder::User(owner) => write!(f, "it is locked by user {}", owner),
        }
    }
}

/// A refused `lock`, `unlock` or `upgrade_lock` call.
///
/// Every refusal is detected before any lock state is touched, so the tree
/// is unchanged when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The node id does not exist in the tree
    #[error("node {node} not found")]
    NodeNotFound {
        /// Requested id
        node: NodeId,
    },

    /// The node is already held (by anyone, including the caller)
    #[error("node {node} is already locked by user {owner}")]
    AlreadyLocked {
        /// Target node
        node: NodeId,
        /// Current holder
        owner: UserId,
    },

    /// At least one descendant is held
    #[error("node {node} has {count} locked descendants")]
    DescendantsLocked {
        /// Target node
        node: NodeId,
        /// Number of held descendants
        count: usize,
    },

    /// A node on the ancestor chain is held
    #[error("node {node} has a locked ancestor ({ancestor}, held by user {owner})")]
    AncestorLocked {
        /// Target node
        node: NodeId,
        /// Nearest held ancestor
        ancestor: NodeId,
        /// Holder of that ancestor
        owner: UserId,
    },

    /// The caller does not hold the node
    #[error("node {node} cannot be unlocked by user {user}: {holder}")]
    NotLockedOrWrongOwner {
        /// Target node
        node: NodeId,
        /// Requesting user
        user: UserId,
        /// Actual holder
        holder: Holder,
    },

    /// Upgrade requested on a node whose subtree holds nothing
    #[error("node {node} has no locked descendants to upgrade")]
    NoLockedDescendants {
        /// Target node
        node: NodeId,
    },

    /// Upgrade requested while some held descendants belong to other users
    #[error("not all locked descendants of node {node} belong to user {user} ({owned} of {locked})")]
    OwnershipMismatch {
        /// Target node
        node: NodeId,
        /// Requesting user
        user: UserId,
        /// Descendants held by the requesting user
        owned: usize,
        /// Descendants held by anyone
        locked: usize,
    },
}

/// Fieldless discriminant of [`LockError`], carried by audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LockErrorKind {
    /// See [`LockError::NodeNotFound`]
    NodeNotFound,
    /// See [`LockError::AlreadyLocked`]
    AlreadyLocked,
    /// See [`LockError::DescendantsLocked`]
    DescendantsLocked,
    /// See [`LockError::AncestorLocked`]
    AncestorLocked,
    /// See [`LockError::NotLockedOrWrongOwner`]
    NotLockedOrWrongOwner,
    /// See [`LockError::NoLockedDescendants`]
    NoLockedDescendants,
    /// See [`LockError::OwnershipMismatch`]
    OwnershipMismatch,
}

impl LockError {
    /// The error's kind, without payload.
    pub fn kind(&self) -> LockErrorKind {
        match self {
            LockError::NodeNotFound { .. } => LockErrorKind::NodeNotFound,
            LockError::AlreadyLocked { .. } => LockErrorKind::AlreadyLocked,
            LockError::DescendantsLocked { .. } => LockErrorKind::DescendantsLocked,
            LockError::AncestorLocked { .. } => LockErrorKind::AncestorLocked,
            LockError::NotLockedOrWrongOwner { .. } => LockErrorKind::NotLockedOrWrongOwner,
            LockError::NoLockedDescendants { .. } => LockErrorKind::NoLockedDescendants,
            LockError::OwnershipMismatch { .. } => LockErrorKind::OwnershipMismatch,
        }
    }

    /// The node the refused call targeted.
    pub fn node(&self) -> NodeId {
        match self {
            LockError::NodeNotFound { node }
            | LockError::AlreadyLocked { node, .. }
            | LockError::DescendantsLocked { node, .. }
            | LockError::AncestorLocked { node, .. }
            | LockError::NotLockedOrWrongOwner { node, .. }
            | LockError::NoLockedDescendants { node }
            | LockError::OwnershipMismatch { node, .. } => *node,
        }
    }
}

/// Lock state that breaks the counter or mutual-exclusion invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A node's locked-descendant counter disagrees with its subtree
    #[error("node {node} records {recorded} locked descendants but has {actual}")]
    CounterMismatch {
        /// Offending node
        node: NodeId,
        /// Value stored in the counter
        recorded: usize,
        /// Value recomputed from the subtree
        actual: usize,
    },

    /// Both a node and one of its ancestors are held
    #[error("node {descendant} and its ancestor {ancestor} are both locked")]
    NestedLocks {
        /// Held ancestor
        ancestor: NodeId,
        /// Held descendant
        descendant: NodeId,
    },
}

/// Main error type for treelatch operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeLatchError {
    /// Tree construction failed
    #[error("invalid tree: {0}")]
    Validation(#[from] ValidationError),

    /// A lock operation was refused
    #[error("lock refused: {0}")]
    Lock(#[from] LockError),

    /// Lock state is inconsistent
    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
}

/// Result type alias for treelatch operations
pub type Result<T> = std::result::Result<T, TreeLatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let err = LockError::AncestorLocked {
            node: 4,
            ancestor: 0,
            owner: 1,
        };
        assert_eq!(err.kind(), LockErrorKind::AncestorLocked);
        assert_eq!(err.node(), 4);
    }

    #[test]
    fn test_unlock_detail_distinguishes_holder() {
        let unlocked = LockError::NotLockedOrWrongOwner {
            node: 4,
            user: 2,
            holder: Holder::Unlocked,
        };
        let other = LockError::NotLockedOrWrongOwner {
            node: 4,
            user: 2,
            holder: Holder::User(1),
        };
        assert_eq!(unlocked.kind(), other.kind());
        assert!(unlocked.to_string().contains("not locked"));
        assert!(other.to_string().contains("locked by user 1"));
    }

    #[test]
    fn test_umbrella_conversion() {
        let err: TreeLatchError = ValidationError::MissingRoot.into();
        assert!(matches!(err, TreeLatchError::Validation(_)));
        assert_eq!(err.to_string(), "invalid tree: no node is marked as root");
    }
}
