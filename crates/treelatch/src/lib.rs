//! # Treelatch
//!
//! A hierarchical lock coordinator for N-ary trees.
//!
//! Treelatch grants a user exclusive hold of a tree node such that no
//! ancestor and no descendant of a held node is held at the same time.
//! Each node tracks how many of its descendants are held, so a lock attempt
//! never scans the subtree: descendant conflicts cost O(1), ancestor
//! conflicts and counter maintenance cost O(depth).
//!
//! ## Architecture
//!
//! - **Tree Store**: immutable node arena built from labels and parent ids
//! - **Lock Controller**: `lock`, `unlock`, `upgrade_lock`, reset, snapshots
//! - **Latches**: the concurrency discipline that keeps check-then-commit
//!   sequences from interleaving
//! - **Audit Sinks**: observers notified of every completed operation
//!
//! ## Example
//!
//! ```
//! use treelatch::{LockController, LockErrorKind};
//!
//! let locks = LockController::build(&["Root", "Child1", "GC1"], &[-1, 0, 1]).unwrap();
//!
//! locks.lock(0, 1).unwrap();
//! let err = locks.lock(2, 2).unwrap_err();
//! assert_eq!(err.kind(), LockErrorKind::AncestorLocked);
//!
//! locks.unlock(0, 1).unwrap();
//! assert!(locks.lock(2, 2).is_ok());
//!
//! println!("{}", locks.tree_state());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod config;
pub mod controller;
pub mod error;
pub mod latch;
pub mod snapshot;
pub mod tree;

// Re-export main types
pub use audit::{
    AuditSink, Operation, OperationLog, OperationResult, OperationStats, StatsSnapshot,
};
pub use config::LockConfig;
pub use controller::LockController;
pub use error::{
    Holder, InvariantViolation, LockError, LockErrorKind, Result, TreeLatchError, ValidationError,
};
pub use latch::Discipline;
pub use snapshot::NodeSnapshot;
pub use tree::{NodeId, TreeBuilder, TreeNode, TreeStore, UserId, ROOT_SENTINEL};

/// Treelatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
