//! Operation records and the sinks that observe them
//!
//! The controller reports every completed `lock`, `unlock` and
//! `upgrade_lock` call, successful or not, as an [`OperationResult`] to each
//! registered [`AuditSink`]. Two sinks ship with the crate:
//!
//! - [`OperationLog`]: the append-only trail returned by
//!   `LockController::operation_log`
//! - [`OperationStats`]: success counters per operation kind and per user

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Serialize, Serializer};

use crate::error::{LockError, LockErrorKind};
use crate::tree::{NodeId, UserId};

/// The kind of a lock operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// `lock`
    Lock,
    /// `unlock`
    Unlock,
    /// `upgrade_lock`
    Upgrade,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Lock => write!(f, "lock"),
            Operation::Unlock => write!(f, "unlock"),
            Operation::Upgrade => write!(f, "upgrade"),
        }
    }
}

/// Record of one completed call.
///
/// `message` is for humans; the decision is carried by `success` and
/// `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    /// Whether the call took effect
    pub success: bool,

    /// Human-readable outcome
    pub message: String,

    /// Which operation was called
    pub operation: Operation,

    /// Target node id as requested
    pub node_id: NodeId,

    /// Requesting user
    pub user_id: UserId,

    /// Completion time, milliseconds since the Unix epoch
    pub timestamp: u64,

    /// Time spent inside the controller; serialized as `elapsedMs`
    #[serde(rename = "elapsedMs", serialize_with = "serialize_millis")]
    pub elapsed: Duration,

    /// Refusal reason, `None` on success
    pub error: Option<LockErrorKind>,
}

impl OperationResult {
    pub(crate) fn succeeded(
        operation: Operation,
        node_id: NodeId,
        user_id: UserId,
        message: String,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: true,
            message,
            operation,
            node_id,
            user_id,
            timestamp: now_millis(),
            elapsed,
            error: None,
        }
    }

    pub(crate) fn failed(
        operation: Operation,
        node_id: NodeId,
        user_id: UserId,
        error: &LockError,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            operation,
            node_id,
            user_id,
            timestamp: now_millis(),
            elapsed,
            error: Some(error.kind()),
        }
    }
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_nanos() as f64 / 1_000_000.0)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Observer notified of every completed lock operation.
///
/// Sinks are called while the operation's latches are still held, so
/// conflicting operations are reported in the order they took effect.
/// Implementations must be cheap and must not call back into the controller.
pub trait AuditSink: Send + Sync {
    /// Observe one completed operation.
    fn record(&self, result: &OperationResult);

    /// Forget everything observed so far. Called by `reset_all_locks`.
    fn reset(&self) {}
}

// ═══════════════════════════════════════════════════════════════════════
// Operation Log
// ═══════════════════════════════════════════════════════════════════════

/// Append-only, in-memory operation trail.
#[derive(Debug, Default)]
pub struct OperationLog {
    entries: Mutex<Vec<OperationResult>>,
}

impl OperationLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all entries in completion order.
    pub fn entries(&self) -> Vec<OperationResult> {
        self.entries.lock().clone()
    }

    /// The most recent entry.
    pub fn last(&self) -> Option<OperationResult> {
        self.entries.lock().last().cloned()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl AuditSink for OperationLog {
    fn record(&self, result: &OperationResult) {
        self.entries.lock().push(result.clone());
    }

    fn reset(&self) {
        self.clear();
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Operation Statistics
// ═══════════════════════════════════════════════════════════════════════

/// Point-in-time copy of [`OperationStats`] totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Successful `lock` calls
    pub locks: usize,
    /// Successful `unlock` calls
    pub unlocks: usize,
    /// Successful `upgrade_lock` calls
    pub upgrades: usize,
    /// Refused calls of any kind
    pub failures: usize,
}

/// Counts successful operations by kind and by user.
#[derive(Debug, Default)]
pub struct OperationStats {
    locks: AtomicUsize,
    unlocks: AtomicUsize,
    upgrades: AtomicUsize,
    failures: AtomicUsize,
    by_user: DashMap<UserId, usize>,
}

impl OperationStats {
    /// Create zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current totals.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            locks: self.locks.load(Ordering::Relaxed),
            unlocks: self.unlocks.load(Ordering::Relaxed),
            upgrades: self.upgrades.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Successful operations performed by `user`.
    pub fn successes_for(&self, user: UserId) -> usize {
        self.by_user.get(&user).map_or(0, |count| *count)
    }
}

impl AuditSink for OperationStats {
    fn record(&self, result: &OperationResult) {
        if !result.success {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let counter = match result.operation {
            Operation::Lock => &self.locks,
            Operation::Unlock => &self.unlocks,
            Operation::Upgrade => &self.upgrades,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        *self.by_user.entry(result.user_id).or_insert(0) += 1;
    }

    fn reset(&self) {
        self.locks.store(0, Ordering::Relaxed);
        self.unlocks.store(0, Ordering::Relaxed);
        self.upgrades.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.by_user.clear();
    }
}
