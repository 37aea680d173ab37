//! Lock controller configuration

use crate::latch::Discipline;

/// Configuration for a [`LockController`](crate::LockController).
///
/// # Example
///
/// ```
/// use treelatch::{Discipline, LockConfig};
///
/// let config = LockConfig::new()
///     .with_discipline(Discipline::Hierarchical)
///     .with_record_operations(false);
///
/// assert_eq!(config.discipline, Discipline::Hierarchical);
/// assert!(!config.record_operations);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// How concurrent calls are kept from interleaving
    pub discipline: Discipline,

    /// Whether the built-in operation log records every call
    pub record_operations: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            discipline: Discipline::Serialized,
            record_operations: true,
        }
    }
}

impl LockConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given concurrency discipline.
    pub fn with_discipline(mut self, discipline: Discipline) -> Self {
        self.discipline = discipline;
        self
    }

    /// Enable or disable the built-in operation log.
    pub fn with_record_operations(mut self, record: bool) -> Self {
        self.record_operations = record;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LockConfig::default();
        assert_eq!(config.discipline, Discipline::Serialized);
        assert!(config.record_operations);
        assert_eq!(config, LockConfig::new());
    }
}
