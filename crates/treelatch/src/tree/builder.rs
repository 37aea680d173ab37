//! Incremental construction of a tree description

use super::{NodeId, TreeStore, ROOT_SENTINEL};
use crate::error::ValidationError;

/// Collects labels and parent links, then validates them in one
/// [`TreeStore::build`] call.
///
/// Ids are handed out in insertion order, so a node may name any earlier or
/// later id as its parent; the whole description is only checked by `build`.
///
/// # Example
///
/// ```
/// use treelatch::TreeStore;
///
/// let mut builder = TreeStore::builder();
/// let root = builder.root("Root");
/// let child = builder.child("Child1", root);
/// builder.child("GC1", child);
///
/// let tree = builder.build().unwrap();
/// assert_eq!(tree.len(), 3);
/// assert_eq!(tree.depth(2), Some(2));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TreeBuilder {
    names: Vec<String>,
    parents: Vec<i64>,
}

impl TreeBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the root node and return its id.
    pub fn root(&mut self, name: impl Into<String>) -> NodeId {
        self.push(name.into(), ROOT_SENTINEL)
    }

    /// Add a node under `parent` and return its id.
    pub fn child(&mut self, name: impl Into<String>, parent: NodeId) -> NodeId {
        let parent = i64::try_from(parent).unwrap_or(i64::MAX);
        self.push(name.into(), parent)
    }

    /// Add a node with a raw parent id, as it would appear in build input.
    pub fn node(&mut self, name: impl Into<String>, parent: i64) -> NodeId {
        self.push(name.into(), parent)
    }

    fn push(&mut self, name: String, parent: i64) -> NodeId {
        self.names.push(name);
        self.parents.push(parent);
        self.names.len() - 1
    }

    /// Number of nodes added so far.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no node has been added.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Validate the description and build the tree.
    pub fn build(&self) -> Result<TreeStore, ValidationError> {
        TreeStore::build(self.names.as_slice(), self.parents.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_assigns_sequential_ids() {
        let mut builder = TreeBuilder::new();
        assert!(builder.is_empty());
        assert_eq!(builder.root("r"), 0);
        assert_eq!(builder.child("a", 0), 1);
        assert_eq!(builder.node("b", 0), 2);
        assert_eq!(builder.len(), 3);
    }

    #[test]
    fn test_builder_reports_validation_errors() {
        let mut builder = TreeBuilder::new();
        builder.child("orphan", 5);
        assert_eq!(builder.build().unwrap_err(), ValidationError::MissingRoot);

        builder.root("r");
        assert_eq!(
            builder.build().unwrap_err(),
            ValidationError::ParentOutOfRange {
                node: 0,
                parent: 5,
                len: 2
            }
        );
    }
}
