//! Error types for document tree operations.

use thiserror::Error;

use super::{NodeId, ObserverId};

/// Errors raised by the in-memory document tree.
///
/// These indicate a logic defect in the caller (stale node ids, structural
/// violations) rather than a recoverable runtime condition.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomError {
    /// The node id does not belong to this document.
    #[error("Node not found: {node}")]
    NodeNotFound { node: NodeId },

    /// An element-only operation was applied to a non-element node.
    #[error("Node {node} is not an element")]
    NotAnElement { node: NodeId },

    /// A text-only operation was applied to a non-text node.
    #[error("Node {node} is not a text node")]
    NotAText { node: NodeId },

    /// The insertion would make a node its own ancestor, move the root,
    /// or reference a node that is not a child of the given parent.
    #[error("Hierarchy violation at {node}: {reason}")]
    HierarchyViolation { node: NodeId, reason: String },

    /// The observer was never registered or has been disconnected.
    #[error("Observer not found: {observer}")]
    ObserverNotFound { observer: ObserverId },
}

impl DomError {
    /// Check if this error indicates a missing node or observer.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DomError::NodeNotFound { .. } | DomError::ObserverNotFound { .. }
        )
    }

    /// Check if this error was caused by applying an operation to the wrong node kind.
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            DomError::NotAnElement { .. } | DomError::NotAText { .. }
        )
    }

    /// Check if this error is a structural violation.
    pub fn is_hierarchy_error(&self) -> bool {
        matches!(self, DomError::HierarchyViolation { .. })
    }
}

impl From<DomError> for crate::Error {
    fn from(err: DomError) -> Self {
        crate::Error::Dom(err)
    }
}
