//! Error types for node operations.
//!
//! These cover programmer misuse detected at the call site of a mutation
//! (read-only storage, bad indexes, wrong node kinds) and malformed snapshots.
//! Conflicts between replicas are not errors; they are resolved while ops are
//! applied and only show up as change notifications.

use thiserror::Error;

use crate::NodeKind;
use crate::ids::NodeId;

/// Structured error types for node operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum NodeError {
    /// A node id is already registered in the document
    #[error("Node already attached: {id}")]
    AlreadyAttached { id: NodeId },

    /// No node with this id is registered in the document
    #[error("Node not found: {id}")]
    NodeNotFound { id: NodeId },

    /// The node exists but has a different kind than requested
    #[error("Node {id} type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        id: NodeId,
        expected: NodeKind,
        actual: NodeKind,
    },

    /// Storage was marked read-only
    #[error("Cannot modify storage: document is read-only")]
    ReadOnly,

    /// List index outside of `0..len` (or `0..=len` for inserts)
    #[error("List index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Undo and redo cannot run while a batch is open
    #[error("Cannot {action} during a batch")]
    HistoryDuringBatch { action: &'static str },

    /// A snapshot does not describe a single rooted tree
    #[error("Invalid snapshot: {reason}")]
    InvalidSnapshot { reason: String },
}

impl NodeError {
    /// Check if this error is a missing node
    pub fn is_not_found(&self) -> bool {
        matches!(self, NodeError::NodeNotFound { .. })
    }

    /// Check if this error was caused by read-only storage
    pub fn is_read_only(&self) -> bool {
        matches!(self, NodeError::ReadOnly)
    }

    /// Check if this error is a node kind mismatch
    pub fn is_type_error(&self) -> bool {
        matches!(self, NodeError::TypeMismatch { .. })
    }

    /// Check if this error is an out-of-bounds list index
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, NodeError::IndexOutOfBounds { .. })
    }

    /// Check if this error is about the structure of the tree
    pub fn is_structure_error(&self) -> bool {
        matches!(
            self,
            NodeError::AlreadyAttached { .. } | NodeError::InvalidSnapshot { .. }
        )
    }

    /// Get the node id this error refers to, if any
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            NodeError::AlreadyAttached { id }
            | NodeError::NodeNotFound { id }
            | NodeError::TypeMismatch { id, .. } => Some(id),
            _ => None,
        }
    }
}

// Conversion from NodeError to the main Error type
impl From<NodeError> for crate::Error {
    fn from(err: NodeError) -> Self {
        crate::Error::Node(err)
    }
}
