//!
//! livetree: convergent, tree-shaped documents for real-time collaboration.
//!
//! Several clients edit a shared document optimistically. Each local mutation
//! is applied immediately and turned into ops that an ordering authority
//! relays to every replica; replicas that have exchanged the same ops end up
//! with identical trees regardless of arrival order.
//!
//! ## Core Concepts
//!
//! * **Documents (`document::Document`)**: Own the node arena, identifier generation, the
//!   dispatch of local ops, undo/redo history and change notifications.
//! * **Nodes**: Four shapes addressed by stable [`ids::NodeId`]s:
//!     * **Records**: Named fields, each a JSON value or a nested node. Last writer wins per key.
//!     * **Lists**: Children ordered by fractional [`position::Position`]s.
//!     * **Maps**: Open key sets whose values are all nodes.
//!     * **Registers**: Opaque JSON leaves, so that list and map entries are addressable.
//! * **Ops (`op::Op`)**: The protocol exchanged with the ordering authority. Each inbound op is
//!   applied as Remote, Ack (confirmation of an own op) or UndoRedo, which selects the
//!   conflict-resolution branch.
//! * **Snapshots (`snapshot`)**: Flat `(id, node)` lists used for initial load, resync and
//!   tree diffs.
//! * **Immutable values (`value::Immutable`)**: Cached, reference-counted projections of the
//!   live tree. Unchanged subtrees keep their allocation between mutations.

pub mod constants;
pub mod document;
pub mod errors;
pub mod hooks;
pub mod ids;
pub mod op;
pub mod position;
pub mod snapshot;
pub mod update;
pub mod value;

mod history;
mod node;
mod pool;

pub use document::{Child, Document, ListMut, MapMut, RecordMut};
pub use errors::NodeError;
pub use hooks::StorageHook;
pub use ids::{NodeId, OpId};
pub use node::NodeKind;
pub use op::{Op, OpSource};
pub use position::Position;
pub use snapshot::{SerializedNode, Snapshot};
pub use update::{KeyUpdate, ListDelta, StorageUpdate};
pub use value::{Immutable, Lson};

/// Result type used throughout the livetree library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the livetree library.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured node errors from the errors module
    #[error(transparent)]
    Node(errors::NodeError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Node(_) => "node",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a node was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Node(node_err) => node_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error was caused by read-only storage.
    pub fn is_read_only(&self) -> bool {
        match self {
            Error::Node(node_err) => node_err.is_read_only(),
            _ => false,
        }
    }

    /// Check if this error is a misuse of the node API (bad index, wrong kind).
    pub fn is_usage_error(&self) -> bool {
        match self {
            Error::Node(node_err) => node_err.is_out_of_bounds() || node_err.is_type_error(),
            _ => false,
        }
    }

    /// Check if this error is serialization-related.
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, Error::Serialize(_))
    }
}
