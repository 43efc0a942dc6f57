//! Live nodes of a document.
//!
//! Nodes live in the pool's arena keyed by [`NodeId`]. A node never points at
//! its parent directly: the parent is another id stored in its [`ParentLink`],
//! and all traversal goes through the arena.
//!
//! Each node kind keeps its op-application logic in its own module, written as
//! `impl Pool` blocks because applying an op usually touches more than one
//! node (the parent, the child and the child's subtree).

use std::cell::OnceCell;
use std::fmt;

use crate::ids::{NodeId, OpId};
use crate::op::{Op, OpSource};
use crate::update::StorageUpdate;
use crate::value::Immutable;

pub(crate) mod list;
pub(crate) mod map;
pub(crate) mod record;
pub(crate) mod register;

pub(crate) use list::ListNode;
pub(crate) use map::MapNode;
pub(crate) use record::{Field, RecordNode};
pub(crate) use register::RegisterNode;

/// The four node shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Record,
    List,
    Map,
    Register,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Record => "Record",
            NodeKind::List => "List",
            NodeKind::Map => "Map",
            NodeKind::Register => "Register",
        };
        f.write_str(name)
    }
}

/// How a node hangs off its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParentLink {
    /// The root record.
    NoParent,
    /// Attached under `key` (record/map key or list position).
    HasParent { parent: NodeId, key: String },
    /// A hidden list item, displaced by a conflicting write or replaced by
    /// an unacknowledged undo. Still registered so that a later
    /// acknowledgment can bring it back.
    Orphaned { parent: NodeId, key: String },
}

impl ParentLink {
    pub(crate) fn parent(&self) -> Option<&NodeId> {
        match self {
            ParentLink::HasParent { parent, .. } | ParentLink::Orphaned { parent, .. } => {
                Some(parent)
            }
            ParentLink::NoParent => None,
        }
    }

    pub(crate) fn key(&self) -> Option<&str> {
        match self {
            ParentLink::HasParent { key, .. } | ParentLink::Orphaned { key, .. } => Some(key),
            ParentLink::NoParent => None,
        }
    }

    pub(crate) fn attached(parent: &NodeId, key: impl Into<String>) -> Self {
        ParentLink::HasParent {
            parent: parent.clone(),
            key: key.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum NodeBody {
    Record(RecordNode),
    List(ListNode),
    Map(MapNode),
    Register(RegisterNode),
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) id: NodeId,
    pub(crate) parent: ParentLink,
    pub(crate) body: NodeBody,
    /// Memoized `to_immutable` result. Cleared on this node and all its
    /// ancestors whenever the node changes.
    pub(crate) cache: OnceCell<Immutable>,
}

impl Node {
    pub(crate) fn new(id: NodeId, parent: ParentLink, body: NodeBody) -> Self {
        Self {
            id,
            parent,
            body,
            cache: OnceCell::new(),
        }
    }

    pub(crate) fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::Record(_) => NodeKind::Record,
            NodeBody::List(_) => NodeKind::List,
            NodeBody::Map(_) => NodeKind::Map,
            NodeBody::Register(_) => NodeKind::Register,
        }
    }

    /// Ids of the direct children, hidden list items included.
    pub(crate) fn child_ids(&self) -> Vec<NodeId> {
        match &self.body {
            NodeBody::Record(record) => record.child_ids().cloned().collect(),
            NodeBody::List(list) => list
                .items
                .iter()
                .chain(list.implicitly_deleted.iter())
                .cloned()
                .collect(),
            NodeBody::Map(map) => map.entries.values().cloned().collect(),
            NodeBody::Register(_) => Vec::new(),
        }
    }
}

/// Outcome of applying one op to the tree.
#[derive(Debug)]
pub(crate) enum ApplyResult {
    NotModified,
    Modified {
        update: StorageUpdate,
        /// Ops restoring the state before this op, in application order.
        reverse: Vec<Op>,
    },
}

impl ApplyResult {
    pub(crate) fn modified(update: StorageUpdate, reverse: Vec<Op>) -> Self {
        ApplyResult::Modified { update, reverse }
    }
}

/// Decision for an inbound write to a record or map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyWrite {
    /// Write the value.
    Apply,
    /// The op is the relay of our pending write: clear the marker, change nothing.
    Acknowledge,
    /// A local write to the key is pending: the local value stays until it is acknowledged.
    Ignore,
}

/// Per-key policy shared by records and maps. `pending` is the op id of the
/// last unacknowledged local write to the key.
pub(crate) fn resolve_key_write(
    pending: Option<&OpId>,
    op_id: Option<&OpId>,
    source: OpSource,
) -> KeyWrite {
    match (source, pending) {
        (OpSource::UndoRedo, _) => KeyWrite::Apply,
        (OpSource::Remote | OpSource::Ack, None) => KeyWrite::Apply,
        (OpSource::Remote | OpSource::Ack, Some(pending)) if Some(pending) == op_id => {
            KeyWrite::Acknowledge
        }
        (OpSource::Remote | OpSource::Ack, Some(_)) => KeyWrite::Ignore,
    }
}
