//! Flat snapshots of a document and diffs between them.
//!
//! A snapshot is a list of `(id, node)` pairs, parents before children, in
//! the JSON form the authority sends on connect:
//!
//! ```json
//! [["root", {"type": "Record", "data": {"title": "x"}}],
//!  ["0:1", {"type": "List", "parent_id": "root", "parent_key": "items"}]]
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::NodeError;
use crate::ids::NodeId;
use crate::node::NodeKind;
use crate::op::{CreateKind, CreateOp, Op};
use crate::value::JsonObject;

/// One node of a snapshot. Only the root record has no parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SerializedNode {
    Record {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<NodeId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_key: Option<String>,
        data: JsonObject,
    },
    List {
        parent_id: NodeId,
        parent_key: String,
    },
    Map {
        parent_id: NodeId,
        parent_key: String,
    },
    Register {
        parent_id: NodeId,
        parent_key: String,
        data: Value,
    },
}

impl SerializedNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            SerializedNode::Record { .. } => NodeKind::Record,
            SerializedNode::List { .. } => NodeKind::List,
            SerializedNode::Map { .. } => NodeKind::Map,
            SerializedNode::Register { .. } => NodeKind::Register,
        }
    }

    pub fn parent_id(&self) -> Option<&NodeId> {
        match self {
            SerializedNode::Record { parent_id, .. } => parent_id.as_ref(),
            SerializedNode::List { parent_id, .. }
            | SerializedNode::Map { parent_id, .. }
            | SerializedNode::Register { parent_id, .. } => Some(parent_id),
        }
    }

    pub fn parent_key(&self) -> Option<&str> {
        match self {
            SerializedNode::Record { parent_key, .. } => parent_key.as_deref(),
            SerializedNode::List { parent_key, .. }
            | SerializedNode::Map { parent_key, .. }
            | SerializedNode::Register { parent_key, .. } => Some(parent_key),
        }
    }

    fn create_kind(&self) -> CreateKind {
        match self {
            SerializedNode::Record { data, .. } => CreateKind::Record { data: data.clone() },
            SerializedNode::List { .. } => CreateKind::List,
            SerializedNode::Map { .. } => CreateKind::Map,
            SerializedNode::Register { data, .. } => CreateKind::Register { data: data.clone() },
        }
    }
}

/// A whole document in snapshot form.
pub type Snapshot = Vec<(NodeId, SerializedNode)>;

/// Parses the JSON snapshot form.
pub fn from_json(json: &str) -> crate::Result<Snapshot> {
    Ok(serde_json::from_str(json)?)
}

/// Ops turning the tree `current` into the tree `next`.
///
/// Removed nodes are deleted, changed record data is rewritten, list items
/// whose position changed are moved and new nodes are created. The ops carry
/// no op ids; they are meant to be applied locally as remote ops.
pub fn diff(current: &[(NodeId, SerializedNode)], next: &[(NodeId, SerializedNode)]) -> Result<Vec<Op>, NodeError> {
    let current_nodes: HashMap<&NodeId, &SerializedNode> =
        current.iter().map(|(id, node)| (id, node)).collect();
    let next_nodes: HashMap<&NodeId, &SerializedNode> =
        next.iter().map(|(id, node)| (id, node)).collect();

    let mut ops = Vec::new();
    for (id, _) in current {
        if !next_nodes.contains_key(id) {
            ops.push(Op::DeleteNode {
                op_id: None,
                id: id.clone(),
            });
        }
    }

    for (id, node) in next {
        match current_nodes.get(id) {
            Some(existing) => {
                if existing.kind() != node.kind() {
                    return Err(NodeError::InvalidSnapshot {
                        reason: format!("node {id} changed kind from {} to {}", existing.kind(), node.kind()),
                    });
                }
                if let (
                    SerializedNode::Record { data: old, .. },
                    SerializedNode::Record { data: new, .. },
                ) = (existing, node)
                {
                    if old != new {
                        ops.push(Op::UpdateRecord {
                            op_id: None,
                            id: id.clone(),
                            data: new.clone(),
                        });
                    }
                    for key in old.keys().filter(|key| !new.contains_key(*key)) {
                        ops.push(Op::DeleteKey {
                            op_id: None,
                            id: id.clone(),
                            key: key.clone(),
                        });
                    }
                }
                let parent_is_list = node
                    .parent_id()
                    .and_then(|parent| next_nodes.get(parent))
                    .is_some_and(|parent| parent.kind() == NodeKind::List);
                if parent_is_list && existing.parent_key() != node.parent_key() {
                    if let Some(key) = node.parent_key() {
                        ops.push(Op::SetParentKey {
                            op_id: None,
                            id: id.clone(),
                            parent_key: key.to_string(),
                        });
                    }
                }
            }
            None => {
                let (Some(parent_id), Some(parent_key)) = (node.parent_id(), node.parent_key()) else {
                    return Err(NodeError::InvalidSnapshot {
                        reason: format!("new node {id} has no parent"),
                    });
                };
                ops.push(Op::Create(CreateOp {
                    op_id: None,
                    id: id.clone(),
                    parent_id: parent_id.clone(),
                    parent_key: parent_key.to_string(),
                    kind: node.create_kind(),
                    intent: None,
                    superseded_id: None,
                }));
            }
        }
    }
    Ok(ops)
}
