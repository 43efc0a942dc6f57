//! The op protocol exchanged between replicas and the ordering authority.
//!
//! Internally an [`Op`] groups the four creation ops into a single
//! [`Op::Create`] variant so that conflict handling can treat them uniformly.
//! On the wire every op is a flat JSON object tagged by `type`:
//!
//! ```json
//! {"type":"CreateRegister","op_id":"1:4","id":"1:3","parent_id":"0:1","parent_key":"!","data":"a"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{NodeId, OpId};
use crate::value::JsonObject;

/// Where an op being applied comes from. Selects the conflict-resolution
/// branch taken by every node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpSource {
    /// An op from another replica, never seen locally before.
    Remote,
    /// The authority relaying back one of this replica's own ops.
    Ack,
    /// A reverse op replayed locally by undo or redo.
    UndoRedo,
}

/// Marks a creation op that replaces an existing list item in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Set,
}

/// Shape and initial payload of a node created by a [`CreateOp`].
#[derive(Debug, Clone, PartialEq)]
pub enum CreateKind {
    Record { data: JsonObject },
    List,
    Map,
    Register { data: Value },
}

/// Creation of a node under an existing parent.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOp {
    pub op_id: Option<OpId>,
    pub id: NodeId,
    pub parent_id: NodeId,
    /// Record/map key, or list position.
    pub parent_key: String,
    pub kind: CreateKind,
    pub intent: Option<Intent>,
    /// The list item this op replaces, when `intent` is [`Intent::Set`].
    pub superseded_id: Option<NodeId>,
}

impl CreateOp {
    pub fn is_set(&self) -> bool {
        self.intent == Some(Intent::Set)
    }
}

/// A single, independently applicable mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireOp", into = "WireOp")]
pub enum Op {
    Create(CreateOp),
    UpdateRecord {
        op_id: Option<OpId>,
        id: NodeId,
        data: JsonObject,
    },
    DeleteNode {
        op_id: Option<OpId>,
        id: NodeId,
    },
    SetParentKey {
        op_id: Option<OpId>,
        id: NodeId,
        parent_key: String,
    },
    DeleteKey {
        op_id: Option<OpId>,
        id: NodeId,
        key: String,
    },
    /// Sent by the authority when it drops one of this replica's ops.
    Ack { op_id: OpId },
}

impl Op {
    pub fn op_id(&self) -> Option<&OpId> {
        match self {
            Op::Create(create) => create.op_id.as_ref(),
            Op::UpdateRecord { op_id, .. }
            | Op::DeleteNode { op_id, .. }
            | Op::SetParentKey { op_id, .. }
            | Op::DeleteKey { op_id, .. } => op_id.as_ref(),
            Op::Ack { op_id } => Some(op_id),
        }
    }

    pub(crate) fn set_op_id(&mut self, id: OpId) {
        match self {
            Op::Create(create) => create.op_id = Some(id),
            Op::UpdateRecord { op_id, .. }
            | Op::DeleteNode { op_id, .. }
            | Op::SetParentKey { op_id, .. }
            | Op::DeleteKey { op_id, .. } => *op_id = Some(id),
            Op::Ack { op_id } => *op_id = id,
        }
    }

    /// The node this op targets (the created node for creation ops).
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Op::Create(create) => Some(&create.id),
            Op::UpdateRecord { id, .. }
            | Op::DeleteNode { id, .. }
            | Op::SetParentKey { id, .. }
            | Op::DeleteKey { id, .. } => Some(id),
            Op::Ack { .. } => None,
        }
    }

    pub fn as_create(&self) -> Option<&CreateOp> {
        match self {
            Op::Create(create) => Some(create),
            _ => None,
        }
    }

    /// Creation of a container (record, list or map), whose children may
    /// follow in the same batch.
    pub(crate) fn creates_container(&self) -> bool {
        matches!(
            self,
            Op::Create(CreateOp {
                kind: CreateKind::Record { .. } | CreateKind::List | CreateKind::Map,
                ..
            })
        )
    }

    /// Short name used in logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Op::Create(create) => match create.kind {
                CreateKind::Record { .. } => "CreateRecord",
                CreateKind::List => "CreateList",
                CreateKind::Map => "CreateMap",
                CreateKind::Register { .. } => "CreateRegister",
            },
            Op::UpdateRecord { .. } => "UpdateRecord",
            Op::DeleteNode { .. } => "DeleteNode",
            Op::SetParentKey { .. } => "SetParentKey",
            Op::DeleteKey { .. } => "DeleteKey",
            Op::Ack { .. } => "Ack",
        }
    }
}

/// Flat serde mirror of [`Op`].
#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
enum WireOp {
    CreateRecord {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        op_id: Option<OpId>,
        id: NodeId,
        parent_id: NodeId,
        parent_key: String,
        data: JsonObject,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        intent: Option<Intent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        superseded_id: Option<NodeId>,
    },
    CreateList {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        op_id: Option<OpId>,
        id: NodeId,
        parent_id: NodeId,
        parent_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        intent: Option<Intent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        superseded_id: Option<NodeId>,
    },
    CreateMap {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        op_id: Option<OpId>,
        id: NodeId,
        parent_id: NodeId,
        parent_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        intent: Option<Intent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        superseded_id: Option<NodeId>,
    },
    CreateRegister {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        op_id: Option<OpId>,
        id: NodeId,
        parent_id: NodeId,
        parent_key: String,
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        intent: Option<Intent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        superseded_id: Option<NodeId>,
    },
    UpdateRecord {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        op_id: Option<OpId>,
        id: NodeId,
        data: JsonObject,
    },
    DeleteNode {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        op_id: Option<OpId>,
        id: NodeId,
    },
    SetParentKey {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        op_id: Option<OpId>,
        id: NodeId,
        parent_key: String,
    },
    DeleteKey {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        op_id: Option<OpId>,
        id: NodeId,
        key: String,
    },
    Ack {
        op_id: OpId,
    },
}

impl From<WireOp> for Op {
    fn from(wire: WireOp) -> Self {
        let create = |op_id, id, parent_id, parent_key, kind, intent, superseded_id| {
            Op::Create(CreateOp {
                op_id,
                id,
                parent_id,
                parent_key,
                kind,
                intent,
                superseded_id,
            })
        };
        match wire {
            WireOp::CreateRecord {
                op_id,
                id,
                parent_id,
                parent_key,
                data,
                intent,
                superseded_id,
            } => create(
                op_id,
                id,
                parent_id,
                parent_key,
                CreateKind::Record { data },
                intent,
                superseded_id,
            ),
            WireOp::CreateList {
                op_id,
                id,
                parent_id,
                parent_key,
                intent,
                superseded_id,
            } => create(
                op_id,
                id,
                parent_id,
                parent_key,
                CreateKind::List,
                intent,
                superseded_id,
            ),
            WireOp::CreateMap {
                op_id,
                id,
                parent_id,
                parent_key,
                intent,
                superseded_id,
            } => create(
                op_id,
                id,
                parent_id,
                parent_key,
                CreateKind::Map,
                intent,
                superseded_id,
            ),
            WireOp::CreateRegister {
                op_id,
                id,
                parent_id,
                parent_key,
                data,
                intent,
                superseded_id,
            } => create(
                op_id,
                id,
                parent_id,
                parent_key,
                CreateKind::Register { data },
                intent,
                superseded_id,
            ),
            WireOp::UpdateRecord { op_id, id, data } => Op::UpdateRecord { op_id, id, data },
            WireOp::DeleteNode { op_id, id } => Op::DeleteNode { op_id, id },
            WireOp::SetParentKey {
                op_id,
                id,
                parent_key,
            } => Op::SetParentKey {
                op_id,
                id,
                parent_key,
            },
            WireOp::DeleteKey { op_id, id, key } => Op::DeleteKey { op_id, id, key },
            WireOp::Ack { op_id } => Op::Ack { op_id },
        }
    }
}

impl From<Op> for WireOp {
    fn from(op: Op) -> Self {
        match op {
            Op::Create(CreateOp {
                op_id,
                id,
                parent_id,
                parent_key,
                kind,
                intent,
                superseded_id,
            }) => match kind {
                CreateKind::Record { data } => WireOp::CreateRecord {
                    op_id,
                    id,
                    parent_id,
                    parent_key,
                    data,
                    intent,
                    superseded_id,
                },
                CreateKind::List => WireOp::CreateList {
                    op_id,
                    id,
                    parent_id,
                    parent_key,
                    intent,
                    superseded_id,
                },
                CreateKind::Map => WireOp::CreateMap {
                    op_id,
                    id,
                    parent_id,
                    parent_key,
                    intent,
                    superseded_id,
                },
                CreateKind::Register { data } => WireOp::CreateRegister {
                    op_id,
                    id,
                    parent_id,
                    parent_key,
                    data,
                    intent,
                    superseded_id,
                },
            },
            Op::UpdateRecord { op_id, id, data } => WireOp::UpdateRecord { op_id, id, data },
            Op::DeleteNode { op_id, id } => WireOp::DeleteNode { op_id, id },
            Op::SetParentKey {
                op_id,
                id,
                parent_key,
            } => WireOp::SetParentKey {
                op_id,
                id,
                parent_key,
            },
            Op::DeleteKey { op_id, id, key } => WireOp::DeleteKey { op_id, id, key },
            Op::Ack { op_id } => WireOp::Ack { op_id },
        }
    }
}
