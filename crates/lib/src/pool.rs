//! The node arena and the op pipeline around it.
//!
//! [`Pool`] is the context object every node operation runs against. It owns
//! the nodes, generates ids, knows whether storage is writable, and routes
//! the results of local mutations: into the open batch if there is one,
//! otherwise into history, the outbound queue and the storage hooks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::errors::NodeError;
use crate::history::{Batch, History};
use crate::hooks::StorageHookCollection;
use crate::ids::{IdGenerator, NodeId, OpId};
use crate::node::{
    ApplyResult, Field, ListNode, MapNode, Node, NodeBody, NodeKind, ParentLink, RecordNode,
    RegisterNode,
};
use crate::op::{CreateKind, CreateOp, Op, OpSource};
use crate::position::Position;
use crate::snapshot::SerializedNode;
use crate::update::{StorageUpdate, merge_updates};
use crate::value::{Immutable, Lson};

/// Result of applying an op array.
#[derive(Debug, Default)]
pub(crate) struct Applied {
    /// The ops as applied, with fresh op ids when replayed locally.
    pub(crate) ops: Vec<Op>,
    /// Ops undoing the whole array, in application order.
    pub(crate) reverse: Vec<Op>,
    /// Merged, non-empty notifications.
    pub(crate) updates: Vec<StorageUpdate>,
}

#[derive(Debug)]
pub(crate) struct Pool {
    nodes: HashMap<NodeId, Node>,
    ids: IdGenerator,
    writable: bool,
    pub(crate) history: History,
    batch: Option<Batch>,
    outbox: Vec<Op>,
    unacknowledged: Vec<Op>,
    pub(crate) hooks: StorageHookCollection,
    /// Nodes re-created locally by undo/redo whose creation the authority has
    /// not confirmed yet, with the creating op id. Remote deletes of these
    /// ids predate the re-creation and are ignored.
    pending_creations: HashMap<NodeId, OpId>,
}

impl Pool {
    pub(crate) fn new(connection_id: u32) -> Self {
        Self {
            nodes: HashMap::new(),
            ids: IdGenerator::new(connection_id),
            writable: true,
            history: History::default(),
            batch: None,
            outbox: Vec::new(),
            unacknowledged: Vec::new(),
            hooks: StorageHookCollection::new(),
            pending_creations: HashMap::new(),
        }
    }

    // ===== Arena =====

    pub(crate) fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub(crate) fn kind(&self, id: &NodeId) -> Option<NodeKind> {
        self.nodes.get(id).map(Node::kind)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Fails with `NodeNotFound` or `TypeMismatch` unless `id` is a node of `kind`.
    pub(crate) fn expect_kind(&self, id: &NodeId, kind: NodeKind) -> Result<(), NodeError> {
        let actual = self
            .kind(id)
            .ok_or_else(|| NodeError::NodeNotFound { id: id.clone() })?;
        if actual != kind {
            return Err(NodeError::TypeMismatch {
                id: id.clone(),
                expected: kind,
                actual,
            });
        }
        Ok(())
    }

    pub(crate) fn record(&self, id: &NodeId) -> Option<&RecordNode> {
        match &self.nodes.get(id)?.body {
            NodeBody::Record(record) => Some(record),
            _ => None,
        }
    }

    pub(crate) fn record_mut(&mut self, id: &NodeId) -> Option<&mut RecordNode> {
        match &mut self.nodes.get_mut(id)?.body {
            NodeBody::Record(record) => Some(record),
            _ => None,
        }
    }

    pub(crate) fn list(&self, id: &NodeId) -> Option<&ListNode> {
        match &self.nodes.get(id)?.body {
            NodeBody::List(list) => Some(list),
            _ => None,
        }
    }

    pub(crate) fn list_mut(&mut self, id: &NodeId) -> Option<&mut ListNode> {
        match &mut self.nodes.get_mut(id)?.body {
            NodeBody::List(list) => Some(list),
            _ => None,
        }
    }

    pub(crate) fn map(&self, id: &NodeId) -> Option<&MapNode> {
        match &self.nodes.get(id)?.body {
            NodeBody::Map(map) => Some(map),
            _ => None,
        }
    }

    pub(crate) fn map_mut(&mut self, id: &NodeId) -> Option<&mut MapNode> {
        match &mut self.nodes.get_mut(id)?.body {
            NodeBody::Map(map) => Some(map),
            _ => None,
        }
    }

    pub(crate) fn parent_link(&self, id: &NodeId) -> Option<&ParentLink> {
        self.nodes.get(id).map(|node| &node.parent)
    }

    /// The key under which `id` is attached (list position for list items).
    pub(crate) fn key_of(&self, id: &NodeId) -> Option<&str> {
        self.parent_link(id).and_then(ParentLink::key)
    }

    pub(crate) fn set_parent_link(&mut self, id: &NodeId, link: ParentLink) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = link;
            node.cache.take();
        }
    }

    /// Registers a new node. Ids are unique per document.
    pub(crate) fn insert_node(&mut self, node: Node) -> Result<(), NodeError> {
        if self.nodes.contains_key(&node.id) {
            return Err(NodeError::AlreadyAttached { id: node.id });
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Registers the (childless) node described by a creation op.
    pub(crate) fn create_child(
        &mut self,
        op: &CreateOp,
        link: ParentLink,
    ) -> Result<NodeId, NodeError> {
        let body = match &op.kind {
            CreateKind::Record { data } => NodeBody::Record(RecordNode::from_data(data.clone())),
            CreateKind::List => NodeBody::List(ListNode::default()),
            CreateKind::Map => NodeBody::Map(MapNode::default()),
            CreateKind::Register { data } => NodeBody::Register(RegisterNode { data: data.clone() }),
        };
        self.insert_node(Node::new(op.id.clone(), link, body))?;
        Ok(op.id.clone())
    }

    /// Unregisters `id` and its whole subtree, hidden list items included.
    pub(crate) fn release(&mut self, id: &NodeId) {
        let mut stack = vec![id.clone()];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                stack.extend(node.child_ids());
            }
        }
    }

    /// Builds the live subtree for `value` under `parent`/`key` and returns
    /// the id of its top node. Plain values become registers.
    pub(crate) fn attach_lson(
        &mut self,
        value: Lson,
        parent: &NodeId,
        key: &str,
    ) -> Result<NodeId, NodeError> {
        let id = self.ids.next_node_id();
        let link = ParentLink::attached(parent, key);
        match value {
            Lson::Value(data) => {
                self.insert_node(Node::new(
                    id.clone(),
                    link,
                    NodeBody::Register(RegisterNode { data }),
                ))?;
            }
            Lson::Record(fields) => {
                self.insert_node(Node::new(
                    id.clone(),
                    link,
                    NodeBody::Record(RecordNode::default()),
                ))?;
                for (field_key, field_value) in fields {
                    let field = match field_value {
                        Lson::Value(v) => Field::Value(v),
                        nested => Field::Node(self.attach_lson(nested, &id, &field_key)?),
                    };
                    if let Some(record) = self.record_mut(&id) {
                        record.fields.insert(field_key, field);
                    }
                }
            }
            Lson::List(items) => {
                self.insert_node(Node::new(
                    id.clone(),
                    link,
                    NodeBody::List(ListNode::default()),
                ))?;
                let mut previous: Option<Position> = None;
                for item in items {
                    let position = Position::make(previous.as_ref(), None);
                    let child = self.attach_lson(item, &id, position.as_str())?;
                    if let Some(list) = self.list_mut(&id) {
                        list.items.push(child);
                    }
                    previous = Some(position);
                }
            }
            Lson::Map(entries) => {
                self.insert_node(Node::new(
                    id.clone(),
                    link,
                    NodeBody::Map(MapNode::default()),
                ))?;
                for (entry_key, entry_value) in entries {
                    let child = self.attach_lson(entry_value, &id, &entry_key)?;
                    if let Some(map) = self.map_mut(&id) {
                        map.entries.insert(entry_key, child);
                    }
                }
            }
        }
        Ok(id)
    }

    // ===== Projections =====

    /// Clears the cached immutable value of `id` and of every visible ancestor.
    pub(crate) fn invalidate(&mut self, id: &NodeId) {
        let mut current = Some(id.clone());
        while let Some(id) = current {
            let Some(node) = self.nodes.get_mut(&id) else {
                break;
            };
            node.cache.take();
            current = match &node.parent {
                ParentLink::HasParent { parent, .. } => Some(parent.clone()),
                _ => None,
            };
        }
    }

    /// Immutable projection of `id`, computed once and reused until the node
    /// or one of its descendants changes.
    pub(crate) fn immutable(&self, id: &NodeId) -> Immutable {
        match self.nodes.get(id) {
            Some(node) => node.cache.get_or_init(|| self.project(node)).clone(),
            None => Immutable::Value(Value::Null),
        }
    }

    fn project(&self, node: &Node) -> Immutable {
        match &node.body {
            NodeBody::Record(record) => Immutable::Record(Arc::new(
                record
                    .fields
                    .iter()
                    .map(|(key, field)| {
                        let value = match field {
                            Field::Value(v) => Immutable::Value(v.clone()),
                            Field::Node(child) => self.immutable(child),
                        };
                        (key.clone(), value)
                    })
                    .collect(),
            )),
            NodeBody::List(list) => Immutable::List(Arc::new(
                list.items.iter().map(|child| self.immutable(child)).collect(),
            )),
            NodeBody::Map(map) => Immutable::Map(Arc::new(
                map.entries
                    .iter()
                    .map(|(key, child)| (key.clone(), self.immutable(child)))
                    .collect(),
            )),
            NodeBody::Register(register) => Immutable::Value(register.data.clone()),
        }
    }

    /// Creation ops rebuilding the visible subtree of `id` under
    /// `parent_id`/`parent_key`, parents first. The ops carry no op ids.
    pub(crate) fn to_ops(&self, id: &NodeId, parent_id: &NodeId, parent_key: &str) -> Vec<Op> {
        let mut ops = Vec::new();
        self.collect_ops(id, parent_id, parent_key, &mut ops);
        ops
    }

    fn collect_ops(&self, id: &NodeId, parent_id: &NodeId, parent_key: &str, ops: &mut Vec<Op>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let kind = match &node.body {
            NodeBody::Record(record) => CreateKind::Record {
                data: record.scalar_data(),
            },
            NodeBody::List(_) => CreateKind::List,
            NodeBody::Map(_) => CreateKind::Map,
            NodeBody::Register(register) => CreateKind::Register {
                data: register.data.clone(),
            },
        };
        ops.push(Op::Create(CreateOp {
            op_id: None,
            id: id.clone(),
            parent_id: parent_id.clone(),
            parent_key: parent_key.to_string(),
            kind,
            intent: None,
            superseded_id: None,
        }));

        match &node.body {
            NodeBody::Record(record) => {
                for (key, field) in &record.fields {
                    if let Field::Node(child) = field {
                        self.collect_ops(child, id, key, ops);
                    }
                }
            }
            NodeBody::List(list) => {
                for child in &list.items {
                    if let Some(key) = self.key_of(child) {
                        self.collect_ops(child, id, key, ops);
                    }
                }
            }
            NodeBody::Map(map) => {
                for (key, child) in &map.entries {
                    self.collect_ops(child, id, key, ops);
                }
            }
            NodeBody::Register(_) => {}
        }
    }

    // ===== Snapshots =====

    /// Flat, parents-first form of the visible tree below `root`.
    pub(crate) fn serialize(&self, root: &NodeId) -> Vec<(NodeId, SerializedNode)> {
        let mut out = Vec::new();
        let mut queue = std::collections::VecDeque::from([root.clone()]);
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            let parent = match &node.parent {
                ParentLink::HasParent { parent, key } => Some((parent.clone(), key.clone())),
                _ => None,
            };
            let serialized = match (&node.body, parent) {
                (NodeBody::Record(record), parent) => {
                    let (parent_id, parent_key) = parent.unzip();
                    SerializedNode::Record {
                        parent_id,
                        parent_key,
                        data: record.scalar_data(),
                    }
                }
                (NodeBody::List(_), Some((parent_id, parent_key))) => SerializedNode::List {
                    parent_id,
                    parent_key,
                },
                (NodeBody::Map(_), Some((parent_id, parent_key))) => SerializedNode::Map {
                    parent_id,
                    parent_key,
                },
                (NodeBody::Register(register), Some((parent_id, parent_key))) => {
                    SerializedNode::Register {
                        parent_id,
                        parent_key,
                        data: register.data.clone(),
                    }
                }
                (_, None) => {
                    tracing::warn!(node_id = %id, "Skipping detached non-record node");
                    continue;
                }
            };
            out.push((id.clone(), serialized));
            match &node.body {
                NodeBody::List(list) => queue.extend(list.items.iter().cloned()),
                NodeBody::Record(record) => queue.extend(record.child_ids().cloned()),
                NodeBody::Map(map) => queue.extend(map.entries.values().cloned()),
                NodeBody::Register(_) => {}
            }
        }
        out
    }

    /// Replaces the arena contents with the tree described by `items` and
    /// returns the root id.
    pub(crate) fn load(&mut self, items: &[(NodeId, SerializedNode)]) -> Result<NodeId, NodeError> {
        let mut root = None;
        let mut children: HashMap<&NodeId, Vec<(&NodeId, &SerializedNode)>> = HashMap::new();
        for (id, node) in items {
            match node.parent_id() {
                None => {
                    if root.is_some() {
                        return Err(NodeError::InvalidSnapshot {
                            reason: format!("more than one root ({id})"),
                        });
                    }
                    root = Some((id, node));
                }
                Some(parent) => children.entry(parent).or_default().push((id, node)),
            }
        }
        let Some((root_id, SerializedNode::Record { data, .. })) = root else {
            return Err(NodeError::InvalidSnapshot {
                reason: "expected exactly one root record".to_string(),
            });
        };

        self.nodes.clear();
        self.insert_node(Node::new(
            root_id.clone(),
            ParentLink::NoParent,
            NodeBody::Record(RecordNode::from_data(data.clone())),
        ))?;

        let mut stack = vec![root_id.clone()];
        while let Some(parent) = stack.pop() {
            let Some(entries) = children.remove(&parent) else {
                continue;
            };
            let parent_kind = self.kind(&parent);
            if parent_kind == Some(NodeKind::Register) {
                tracing::warn!(node_id = %parent, "Ignoring children of a register in snapshot");
                continue;
            }
            for (id, node) in entries {
                let key = node.parent_key().unwrap_or_default().to_string();
                let key = if parent_kind == Some(NodeKind::List) {
                    Position::normalize(&key).into()
                } else {
                    key
                };
                let body = match node {
                    SerializedNode::Record { data, .. } => {
                        NodeBody::Record(RecordNode::from_data(data.clone()))
                    }
                    SerializedNode::List { .. } => NodeBody::List(ListNode::default()),
                    SerializedNode::Map { .. } => NodeBody::Map(MapNode::default()),
                    SerializedNode::Register { data, .. } => {
                        NodeBody::Register(RegisterNode { data: data.clone() })
                    }
                };
                self.insert_node(Node::new(
                    id.clone(),
                    ParentLink::attached(&parent, key.clone()),
                    body,
                ))?;
                match self.nodes.get_mut(&parent).map(|n| &mut n.body) {
                    Some(NodeBody::Record(record)) => {
                        record.fields.insert(key, Field::Node(id.clone()));
                    }
                    Some(NodeBody::List(list)) => list.items.push(id.clone()),
                    Some(NodeBody::Map(map)) => {
                        map.entries.insert(key, id.clone());
                    }
                    _ => {}
                }
                stack.push(id.clone());
            }
        }

        for (parent, entries) in &children {
            tracing::warn!(
                parent_id = %parent,
                count = entries.len(),
                "Dropping snapshot nodes with unknown parent"
            );
        }

        let lists: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|node| node.kind() == NodeKind::List)
            .map(|node| node.id.clone())
            .collect();
        for list in lists {
            self.list_sort(&list);
        }
        Ok(root_id.clone())
    }

    // ===== Local dispatch =====

    pub(crate) fn is_writable(&self) -> bool {
        self.writable
    }

    pub(crate) fn set_writable(&mut self, writable: bool) {
        self.writable = writable;
    }

    pub(crate) fn assert_writable(&self) -> Result<(), NodeError> {
        if self.writable {
            Ok(())
        } else {
            Err(NodeError::ReadOnly)
        }
    }

    pub(crate) fn set_connection_id(&mut self, connection_id: u32) {
        self.ids.set_connection_id(connection_id);
    }

    pub(crate) fn next_op_id(&mut self) -> OpId {
        self.ids.next_op_id()
    }

    /// Gives every op a fresh op id.
    pub(crate) fn stamp(&mut self, ops: &mut [Op]) {
        for op in ops {
            op.set_op_id(self.ids.next_op_id());
        }
    }

    pub(crate) fn in_batch(&self) -> bool {
        self.batch.is_some()
    }

    /// Routes the result of a local mutation.
    pub(crate) fn dispatch(
        &mut self,
        ops: Vec<Op>,
        reverse: Vec<Op>,
        updates: Vec<StorageUpdate>,
    ) {
        if let Some(batch) = self.batch.as_mut() {
            batch.add(ops, reverse, updates);
            return;
        }
        if !ops.is_empty() {
            self.history.clear_redo();
        }
        self.history.record(reverse);
        self.enqueue(ops);
        self.notify(&updates);
    }

    /// Opens a batch. Returns false when one is already open.
    pub(crate) fn begin_batch(&mut self) -> bool {
        if self.batch.is_some() {
            return false;
        }
        self.batch = Some(Batch::default());
        true
    }

    pub(crate) fn commit_batch(&mut self) {
        let Some(batch) = self.batch.take() else {
            return;
        };
        tracing::debug!(ops = batch.ops.len(), "Closing batch");
        if !batch.ops.is_empty() {
            self.history.clear_redo();
        }
        self.history.record(batch.reverse);
        self.enqueue(batch.ops);
        self.notify(&batch.updates);
    }

    /// Queues ops for the authority and remembers them until acknowledged.
    pub(crate) fn enqueue(&mut self, ops: Vec<Op>) {
        for op in &ops {
            if op.op_id().is_some() {
                self.unacknowledged.push(op.clone());
            }
        }
        self.outbox.extend(ops);
    }

    pub(crate) fn take_outbox(&mut self) -> Vec<Op> {
        std::mem::take(&mut self.outbox)
    }

    pub(crate) fn unacknowledged(&self) -> &[Op] {
        &self.unacknowledged
    }

    pub(crate) fn notify(&self, updates: &[StorageUpdate]) {
        if let Err(e) = self.hooks.execute_hooks(updates) {
            tracing::debug!(error = %e, "Storage notification had failing hooks");
        }
    }

    /// Removes `op_id` from the unacknowledged set. True if it was there.
    /// Removes and returns the in-flight op with this id.
    fn acknowledge(&mut self, op_id: &OpId) -> Option<Op> {
        let index = self
            .unacknowledged
            .iter()
            .position(|op| op.op_id() == Some(op_id))?;
        Some(self.unacknowledged.remove(index))
    }

    // ===== Applying ops =====

    /// Applies an op array. Inbound arrays are classified per op as Ack (own
    /// op relayed back) or Remote. With `replay` set every op is stamped with
    /// a fresh op id and applied as UndoRedo.
    pub(crate) fn apply_ops(&mut self, ops: Vec<Op>, replay: bool) -> Applied {
        let mut applied = Applied::default();
        let mut created_containers = HashSet::new();

        for mut op in ops {
            let mut dropped = None;
            let source = if replay {
                op.set_op_id(self.ids.next_op_id());
                OpSource::UndoRedo
            } else {
                match op.op_id().cloned().and_then(|op_id| self.acknowledge(&op_id)) {
                    Some(sent) => {
                        if matches!(op, Op::Ack { .. }) {
                            dropped = Some(sent);
                        }
                        OpSource::Ack
                    }
                    None => OpSource::Remote,
                }
            };
            tracing::trace!(op = op.type_name(), node_id = ?op.node_id(), ?source, "Applying op");

            let result = match &dropped {
                Some(sent) => self.revert_dropped(sent),
                None => self.apply_op(&op, source),
            };
            if let ApplyResult::Modified { update, reverse } = result {
                // Children of a container created earlier in this array are
                // covered by the container's own update and reverse op.
                if !created_containers.contains(update.node_id()) {
                    merge_updates(&mut applied.updates, update);
                    applied.reverse.splice(0..0, reverse);
                }
                if op.creates_container() {
                    if let Some(id) = op.node_id() {
                        created_containers.insert(id.clone());
                    }
                }
            }

            self.track_creation(&op, source);
            if replay {
                applied.ops.push(op);
            }
        }

        applied.updates.retain(|update| !update.is_empty());
        applied
    }

    fn track_creation(&mut self, op: &Op, source: OpSource) {
        match (op, source) {
            (Op::Create(create), OpSource::UndoRedo) => {
                if let Some(op_id) = &create.op_id {
                    self.pending_creations
                        .insert(create.id.clone(), op_id.clone());
                }
            }
            (Op::Create(create), OpSource::Ack) => {
                if self.pending_creations.get(&create.id) == create.op_id.as_ref() {
                    self.pending_creations.remove(&create.id);
                }
            }
            (Op::Ack { op_id }, _) => {
                self.pending_creations.retain(|_, pending| pending != op_id);
            }
            _ => {}
        }
    }

    /// The authority refused one of our ops. Its pending markers must not
    /// keep blocking remote writes, and an undo set gives back the item it
    /// hid.
    fn revert_dropped(&mut self, sent: &Op) -> ApplyResult {
        if let Some(op_id) = sent.op_id() {
            self.clear_markers(op_id);
        }
        match sent {
            Op::Create(create) if create.is_set() => {
                tracing::debug!(op_id = ?create.op_id, node_id = %create.id, "Authority dropped a set");
                self.list_restore_superseded(create)
            }
            _ => ApplyResult::NotModified,
        }
    }

    fn clear_markers(&mut self, op_id: &OpId) {
        for node in self.nodes.values_mut() {
            match &mut node.body {
                NodeBody::Record(record) => record.pending.retain(|_, pending| pending != op_id),
                NodeBody::Map(map) => map.pending.retain(|_, pending| pending != op_id),
                NodeBody::List(list) => {
                    list.unacknowledged_sets.retain(|_, pending| pending != op_id);
                    list.pending_moves.retain(|_, pending| pending != op_id);
                }
                NodeBody::Register(_) => {}
            }
        }
    }

    pub(crate) fn is_pending_creation(&self, id: &NodeId) -> bool {
        self.pending_creations.contains_key(id)
    }

    pub(crate) fn apply_op(&mut self, op: &Op, source: OpSource) -> ApplyResult {
        match op {
            Op::Ack { .. } => ApplyResult::NotModified,
            Op::Create(create) => self.apply_create(create, source),
            Op::UpdateRecord { op_id, id, data } => {
                if self.record(id).is_none() {
                    return self.inapplicable(op, "no such record");
                }
                self.record_apply_update(id, op_id.as_ref(), data, source)
            }
            Op::DeleteKey { op_id, id, key } => {
                if self.record(id).is_none() {
                    return self.inapplicable(op, "no such record");
                }
                self.record_apply_delete_key(id, op_id.as_ref(), key, source)
            }
            Op::DeleteNode { id, .. } => self.apply_delete_node(op, id, source),
            Op::SetParentKey {
                op_id,
                id,
                parent_key,
            } => {
                let Some(parent) = self.parent_link(id).and_then(ParentLink::parent).cloned()
                else {
                    return self.inapplicable(op, "node is not attached");
                };
                if self.list(&parent).is_none() {
                    return self.inapplicable(op, "parent is not a list");
                }
                let position = Position::normalize(parent_key);
                self.list_set_child_key(&parent, id, position, op_id.as_ref(), source)
            }
        }
    }

    fn apply_create(&mut self, create: &CreateOp, source: OpSource) -> ApplyResult {
        match self.kind(&create.parent_id) {
            Some(NodeKind::Record) => self.record_attach_child(create, source),
            Some(NodeKind::List) => self.list_attach_child(create, source),
            Some(NodeKind::Map) => self.map_attach_child(create, source),
            Some(NodeKind::Register) => {
                tracing::warn!(
                    node_id = %create.id,
                    parent_id = %create.parent_id,
                    "Registers cannot have children"
                );
                ApplyResult::NotModified
            }
            None => {
                tracing::debug!(
                    node_id = %create.id,
                    parent_id = %create.parent_id,
                    "Parent of created node not found"
                );
                ApplyResult::NotModified
            }
        }
    }

    fn apply_delete_node(&mut self, op: &Op, id: &NodeId, source: OpSource) -> ApplyResult {
        if source != OpSource::UndoRedo && self.pending_creations.contains_key(id) {
            tracing::debug!(node_id = %id, "Ignoring delete of a locally re-created node");
            return ApplyResult::NotModified;
        }
        let Some(link) = self.parent_link(id).cloned() else {
            return ApplyResult::NotModified;
        };
        match link {
            ParentLink::NoParent => self.inapplicable(op, "the root cannot be deleted"),
            ParentLink::Orphaned { parent, .. } => {
                self.list_forget(&parent, id);
                ApplyResult::NotModified
            }
            ParentLink::HasParent { parent, key } => match self.kind(&parent) {
                Some(NodeKind::Record) => self.record_detach_child(&parent, id, &key),
                Some(NodeKind::List) => self.list_detach_child(&parent, id),
                Some(NodeKind::Map) => self.map_detach_child(&parent, id, &key),
                _ => self.inapplicable(op, "parent cannot hold children"),
            },
        }
    }

    fn inapplicable(&self, op: &Op, reason: &str) -> ApplyResult {
        tracing::warn!(op = op.type_name(), node_id = ?op.node_id(), reason, "Op not applicable");
        ApplyResult::NotModified
    }

    /// Once every local op is acknowledged, local and authoritative state
    /// agree: pending markers are dropped and hidden list items evicted.
    /// An open batch holds ops that are not queued yet, so nothing settles
    /// before it commits.
    pub(crate) fn settle(&mut self) {
        if !self.unacknowledged.is_empty() || self.in_batch() {
            return;
        }
        self.pending_creations.clear();
        for node in self.nodes.values_mut() {
            match &mut node.body {
                NodeBody::Record(record) => record.pending.clear(),
                NodeBody::Map(map) => map.pending.clear(),
                NodeBody::List(list) => {
                    list.unacknowledged_sets.clear();
                    list.pending_moves.clear();
                }
                NodeBody::Register(_) => {}
            }
        }
        self.evict_implicitly_deleted();
    }

    pub(crate) fn evict_implicitly_deleted(&mut self) {
        let mut evicted = Vec::new();
        for node in self.nodes.values_mut() {
            if let NodeBody::List(list) = &mut node.body {
                evicted.extend(list.implicitly_deleted.drain());
            }
        }
        for id in evicted {
            tracing::debug!(node_id = %id, "Evicting implicitly deleted item");
            self.release(&id);
        }
    }
}
