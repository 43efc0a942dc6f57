//! Documents: the public entry point.
//!
//! A [`Document`] owns one replica of a shared tree. Local edits go through
//! typed handles ([`RecordMut`], [`ListMut`], [`MapMut`]) and are applied
//! immediately; the ops they produce are queued for the ordering authority
//! and drained with [`Document::take_outbound`]. Whatever the authority
//! relays back, own ops included, is fed to [`Document::receive`].
//!
//! ```
//! use livetree::{Document, Lson};
//!
//! let mut doc = Document::new(1);
//! doc.root().set("title", "Notes").unwrap();
//! doc.root().set("items", Lson::list(["a", "b"])).unwrap();
//! assert_eq!(doc.to_json()["items"][1], "b");
//! assert_eq!(doc.take_outbound().len(), 4);
//! ```

use std::sync::Arc;

use serde_json::Value;

use crate::Result;
use crate::constants::ROOT_ID;
use crate::errors::NodeError;
use crate::hooks::StorageHook;
use crate::ids::NodeId;
use crate::node::{Node, NodeBody, NodeKind, ParentLink, RecordNode};
use crate::op::Op;
use crate::pool::Pool;
use crate::snapshot::{self, SerializedNode, Snapshot};
use crate::update::StorageUpdate;
use crate::value::Immutable;

mod handles;

pub use handles::{Child, ListMut, MapMut, RecordMut};

/// One replica of a collaborative tree.
#[derive(Debug)]
pub struct Document {
    pool: Pool,
    root: NodeId,
}

impl Document {
    /// Creates an empty document whose root record has the id `root`.
    pub fn new(connection_id: u32) -> Self {
        let mut pool = Pool::new(connection_id);
        let root = NodeId::new(ROOT_ID);
        let node = Node::new(
            root.clone(),
            ParentLink::NoParent,
            NodeBody::Record(RecordNode::default()),
        );
        if let Err(e) = pool.insert_node(node) {
            // The pool is empty, so this cannot collide
            tracing::error!(error = %e, "Failed to register root");
        }
        Self { pool, root }
    }

    /// Loads a document from a snapshot. The snapshot must hold exactly one
    /// parentless node, a record.
    pub fn from_snapshot(connection_id: u32, snapshot: &[(NodeId, SerializedNode)]) -> Result<Self> {
        let mut pool = Pool::new(connection_id);
        let root = pool.load(snapshot)?;
        tracing::debug!(nodes = pool.len(), root = %root, "Loaded document from snapshot");
        Ok(Self { pool, root })
    }

    pub fn root_id(&self) -> &NodeId {
        &self.root
    }

    /// Whether `id` is a registered node. Hidden list items count.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.pool.contains(id)
    }

    pub fn kind(&self, id: &NodeId) -> Option<NodeKind> {
        self.pool.kind(id)
    }

    /// Visible parent and key of `id`.
    pub fn parent_of(&self, id: &NodeId) -> Option<(NodeId, String)> {
        match self.pool.parent_link(id)? {
            ParentLink::HasParent { parent, key } => Some((parent.clone(), key.clone())),
            _ => None,
        }
    }

    /// Number of registered nodes, hidden list items included.
    pub fn node_count(&self) -> usize {
        self.pool.len()
    }

    // ===== Reading =====

    /// Immutable snapshot of the whole tree. Unchanged subtrees share their
    /// allocation with earlier snapshots.
    pub fn to_immutable(&self) -> Immutable {
        self.pool.immutable(&self.root)
    }

    pub fn node_immutable(&self, id: &NodeId) -> Option<Immutable> {
        self.pool.contains(id).then(|| self.pool.immutable(id))
    }

    pub fn to_json(&self) -> Value {
        self.to_immutable().to_json()
    }

    /// Flat snapshot of the visible tree, parents first.
    pub fn serialize(&self) -> Snapshot {
        self.pool.serialize(&self.root)
    }

    // ===== Handles =====

    pub fn root(&mut self) -> RecordMut<'_> {
        let id = self.root.clone();
        RecordMut::new(self, id)
    }

    pub fn record(&mut self, id: &NodeId) -> Result<RecordMut<'_>> {
        self.pool.expect_kind(id, NodeKind::Record)?;
        Ok(RecordMut::new(self, id.clone()))
    }

    pub fn list(&mut self, id: &NodeId) -> Result<ListMut<'_>> {
        self.pool.expect_kind(id, NodeKind::List)?;
        Ok(ListMut::new(self, id.clone()))
    }

    pub fn map(&mut self, id: &NodeId) -> Result<MapMut<'_>> {
        self.pool.expect_kind(id, NodeKind::Map)?;
        Ok(MapMut::new(self, id.clone()))
    }

    // ===== Sync =====

    /// Applies ops relayed by the authority and returns the resulting
    /// notifications (also delivered to the storage hooks).
    pub fn receive(&mut self, ops: impl IntoIterator<Item = Op>) -> Vec<StorageUpdate> {
        let applied = self.pool.apply_ops(ops.into_iter().collect(), false);
        tracing::debug!(updates = applied.updates.len(), "Received ops");
        self.pool.notify(&applied.updates);
        self.pool.settle();
        applied.updates
    }

    /// Drains the ops waiting to be sent to the authority.
    pub fn take_outbound(&mut self) -> Vec<Op> {
        self.pool.take_outbox()
    }

    /// Sent ops the authority has not relayed back yet.
    pub fn unacknowledged_ops(&self) -> &[Op] {
        self.pool.unacknowledged()
    }

    /// Changes the connection id used for ids generated from now on.
    pub fn set_connection_id(&mut self, connection_id: u32) {
        self.pool.set_connection_id(connection_id);
    }

    /// Brings the document to the state of a fresh snapshot, producing the
    /// same notifications as if the differences had arrived as remote ops.
    pub fn reinitialize(&mut self, snapshot: &[(NodeId, SerializedNode)]) -> Result<Vec<StorageUpdate>> {
        let root = snapshot.iter().find(|(_, node)| node.parent_id().is_none());
        match root {
            Some((id, SerializedNode::Record { .. })) if *id == self.root => {}
            _ => {
                return Err(NodeError::InvalidSnapshot {
                    reason: format!("expected root record {}", self.root),
                }
                .into());
            }
        }
        let ops = snapshot::diff(&self.serialize(), snapshot)?;
        tracing::info!(ops = ops.len(), "Reinitializing document");
        let applied = self.pool.apply_ops(ops, false);
        self.pool.evict_implicitly_deleted();
        self.pool.notify(&applied.updates);
        Ok(applied.updates)
    }

    // ===== History =====

    pub fn undo(&mut self) -> Result<()> {
        self.assert_history_allowed("undo")?;
        let Some(frame) = self.pool.history.pop_undo() else {
            return Ok(());
        };
        let applied = self.pool.apply_ops(frame, true);
        self.pool.notify(&applied.updates);
        self.pool.history.push_redo(applied.reverse);
        self.pool.enqueue(applied.ops);
        Ok(())
    }

    pub fn redo(&mut self) -> Result<()> {
        self.assert_history_allowed("redo")?;
        let Some(frame) = self.pool.history.pop_redo() else {
            return Ok(());
        };
        let applied = self.pool.apply_ops(frame, true);
        self.pool.notify(&applied.updates);
        self.pool.history.push_undo(applied.reverse);
        self.pool.enqueue(applied.ops);
        Ok(())
    }

    fn assert_history_allowed(&self, action: &'static str) -> Result<()> {
        self.pool.assert_writable()?;
        if self.pool.in_batch() {
            return Err(NodeError::HistoryDuringBatch { action }.into());
        }
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.pool.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.pool.history.can_redo()
    }

    /// Collects all following local changes into a single undo frame until
    /// [`resume_history`](Self::resume_history).
    pub fn pause_history(&mut self) {
        self.pool.history.pause();
    }

    pub fn resume_history(&mut self) {
        self.pool.history.resume();
    }

    pub fn clear_history(&mut self) {
        self.pool.history.clear();
    }

    // ===== Batching =====

    /// Runs `f` as one batch: its ops are sent together, it forms a single
    /// undo frame and hooks see one merged notification. Nested batches are
    /// flattened into the outermost one.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Document) -> R) -> R {
        if !self.pool.begin_batch() {
            return f(self);
        }
        let result = f(self);
        self.pool.commit_batch();
        result
    }

    // ===== Settings =====

    pub fn set_writable(&mut self, writable: bool) {
        self.pool.set_writable(writable);
    }

    pub fn is_writable(&self) -> bool {
        self.pool.is_writable()
    }

    /// Registers a hook called with the merged updates of every change.
    pub fn subscribe(&mut self, hook: Arc<dyn StorageHook>) {
        self.pool.hooks.add_hook(hook);
    }
}
