//! Maps: open key sets whose values are all child nodes.
//!
//! Sets follow the same per-key policy as records. Deletes travel as
//! `DeleteNode` of the child and leave no pending marker.

use std::collections::{BTreeMap, HashMap};

use super::{ApplyResult, KeyWrite, ParentLink, resolve_key_write};
use crate::errors::NodeError;
use crate::ids::{NodeId, OpId};
use crate::node::NodeKind;
use crate::op::{CreateOp, Op, OpSource};
use crate::pool::Pool;
use crate::update::{KeyUpdate, StorageUpdate};
use crate::value::Lson;

#[derive(Debug, Clone, Default)]
pub(crate) struct MapNode {
    pub(crate) entries: BTreeMap<String, NodeId>,
    pub(crate) pending: HashMap<String, OpId>,
}

impl Pool {
    pub(crate) fn map_set(&mut self, id: &NodeId, key: &str, value: Lson) -> Result<(), NodeError> {
        self.assert_writable()?;
        self.expect_kind(id, NodeKind::Map)?;

        let previous = self.map_mut(id).and_then(|m| m.entries.remove(key));
        let child = self.attach_lson(value, id, key)?;
        let reverse = match previous {
            Some(old) => {
                let reverse = self.to_ops(&old, id, key);
                self.release(&old);
                reverse
            }
            None => vec![Op::DeleteNode {
                op_id: None,
                id: child.clone(),
            }],
        };

        let mut ops = self.to_ops(&child, id, key);
        self.stamp(&mut ops);
        if let Some(map) = self.map_mut(id) {
            map.entries.insert(key.to_string(), child);
            if let Some(op_id) = ops.first().and_then(Op::op_id) {
                map.pending.insert(key.to_string(), op_id.clone());
            }
        }
        self.invalidate(id);
        self.dispatch(
            ops,
            reverse,
            vec![StorageUpdate::map(id, key, KeyUpdate::Updated)],
        );
        Ok(())
    }

    /// Deletes the entry at `key`. Deleting a missing key is a no-op.
    pub(crate) fn map_delete(&mut self, id: &NodeId, key: &str) -> Result<(), NodeError> {
        self.assert_writable()?;
        self.expect_kind(id, NodeKind::Map)?;
        let Some(child) = self.map_mut(id).and_then(|m| m.entries.remove(key)) else {
            return Ok(());
        };

        let deleted = self.immutable(&child);
        let reverse = self.to_ops(&child, id, key);
        self.release(&child);
        self.invalidate(id);

        let op_id = self.next_op_id();
        self.dispatch(
            vec![Op::DeleteNode {
                op_id: Some(op_id),
                id: child,
            }],
            reverse,
            vec![StorageUpdate::map(id, key, KeyUpdate::Deleted { deleted })],
        );
        Ok(())
    }

    pub(crate) fn map_attach_child(&mut self, op: &CreateOp, source: OpSource) -> ApplyResult {
        let id = &op.parent_id;
        let key = op.parent_key.as_str();

        if self.contains(&op.id) {
            if let Some(map) = self.map_mut(id) {
                if op.op_id.is_some() && map.pending.get(key) == op.op_id.as_ref() {
                    map.pending.remove(key);
                }
            }
            return ApplyResult::NotModified;
        }

        let decision = resolve_key_write(
            self.map(id).and_then(|m| m.pending.get(key)),
            op.op_id.as_ref(),
            source,
        );
        match decision {
            KeyWrite::Ignore => return ApplyResult::NotModified,
            KeyWrite::Acknowledge => {
                if let Some(map) = self.map_mut(id) {
                    map.pending.remove(key);
                }
                return ApplyResult::NotModified;
            }
            KeyWrite::Apply => {}
        }
        if source == OpSource::UndoRedo {
            if let (Some(map), Some(op_id)) = (self.map_mut(id), op.op_id.as_ref()) {
                map.pending.insert(key.to_string(), op_id.clone());
            }
        }

        let previous = self.map_mut(id).and_then(|m| m.entries.remove(key));
        let reverse = match previous {
            Some(old) => {
                let reverse = self.to_ops(&old, id, key);
                self.release(&old);
                reverse
            }
            None => vec![Op::DeleteNode {
                op_id: None,
                id: op.id.clone(),
            }],
        };
        if let Err(e) = self.create_child(op, ParentLink::attached(id, key)) {
            tracing::warn!(error = %e, "Failed to create map entry");
            return ApplyResult::NotModified;
        }
        if let Some(map) = self.map_mut(id) {
            map.entries.insert(key.to_string(), op.id.clone());
        }
        self.invalidate(id);
        ApplyResult::modified(StorageUpdate::map(id, key, KeyUpdate::Updated), reverse)
    }

    pub(crate) fn map_detach_child(&mut self, id: &NodeId, child: &NodeId, key: &str) -> ApplyResult {
        if self.map(id).and_then(|m| m.entries.get(key)) != Some(child) {
            return ApplyResult::NotModified;
        }
        let deleted = self.immutable(child);
        let reverse = self.to_ops(child, id, key);
        if let Some(map) = self.map_mut(id) {
            map.entries.remove(key);
        }
        self.release(child);
        self.invalidate(id);
        ApplyResult::modified(
            StorageUpdate::map(id, key, KeyUpdate::Deleted { deleted }),
            reverse,
        )
    }
}
