//! Records: named fields holding JSON values or nested nodes.
//!
//! Concurrent writes to one key are last-writer-wins in authority order. A
//! key with a pending local write keeps its local value: remote writes to it
//! are ignored until the authority relays the local write back.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use super::{ApplyResult, KeyWrite, ParentLink, resolve_key_write};
use crate::errors::NodeError;
use crate::ids::{NodeId, OpId};
use crate::node::NodeKind;
use crate::op::{CreateOp, Op, OpSource};
use crate::pool::Pool;
use crate::update::{KeyUpdate, StorageUpdate};
use crate::value::{Immutable, JsonObject, Lson};

/// One record field.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Field {
    Value(Value),
    Node(NodeId),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RecordNode {
    pub(crate) fields: BTreeMap<String, Field>,
    /// Op id of the last unacknowledged local write, per key.
    pub(crate) pending: HashMap<String, OpId>,
}

impl RecordNode {
    pub(crate) fn from_data(data: JsonObject) -> Self {
        Self {
            fields: data.into_iter().map(|(k, v)| (k, Field::Value(v))).collect(),
            pending: HashMap::new(),
        }
    }

    /// The plain-value fields, as carried by creation ops and snapshots.
    pub(crate) fn scalar_data(&self) -> JsonObject {
        self.fields
            .iter()
            .filter_map(|(key, field)| match field {
                Field::Value(v) => Some((key.clone(), v.clone())),
                Field::Node(_) => None,
            })
            .collect()
    }

    pub(crate) fn child_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.fields.values().filter_map(|field| match field {
            Field::Node(id) => Some(id),
            Field::Value(_) => None,
        })
    }
}

fn single(key: &str, value: Value) -> JsonObject {
    let mut data = JsonObject::new();
    data.insert(key.to_string(), value);
    data
}

impl Pool {
    // ===== Local mutations =====

    /// Writes every key of `patch`. Plain values travel in one
    /// `UpdateRecord`; nested values are created as child nodes.
    pub(crate) fn record_update(
        &mut self,
        id: &NodeId,
        patch: BTreeMap<String, Lson>,
    ) -> Result<(), NodeError> {
        self.assert_writable()?;
        self.expect_kind(id, NodeKind::Record)?;
        if patch.is_empty() {
            return Ok(());
        }

        let update_op_id = self.next_op_id();
        let mut ops = Vec::new();
        let mut reverse = Vec::new();
        let mut data = JsonObject::new();
        let mut reverse_data = JsonObject::new();
        let mut keys = BTreeMap::new();

        for (key, value) in patch {
            match self.record_mut(id).and_then(|r| r.fields.remove(&key)) {
                Some(Field::Value(old)) => {
                    reverse_data.insert(key.clone(), old);
                }
                Some(Field::Node(old)) => {
                    reverse.extend(self.to_ops(&old, id, &key));
                    self.release(&old);
                }
                None => reverse.push(Op::DeleteKey {
                    op_id: None,
                    id: id.clone(),
                    key: key.clone(),
                }),
            }

            let (field, marker) = match value {
                Lson::Value(v) => {
                    data.insert(key.clone(), v.clone());
                    (Field::Value(v), update_op_id.clone())
                }
                nested => {
                    let child = self.attach_lson(nested, id, &key)?;
                    let mut creation = self.to_ops(&child, id, &key);
                    self.stamp(&mut creation);
                    let marker = creation
                        .first()
                        .and_then(Op::op_id)
                        .cloned()
                        .unwrap_or_else(|| update_op_id.clone());
                    ops.extend(creation);
                    (Field::Node(child), marker)
                }
            };
            if let Some(record) = self.record_mut(id) {
                record.fields.insert(key.clone(), field);
                record.pending.insert(key.clone(), marker);
            }
            keys.insert(key, KeyUpdate::Updated);
        }

        if !reverse_data.is_empty() {
            reverse.insert(
                0,
                Op::UpdateRecord {
                    op_id: None,
                    id: id.clone(),
                    data: reverse_data,
                },
            );
        }
        if !data.is_empty() {
            ops.insert(
                0,
                Op::UpdateRecord {
                    op_id: Some(update_op_id),
                    id: id.clone(),
                    data,
                },
            );
        }

        self.invalidate(id);
        self.dispatch(
            ops,
            reverse,
            vec![StorageUpdate::Record {
                node: id.clone(),
                updates: keys,
            }],
        );
        Ok(())
    }

    /// Removes `key`. Deleting a missing key is a no-op.
    pub(crate) fn record_delete(&mut self, id: &NodeId, key: &str) -> Result<(), NodeError> {
        self.assert_writable()?;
        self.expect_kind(id, NodeKind::Record)?;
        let Some(previous) = self.record_mut(id).and_then(|r| r.fields.remove(key)) else {
            return Ok(());
        };

        let (reverse, deleted) = self.take_field(id, key, previous);
        let op_id = self.next_op_id();
        if let Some(record) = self.record_mut(id) {
            record.pending.insert(key.to_string(), op_id.clone());
        }
        self.invalidate(id);
        self.dispatch(
            vec![Op::DeleteKey {
                op_id: Some(op_id),
                id: id.clone(),
                key: key.to_string(),
            }],
            reverse,
            vec![StorageUpdate::record(id, key, KeyUpdate::Deleted { deleted })],
        );
        Ok(())
    }

    /// Reverse ops and last value of a field already removed from the
    /// record. A nested node is released.
    fn take_field(&mut self, id: &NodeId, key: &str, previous: Field) -> (Vec<Op>, Immutable) {
        match previous {
            Field::Value(old) => (
                vec![Op::UpdateRecord {
                    op_id: None,
                    id: id.clone(),
                    data: single(key, old.clone()),
                }],
                Immutable::Value(old),
            ),
            Field::Node(child) => {
                let deleted = self.immutable(&child);
                let reverse = self.to_ops(&child, id, key);
                self.release(&child);
                (reverse, deleted)
            }
        }
    }

    /// Reverse op restoring a key that is about to be overwritten.
    fn reverse_of_overwrite(&mut self, id: &NodeId, key: &str, previous: Option<Field>) -> Vec<Op> {
        match previous {
            Some(field) => self.take_field(id, key, field).0,
            None => vec![Op::DeleteKey {
                op_id: None,
                id: id.clone(),
                key: key.to_string(),
            }],
        }
    }

    fn record_key_write(
        &mut self,
        id: &NodeId,
        key: &str,
        op_id: Option<&OpId>,
        source: OpSource,
    ) -> KeyWrite {
        let decision = resolve_key_write(
            self.record(id).and_then(|r| r.pending.get(key)),
            op_id,
            source,
        );
        if let Some(record) = self.record_mut(id) {
            match decision {
                KeyWrite::Acknowledge => {
                    record.pending.remove(key);
                }
                KeyWrite::Apply if source == OpSource::UndoRedo => {
                    if let Some(op_id) = op_id {
                        record.pending.insert(key.to_string(), op_id.clone());
                    }
                }
                _ => {}
            }
        }
        decision
    }

    // ===== Inbound ops =====

    pub(crate) fn record_apply_update(
        &mut self,
        id: &NodeId,
        op_id: Option<&OpId>,
        data: &JsonObject,
        source: OpSource,
    ) -> ApplyResult {
        let mut reverse = Vec::new();
        let mut reverse_data = JsonObject::new();
        let mut keys = BTreeMap::new();

        for (key, value) in data {
            if self.record_key_write(id, key, op_id, source) != KeyWrite::Apply {
                continue;
            }
            let previous = self
                .record_mut(id)
                .and_then(|r| r.fields.insert(key.clone(), Field::Value(value.clone())));
            match previous {
                Some(Field::Value(old)) => {
                    reverse_data.insert(key.clone(), old);
                }
                Some(Field::Node(old)) => {
                    reverse.extend(self.to_ops(&old, id, key));
                    self.release(&old);
                }
                None => reverse.push(Op::DeleteKey {
                    op_id: None,
                    id: id.clone(),
                    key: key.clone(),
                }),
            }
            keys.insert(key.clone(), KeyUpdate::Updated);
        }

        if keys.is_empty() {
            return ApplyResult::NotModified;
        }
        if !reverse_data.is_empty() {
            reverse.insert(
                0,
                Op::UpdateRecord {
                    op_id: None,
                    id: id.clone(),
                    data: reverse_data,
                },
            );
        }
        self.invalidate(id);
        ApplyResult::modified(
            StorageUpdate::Record {
                node: id.clone(),
                updates: keys,
            },
            reverse,
        )
    }

    pub(crate) fn record_apply_delete_key(
        &mut self,
        id: &NodeId,
        op_id: Option<&OpId>,
        key: &str,
        source: OpSource,
    ) -> ApplyResult {
        if self.record_key_write(id, key, op_id, source) != KeyWrite::Apply {
            return ApplyResult::NotModified;
        }
        let Some(previous) = self.record_mut(id).and_then(|r| r.fields.remove(key)) else {
            return ApplyResult::NotModified;
        };
        let (reverse, deleted) = self.take_field(id, key, previous);
        self.invalidate(id);
        ApplyResult::modified(
            StorageUpdate::record(id, key, KeyUpdate::Deleted { deleted }),
            reverse,
        )
    }

    pub(crate) fn record_attach_child(&mut self, op: &CreateOp, source: OpSource) -> ApplyResult {
        let id = &op.parent_id;
        let key = op.parent_key.as_str();

        if self.contains(&op.id) {
            // Our own creation relayed back (or a duplicate): only the marker changes.
            if let Some(record) = self.record_mut(id) {
                if op.op_id.is_some() && record.pending.get(key) == op.op_id.as_ref() {
                    record.pending.remove(key);
                }
            }
            return ApplyResult::NotModified;
        }
        if self.record_key_write(id, key, op.op_id.as_ref(), source) != KeyWrite::Apply {
            return ApplyResult::NotModified;
        }

        let previous = self.record_mut(id).and_then(|r| r.fields.remove(key));
        let reverse = self.reverse_of_overwrite(id, key, previous);
        if let Err(e) = self.create_child(op, ParentLink::attached(id, key)) {
            tracing::warn!(error = %e, "Failed to create record child");
            return ApplyResult::NotModified;
        }
        if let Some(record) = self.record_mut(id) {
            record
                .fields
                .insert(key.to_string(), Field::Node(op.id.clone()));
        }
        self.invalidate(id);
        ApplyResult::modified(StorageUpdate::record(id, key, KeyUpdate::Updated), reverse)
    }

    /// Detaches the nested node `child` stored under `key`.
    pub(crate) fn record_detach_child(
        &mut self,
        id: &NodeId,
        child: &NodeId,
        key: &str,
    ) -> ApplyResult {
        let holds_child = self
            .record(id)
            .and_then(|r| r.fields.get(key))
            .is_some_and(|field| *field == Field::Node(child.clone()));
        if !holds_child {
            return ApplyResult::NotModified;
        }
        let Some(previous) = self.record_mut(id).and_then(|r| r.fields.remove(key)) else {
            return ApplyResult::NotModified;
        };
        let (reverse, deleted) = self.take_field(id, key, previous);
        self.invalidate(id);
        ApplyResult::modified(
            StorageUpdate::record(id, key, KeyUpdate::Deleted { deleted }),
            reverse,
        )
    }
}
