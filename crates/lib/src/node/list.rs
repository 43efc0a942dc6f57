//! Lists: children ordered by fractional positions.
//!
//! Every item's parent key is its [`Position`]; `items` is kept sorted by it.
//! Positions are unique within a list, so any op landing on an occupied
//! position first moves the occupant out of the way (a *shift*) or hides it
//! (an *orphan*, kept in `implicitly_deleted` until the authority confirms
//! what happened to it).
//!
//! Inbound creation ops are resolved along two axes: where the op comes from
//! ([`OpSource`]) and whether it inserts a new item or replaces one
//! (`intent: set`). See [`Pool::list_attach_child`].

use std::collections::{HashMap, HashSet};

use super::{ApplyResult, ParentLink};
use crate::errors::NodeError;
use crate::ids::{NodeId, OpId};
use crate::node::NodeKind;
use crate::op::{CreateOp, Intent, Op, OpSource};
use crate::pool::Pool;
use crate::position::Position;
use crate::update::{ListDelta, StorageUpdate};
use crate::value::Lson;

#[derive(Debug, Clone, Default)]
pub(crate) struct ListNode {
    /// Visible items, sorted by position.
    pub(crate) items: Vec<NodeId>,
    /// Items hidden until the authority confirms what happened to them:
    /// displaced by a conflicting remote write, or replaced by an undo set
    /// still in flight.
    pub(crate) implicitly_deleted: HashSet<NodeId>,
    /// Pending local set ops, by the position they target.
    pub(crate) unacknowledged_sets: HashMap<Position, OpId>,
    /// Pending local moves, by item.
    pub(crate) pending_moves: HashMap<NodeId, OpId>,
}

/// Turns the first creation op of a subtree into a set replacing `superseded`.
fn mark_set(ops: &mut [Op], superseded: &NodeId) {
    if let Some(Op::Create(create)) = ops.first_mut() {
        create.intent = Some(Intent::Set);
        create.superseded_id = Some(superseded.clone());
    }
}

impl Pool {
    // ===== Queries =====

    pub(crate) fn list_items(&self, list: &NodeId) -> &[NodeId] {
        self.list(list).map(|l| l.items.as_slice()).unwrap_or(&[])
    }

    pub(crate) fn list_len(&self, list: &NodeId) -> usize {
        self.list_items(list).len()
    }

    pub(crate) fn list_index_of(&self, list: &NodeId, child: &NodeId) -> Option<usize> {
        self.list_items(list).iter().position(|item| item == child)
    }

    pub(crate) fn list_position_at(&self, list: &NodeId, index: usize) -> Option<Position> {
        let child = self.list_items(list).get(index)?;
        self.key_of(child).map(Position::from)
    }

    pub(crate) fn list_index_of_position(&self, list: &NodeId, position: &Position) -> Option<usize> {
        self.list_items(list)
            .iter()
            .position(|item| self.key_of(item) == Some(position.as_str()))
    }

    fn list_occupant(&self, list: &NodeId, position: &Position) -> Option<NodeId> {
        let index = self.list_index_of_position(list, position)?;
        self.list_items(list).get(index).cloned()
    }

    fn list_is_orphan(&self, list: &NodeId, child: &NodeId) -> bool {
        self.list(list)
            .is_some_and(|l| l.implicitly_deleted.contains(child))
    }

    fn list_bounds(&self, list: &NodeId, index: usize, len: usize) -> Result<(), NodeError> {
        if index >= len {
            return Err(NodeError::IndexOutOfBounds {
                index,
                len: self.list_len(list),
            });
        }
        Ok(())
    }

    // ===== Ordering helpers =====

    /// Re-sorts `items` by position. Ties, which only a misbehaving peer can
    /// produce, are broken by id.
    pub(crate) fn list_sort(&mut self, list: &NodeId) {
        let Some(mut items) = self.list_mut(list).map(|l| std::mem::take(&mut l.items)) else {
            return;
        };
        items.sort_by(|a, b| {
            self.key_of(a)
                .cmp(&self.key_of(b))
                .then_with(|| a.cmp(b))
        });
        if let Some(l) = self.list_mut(list) {
            l.items = items;
        }
        self.invalidate(list);
    }

    fn list_place(&mut self, list: &NodeId, child: &NodeId, position: &Position) {
        self.set_parent_link(child, ParentLink::attached(list, position.as_str()));
    }

    fn list_move_to(&mut self, list: &NodeId, child: &NodeId, position: &Position) {
        self.list_place(list, child, position);
        self.list_sort(list);
    }

    fn list_insert_sorted(&mut self, list: &NodeId, child: &NodeId) {
        if let Some(l) = self.list_mut(list) {
            l.items.push(child.clone());
        }
        self.list_sort(list);
    }

    /// Moves the item at `index`, which sits on `from`, just after `from`.
    /// Relative order is unchanged.
    fn list_shift(&mut self, list: &NodeId, index: usize, from: &Position) {
        let Some(occupant) = self.list_items(list).get(index).cloned() else {
            return;
        };
        let next = self.list_position_at(list, index + 1);
        let shifted = Position::make(Some(from), next.as_ref());
        tracing::debug!(node_id = %occupant, from = %from, to = %shifted, "Shifting list item");
        self.list_place(list, &occupant, &shifted);
    }

    /// Position next to the occupant of `position`, or `position` itself if free.
    fn list_free_position(&self, list: &NodeId, position: &Position) -> Position {
        match self.list_index_of_position(list, position) {
            Some(index) => {
                let next = self.list_position_at(list, index + 1);
                Position::make(Some(position), next.as_ref())
            }
            None => position.clone(),
        }
    }

    fn list_create_item(&mut self, list: &NodeId, op: &CreateOp, position: &Position) -> bool {
        match self.create_child(op, ParentLink::attached(list, position.as_str())) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to create list item");
                false
            }
        }
    }

    fn list_insert_delta(&self, list: &NodeId, child: &NodeId) -> Option<ListDelta> {
        let index = self.list_index_of(list, child)?;
        Some(ListDelta::Insert {
            index,
            item: self.immutable(child),
        })
    }

    // ===== Hiding and removing items =====

    fn list_mark_orphan(&mut self, list: &NodeId, child: &NodeId) {
        let key = self.key_of(child).unwrap_or_default().to_string();
        tracing::debug!(node_id = %child, list_id = %list, "Hiding displaced list item");
        self.set_parent_link(
            child,
            ParentLink::Orphaned {
                parent: list.clone(),
                key,
            },
        );
        if let Some(l) = self.list_mut(list) {
            l.implicitly_deleted.insert(child.clone());
        }
    }

    /// Hides a visible item displaced by a conflicting write.
    fn list_orphan(&mut self, list: &NodeId, child: &NodeId) -> Option<ListDelta> {
        let index = self.list_index_of(list, child)?;
        let deleted = self.immutable(child);
        if let Some(l) = self.list_mut(list) {
            l.items.remove(index);
        }
        self.list_mark_orphan(list, child);
        self.invalidate(list);
        Some(ListDelta::Delete { index, deleted })
    }

    fn list_resurrect(&mut self, list: &NodeId, child: &NodeId, position: &Position) {
        if let Some(l) = self.list_mut(list) {
            l.implicitly_deleted.remove(child);
            l.items.push(child.clone());
        }
        self.list_move_to(list, child, position);
    }

    /// Puts an item we already hold, visible or hidden, on `position`. Another
    /// item on that position is hidden when `hide_occupant` is set and
    /// shifted otherwise.
    fn list_place_existing(
        &mut self,
        list: &NodeId,
        child: &NodeId,
        position: &Position,
        hide_occupant: bool,
    ) -> Vec<ListDelta> {
        let mut deltas = Vec::new();
        if self.key_of(child) == Some(position.as_str()) && self.list_index_of(list, child).is_some() {
            return deltas;
        }
        let occupant = self
            .list_occupant(list, position)
            .filter(|occupant| occupant != child);
        if let Some(occupant) = occupant {
            if hide_occupant {
                deltas.extend(self.list_orphan(list, &occupant));
            } else if let Some(index) = self.list_index_of(list, &occupant) {
                self.list_shift(list, index, position);
            }
        }
        match self.list_index_of(list, child) {
            Some(previous_index) => {
                self.list_move_to(list, child, position);
                if let Some(index) = self.list_index_of(list, child) {
                    if index != previous_index {
                        deltas.push(ListDelta::Move {
                            previous_index,
                            index,
                            item: self.immutable(child),
                        });
                    }
                }
            }
            None => {
                self.list_resurrect(list, child, position);
                deltas.extend(self.list_insert_delta(list, child));
            }
        }
        deltas
    }

    /// Drops a hidden item for good.
    pub(crate) fn list_forget(&mut self, list: &NodeId, child: &NodeId) {
        if let Some(l) = self.list_mut(list) {
            l.implicitly_deleted.remove(child);
            l.pending_moves.remove(child);
        }
        self.release(child);
    }

    /// Removes a visible item and its subtree. Returns the delta and the
    /// ops recreating the item.
    fn list_remove(&mut self, list: &NodeId, child: &NodeId) -> Option<(ListDelta, Vec<Op>)> {
        let index = self.list_index_of(list, child)?;
        let key = self.key_of(child)?.to_string();
        let deleted = self.immutable(child);
        let reverse = self.to_ops(child, list, &key);
        if let Some(l) = self.list_mut(list) {
            l.items.remove(index);
            l.pending_moves.remove(child);
        }
        self.release(child);
        self.invalidate(list);
        Some((ListDelta::Delete { index, deleted }, reverse))
    }

    /// Removes the item a set op replaces, unless we re-created it ourselves
    /// after the set was issued.
    fn list_detach_superseded(&mut self, list: &NodeId, superseded: Option<&NodeId>) -> Option<ListDelta> {
        let superseded = superseded?;
        if self.is_pending_creation(superseded) {
            return None;
        }
        if self.list_is_orphan(list, superseded) {
            self.list_forget(list, superseded);
            return None;
        }
        self.list_remove(list, superseded).map(|(delta, _)| delta)
    }

    /// Hides the item an undo or redo set replaces. The authority may drop the
    /// set when another replica restored the same item first, and the hidden
    /// item then comes back.
    fn list_hide_superseded(&mut self, list: &NodeId, superseded: Option<&NodeId>) -> Option<ListDelta> {
        self.list_orphan(list, superseded?)
    }

    /// Undoes the local effect of a set the authority dropped.
    pub(crate) fn list_restore_superseded(&mut self, op: &CreateOp) -> ApplyResult {
        let list = &op.parent_id;
        let Some(superseded) = op.superseded_id.as_ref() else {
            return ApplyResult::NotModified;
        };
        if !self.list_is_orphan(list, superseded) {
            return ApplyResult::NotModified;
        }
        let Some(position) = self.key_of(superseded).map(Position::from) else {
            return ApplyResult::NotModified;
        };
        tracing::debug!(node_id = %superseded, list_id = %list, "Restoring item of a dropped set");
        let deltas = self.list_place_existing(list, superseded, &position, false);
        self.list_finish(list, deltas, Vec::new())
    }

    fn list_finish(&self, list: &NodeId, deltas: Vec<ListDelta>, reverse: Vec<Op>) -> ApplyResult {
        if deltas.is_empty() && reverse.is_empty() {
            return ApplyResult::NotModified;
        }
        ApplyResult::modified(StorageUpdate::list(list, deltas), reverse)
    }

    // ===== Local mutations =====

    pub(crate) fn list_insert(&mut self, list: &NodeId, index: usize, value: Lson) -> Result<(), NodeError> {
        self.assert_writable()?;
        self.expect_kind(list, NodeKind::List)?;
        let len = self.list_len(list);
        self.list_bounds(list, index, len + 1)?;

        let before = index
            .checked_sub(1)
            .and_then(|i| self.list_position_at(list, i));
        let after = self.list_position_at(list, index);
        let position = Position::make(before.as_ref(), after.as_ref());

        let child = self.attach_lson(value, list, position.as_str())?;
        self.list_insert_sorted(list, &child);
        let mut ops = self.to_ops(&child, list, position.as_str());
        self.stamp(&mut ops);
        let deltas = self.list_insert_delta(list, &child).into_iter().collect();
        self.dispatch(
            ops,
            vec![Op::DeleteNode {
                op_id: None,
                id: child,
            }],
            vec![StorageUpdate::list(list, deltas)],
        );
        Ok(())
    }

    pub(crate) fn list_push(&mut self, list: &NodeId, value: Lson) -> Result<(), NodeError> {
        let len = self.list_len(list);
        self.list_insert(list, len, value)
    }

    /// Moves the item at `index` so that it ends up at `target`.
    pub(crate) fn list_move(&mut self, list: &NodeId, index: usize, target: usize) -> Result<(), NodeError> {
        self.assert_writable()?;
        self.expect_kind(list, NodeKind::List)?;
        let len = self.list_len(list);
        self.list_bounds(list, index, len)?;
        self.list_bounds(list, target, len)?;
        if index == target {
            return Ok(());
        }

        let (before, after) = if index < target {
            (
                self.list_position_at(list, target),
                self.list_position_at(list, target + 1),
            )
        } else {
            (
                target
                    .checked_sub(1)
                    .and_then(|i| self.list_position_at(list, i)),
                self.list_position_at(list, target),
            )
        };
        let position = Position::make(before.as_ref(), after.as_ref());

        let Some(child) = self.list_items(list).get(index).cloned() else {
            return Ok(());
        };
        let previous = self.key_of(&child).unwrap_or_default().to_string();
        self.list_move_to(list, &child, &position);
        let new_index = self.list_index_of(list, &child).unwrap_or(target);

        let op_id = self.next_op_id();
        if let Some(l) = self.list_mut(list) {
            l.pending_moves.insert(child.clone(), op_id.clone());
        }
        let item = self.immutable(&child);
        self.dispatch(
            vec![Op::SetParentKey {
                op_id: Some(op_id),
                id: child.clone(),
                parent_key: position.into(),
            }],
            vec![Op::SetParentKey {
                op_id: None,
                id: child,
                parent_key: previous,
            }],
            vec![StorageUpdate::list(
                list,
                vec![ListDelta::Move {
                    previous_index: index,
                    index: new_index,
                    item,
                }],
            )],
        );
        Ok(())
    }

    pub(crate) fn list_delete(&mut self, list: &NodeId, index: usize) -> Result<(), NodeError> {
        self.assert_writable()?;
        self.expect_kind(list, NodeKind::List)?;
        self.list_bounds(list, index, self.list_len(list))?;
        let Some(child) = self.list_items(list).get(index).cloned() else {
            return Ok(());
        };
        let Some((delta, reverse)) = self.list_remove(list, &child) else {
            return Ok(());
        };
        let op_id = self.next_op_id();
        self.dispatch(
            vec![Op::DeleteNode {
                op_id: Some(op_id),
                id: child,
            }],
            reverse,
            vec![StorageUpdate::list(list, vec![delta])],
        );
        Ok(())
    }

    /// Replaces the item at `index` in place, keeping its position.
    pub(crate) fn list_set(&mut self, list: &NodeId, index: usize, value: Lson) -> Result<(), NodeError> {
        self.assert_writable()?;
        self.expect_kind(list, NodeKind::List)?;
        self.list_bounds(list, index, self.list_len(list))?;
        let Some(old) = self.list_items(list).get(index).cloned() else {
            return Ok(());
        };
        let position = Position::from(self.key_of(&old).unwrap_or_default());

        let mut reverse = self.to_ops(&old, list, position.as_str());
        let child = self.attach_lson(value, list, position.as_str())?;
        mark_set(&mut reverse, &child);
        if let Some(l) = self.list_mut(list) {
            l.items[index] = child.clone();
            l.pending_moves.remove(&old);
        }
        self.release(&old);
        self.invalidate(list);

        let mut ops = self.to_ops(&child, list, position.as_str());
        self.stamp(&mut ops);
        mark_set(&mut ops, &old);
        if let (Some(op_id), Some(l)) = (ops.first().and_then(Op::op_id).cloned(), self.list_mut(list)) {
            l.unacknowledged_sets.insert(position, op_id);
        }
        let item = self.immutable(&child);
        self.dispatch(
            ops,
            reverse,
            vec![StorageUpdate::list(list, vec![ListDelta::Set { index, item }])],
        );
        Ok(())
    }

    pub(crate) fn list_clear(&mut self, list: &NodeId) -> Result<(), NodeError> {
        self.assert_writable()?;
        self.expect_kind(list, NodeKind::List)?;
        let items = self.list_items(list).to_vec();
        if items.is_empty() {
            return Ok(());
        }

        let mut ops = Vec::new();
        let mut reverse = Vec::new();
        let mut deltas = Vec::new();
        for child in items {
            if let Some((delta, item_reverse)) = self.list_remove(list, &child) {
                let op_id = self.next_op_id();
                ops.push(Op::DeleteNode {
                    op_id: Some(op_id),
                    id: child,
                });
                reverse.extend(item_reverse);
                deltas.push(delta);
            }
        }
        self.dispatch(ops, reverse, vec![StorageUpdate::list(list, deltas)]);
        Ok(())
    }

    // ===== Inbound creation =====

    /// Applies a creation op under this list.
    ///
    /// | source   | insert                              | set (`intent: set`)                     |
    /// |----------|-------------------------------------|-----------------------------------------|
    /// | Remote   | shift occupant, insert              | replace occupant, drop superseded item  |
    /// | Ack      | move own item to confirmed position | confirm own replacement                 |
    /// | UndoRedo | insert next to any occupant         | replace superseded item if still there  |
    pub(crate) fn list_attach_child(&mut self, op: &CreateOp, source: OpSource) -> ApplyResult {
        let position = Position::normalize(&op.parent_key);
        match (source, op.is_set()) {
            (OpSource::Remote, false) => self.list_apply_remote_insert(op, &position),
            (OpSource::Remote, true) => self.list_apply_remote_set(op, &position),
            (OpSource::Ack, false) => self.list_apply_insert_ack(op, &position),
            (OpSource::Ack, true) => self.list_apply_set_ack(op, &position),
            (OpSource::UndoRedo, false) => self.list_apply_insert_undo_redo(op, &position),
            (OpSource::UndoRedo, true) => self.list_apply_set_undo_redo(op, &position),
        }
    }

    fn list_apply_remote_insert(&mut self, op: &CreateOp, position: &Position) -> ApplyResult {
        let list = &op.parent_id;
        if self.contains(&op.id) {
            return self.list_apply_remote_recreation(op, position);
        }
        if let Some(index) = self.list_index_of_position(list, position) {
            self.list_shift(list, index, position);
        }
        if !self.list_create_item(list, op, position) {
            return ApplyResult::NotModified;
        }
        self.list_insert_sorted(list, &op.id);
        let deltas = self.list_insert_delta(list, &op.id).into_iter().collect();
        self.list_finish(list, deltas, Vec::new())
    }

    fn list_apply_remote_set(&mut self, op: &CreateOp, position: &Position) -> ApplyResult {
        let list = &op.parent_id;
        if self.contains(&op.id) {
            return self.list_apply_remote_recreation(op, position);
        }
        let mut deltas = Vec::new();

        match self.list_index_of_position(list, position) {
            Some(index) => {
                let Some(occupant) = self.list_items(list).get(index).cloned() else {
                    return ApplyResult::NotModified;
                };
                if !self.list_create_item(list, op, position) {
                    return ApplyResult::NotModified;
                }
                if let Some(l) = self.list_mut(list) {
                    l.items[index] = op.id.clone();
                }
                let replaces = op.superseded_id.as_ref() == Some(&occupant)
                    && !self.is_pending_creation(&occupant);
                if replaces {
                    if let Some(l) = self.list_mut(list) {
                        l.pending_moves.remove(&occupant);
                    }
                    self.release(&occupant);
                } else {
                    self.list_mark_orphan(list, &occupant);
                }
                self.invalidate(list);
                deltas.push(ListDelta::Set {
                    index,
                    item: self.immutable(&op.id),
                });
                if !replaces {
                    deltas.extend(self.list_detach_superseded(list, op.superseded_id.as_ref()));
                }
            }
            None => {
                deltas.extend(self.list_detach_superseded(list, op.superseded_id.as_ref()));
                if self.list_create_item(list, op, position) {
                    self.list_insert_sorted(list, &op.id);
                    deltas.extend(self.list_insert_delta(list, &op.id));
                }
            }
        }
        self.list_finish(list, deltas, Vec::new())
    }

    /// A relayed creation of an item we still hold, visible or hidden. Our
    /// own undo re-created the same item and the authority took the other
    /// copy first, so its position stands until our copy is acknowledged.
    fn list_apply_remote_recreation(&mut self, op: &CreateOp, position: &Position) -> ApplyResult {
        let list = &op.parent_id;
        let visible = self.list_index_of(list, &op.id).is_some();
        if !visible && !self.list_is_orphan(list, &op.id) {
            tracing::warn!(node_id = %op.id, list_id = %list, "Relayed item belongs elsewhere");
            return ApplyResult::NotModified;
        }
        let mut deltas = Vec::new();
        if op.is_set() {
            deltas.extend(self.list_detach_superseded(list, op.superseded_id.as_ref()));
        }
        let moving = self
            .list(list)
            .is_some_and(|l| l.pending_moves.contains_key(&op.id));
        if !(visible && moving) {
            deltas.extend(self.list_place_existing(list, &op.id, position, op.is_set()));
        }
        self.list_finish(list, deltas, Vec::new())
    }

    fn list_apply_insert_ack(&mut self, op: &CreateOp, position: &Position) -> ApplyResult {
        let list = &op.parent_id;
        let mut deltas = Vec::new();
        let occupant_index = self
            .list_index_of_position(list, position)
            .filter(|&i| self.list_items(list).get(i) != Some(&op.id));

        if let Some(previous_index) = self.list_index_of(list, &op.id) {
            if self.key_of(&op.id) == Some(position.as_str()) {
                return ApplyResult::NotModified;
            }
            if let Some(index) = occupant_index {
                self.list_shift(list, index, position);
            }
            self.list_move_to(list, &op.id, position);
            if let Some(index) = self.list_index_of(list, &op.id) {
                if index != previous_index {
                    deltas.push(ListDelta::Move {
                        previous_index,
                        index,
                        item: self.immutable(&op.id),
                    });
                }
            }
        } else if self.list_is_orphan(list, &op.id) {
            if let Some(index) = occupant_index {
                self.list_shift(list, index, position);
            }
            self.list_resurrect(list, &op.id, position);
            deltas.extend(self.list_insert_delta(list, &op.id));
        } else if self.contains(&op.id) {
            tracing::warn!(node_id = %op.id, list_id = %list, "Acknowledged item belongs elsewhere");
        } else {
            // Deleted locally or evicted, but the authority kept it
            if let Some(index) = occupant_index {
                self.list_shift(list, index, position);
            }
            if self.list_create_item(list, op, position) {
                self.list_insert_sorted(list, &op.id);
                deltas.extend(self.list_insert_delta(list, &op.id));
            }
        }
        self.list_finish(list, deltas, Vec::new())
    }

    fn list_apply_set_ack(&mut self, op: &CreateOp, position: &Position) -> ApplyResult {
        let list = &op.parent_id;
        let mut deltas = Vec::new();
        deltas.extend(self.list_detach_superseded(list, op.superseded_id.as_ref()));
        let exists = self.contains(&op.id);

        // A newer local set to the same position is still in flight
        let superseded_locally = match (self.list_mut(list), op.op_id.as_ref()) {
            (Some(l), Some(op_id)) => {
                l.unacknowledged_sets
                    .retain(|key, pending| key == position || *pending != *op_id);
                match l.unacknowledged_sets.get(position) {
                    Some(pending) if pending == op_id => {
                        l.unacknowledged_sets.remove(position);
                        false
                    }
                    Some(_) => true,
                    None => false,
                }
            }
            _ => false,
        };
        if superseded_locally && !exists {
            return self.list_finish(list, deltas, Vec::new());
        }

        let occupant = self
            .list_occupant(list, position)
            .filter(|occupant| occupant != &op.id);

        if self.list_index_of(list, &op.id).is_some() {
            if self.key_of(&op.id) == Some(position.as_str()) {
                return self.list_finish(list, deltas, Vec::new());
            }
            if let Some(occupant) = &occupant {
                deltas.extend(self.list_orphan(list, occupant));
            }
            let Some(previous_index) = self.list_index_of(list, &op.id) else {
                return self.list_finish(list, deltas, Vec::new());
            };
            self.list_move_to(list, &op.id, position);
            if let Some(index) = self.list_index_of(list, &op.id) {
                if index != previous_index {
                    deltas.push(ListDelta::Move {
                        previous_index,
                        index,
                        item: self.immutable(&op.id),
                    });
                }
            }
        } else if self.list_is_orphan(list, &op.id) {
            if let Some(occupant) = &occupant {
                deltas.extend(self.list_orphan(list, occupant));
            }
            self.list_resurrect(list, &op.id, position);
            deltas.extend(self.list_insert_delta(list, &op.id));
        } else if exists {
            tracing::warn!(node_id = %op.id, list_id = %list, "Acknowledged item belongs elsewhere");
        } else {
            if let Some(occupant) = &occupant {
                deltas.extend(self.list_orphan(list, occupant));
            }
            if self.list_create_item(list, op, position) {
                self.list_insert_sorted(list, &op.id);
                deltas.extend(self.list_insert_delta(list, &op.id));
            }
        }
        self.list_finish(list, deltas, Vec::new())
    }

    fn list_apply_insert_undo_redo(&mut self, op: &CreateOp, position: &Position) -> ApplyResult {
        let list = &op.parent_id;
        if self.list_is_orphan(list, &op.id) {
            self.list_forget(list, &op.id);
        }
        if self.contains(&op.id) {
            return ApplyResult::NotModified;
        }
        let position = self.list_free_position(list, position);
        if !self.list_create_item(list, op, &position) {
            return ApplyResult::NotModified;
        }
        self.list_insert_sorted(list, &op.id);
        let deltas = self.list_insert_delta(list, &op.id).into_iter().collect();
        self.list_finish(
            list,
            deltas,
            vec![Op::DeleteNode {
                op_id: None,
                id: op.id.clone(),
            }],
        )
    }

    fn list_apply_set_undo_redo(&mut self, op: &CreateOp, position: &Position) -> ApplyResult {
        let list = &op.parent_id;
        if self.list_is_orphan(list, &op.id) {
            // Still hidden by the set being undone
            self.list_forget(list, &op.id);
        }
        if self.contains(&op.id) {
            return ApplyResult::NotModified;
        }
        if let (Some(op_id), Some(l)) = (op.op_id.clone(), self.list_mut(list)) {
            l.unacknowledged_sets.insert(position.clone(), op_id);
        }

        let occupant = self.list_occupant(list, position);
        if let Some(occupant) = occupant.filter(|o| op.superseded_id.as_ref() == Some(o)) {
            // The replaced item is still where the set expects it
            let Some(index) = self.list_index_of(list, &occupant) else {
                return ApplyResult::NotModified;
            };
            let mut reverse = self.to_ops(&occupant, list, position.as_str());
            mark_set(&mut reverse, &op.id);
            if !self.list_create_item(list, op, position) {
                return ApplyResult::NotModified;
            }
            if let Some(l) = self.list_mut(list) {
                l.items[index] = op.id.clone();
            }
            self.list_mark_orphan(list, &occupant);
            self.invalidate(list);
            let item = self.immutable(&op.id);
            return self.list_finish(list, vec![ListDelta::Set { index, item }], reverse);
        }

        let mut reverse = vec![Op::DeleteNode {
            op_id: None,
            id: op.id.clone(),
        }];
        if let Some(superseded) = op.superseded_id.as_ref() {
            if self.list_index_of(list, superseded).is_some() {
                if let Some(key) = self.key_of(superseded) {
                    reverse.extend(self.to_ops(superseded, list, key));
                }
            }
        }
        let position = self.list_free_position(list, position);
        if !self.list_create_item(list, op, &position) {
            return ApplyResult::NotModified;
        }
        self.list_insert_sorted(list, &op.id);
        let mut deltas: Vec<ListDelta> = self.list_insert_delta(list, &op.id).into_iter().collect();
        deltas.extend(self.list_hide_superseded(list, op.superseded_id.as_ref()));
        self.list_finish(list, deltas, reverse)
    }

    // ===== Inbound moves and deletes =====

    pub(crate) fn list_set_child_key(
        &mut self,
        list: &NodeId,
        child: &NodeId,
        position: Position,
        op_id: Option<&OpId>,
        source: OpSource,
    ) -> ApplyResult {
        match source {
            OpSource::Remote | OpSource::Ack => {
                self.list_apply_move(list, child, &position, op_id, source)
            }
            OpSource::UndoRedo => self.list_apply_move_undo_redo(list, child, &position, op_id),
        }
    }

    fn list_apply_move(
        &mut self,
        list: &NodeId,
        child: &NodeId,
        position: &Position,
        op_id: Option<&OpId>,
        source: OpSource,
    ) -> ApplyResult {
        let pending = self
            .list(list)
            .and_then(|l| l.pending_moves.get(child))
            .cloned();
        if let Some(pending) = pending {
            if source == OpSource::Ack && op_id == Some(&pending) {
                if let Some(l) = self.list_mut(list) {
                    l.pending_moves.remove(child);
                }
            } else {
                // Our own later move wins until it is acknowledged
                return ApplyResult::NotModified;
            }
        }

        let occupant_index = self
            .list_index_of_position(list, position)
            .filter(|&i| self.list_items(list).get(i) != Some(child));

        if self.list_is_orphan(list, child) {
            if let Some(index) = occupant_index {
                self.list_shift(list, index, position);
            }
            self.list_resurrect(list, child, position);
            let deltas = self.list_insert_delta(list, child).into_iter().collect();
            return self.list_finish(list, deltas, Vec::new());
        }

        let Some(previous_index) = self.list_index_of(list, child) else {
            return ApplyResult::NotModified;
        };
        if self.key_of(child) == Some(position.as_str()) {
            return ApplyResult::NotModified;
        }
        if let Some(index) = occupant_index {
            self.list_shift(list, index, position);
        }
        self.list_move_to(list, child, position);
        let mut deltas = Vec::new();
        if let Some(index) = self.list_index_of(list, child) {
            if index != previous_index {
                deltas.push(ListDelta::Move {
                    previous_index,
                    index,
                    item: self.immutable(child),
                });
            }
        }
        self.list_finish(list, deltas, Vec::new())
    }

    fn list_apply_move_undo_redo(
        &mut self,
        list: &NodeId,
        child: &NodeId,
        position: &Position,
        op_id: Option<&OpId>,
    ) -> ApplyResult {
        let orphan = self.list_is_orphan(list, child);
        let previous_index = self.list_index_of(list, child);
        if !orphan && previous_index.is_none() {
            return ApplyResult::NotModified;
        }
        let Some(previous_key) = self.key_of(child).map(str::to_string) else {
            return ApplyResult::NotModified;
        };
        if !orphan && previous_key == position.as_str() {
            return ApplyResult::NotModified;
        }

        let target = self.list_free_position(list, position);
        if let (Some(op_id), Some(l)) = (op_id, self.list_mut(list)) {
            l.pending_moves.insert(child.clone(), op_id.clone());
        }
        let reverse = vec![Op::SetParentKey {
            op_id: None,
            id: child.clone(),
            parent_key: previous_key,
        }];

        let mut deltas = Vec::new();
        match previous_index {
            Some(previous_index) => {
                self.list_move_to(list, child, &target);
                if let Some(index) = self.list_index_of(list, child) {
                    if index != previous_index {
                        deltas.push(ListDelta::Move {
                            previous_index,
                            index,
                            item: self.immutable(child),
                        });
                    }
                }
            }
            None => {
                self.list_resurrect(list, child, &target);
                deltas.extend(self.list_insert_delta(list, child));
            }
        }
        self.list_finish(list, deltas, reverse)
    }

    pub(crate) fn list_detach_child(&mut self, list: &NodeId, child: &NodeId) -> ApplyResult {
        match self.list_remove(list, child) {
            Some((delta, reverse)) => {
                ApplyResult::modified(StorageUpdate::list(list, vec![delta]), reverse)
            }
            None => ApplyResult::NotModified,
        }
    }
}
