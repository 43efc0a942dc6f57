//! Change notifications.
//!
//! Every applied mutation yields one [`StorageUpdate`] for the node it
//! touched. Updates produced within one batch (or one inbound op array) are
//! merged per node with [`merge_updates`] before they are delivered.

use std::collections::BTreeMap;

use crate::ids::NodeId;
use crate::value::Immutable;

/// What happened to one key of a record or map.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyUpdate {
    Updated,
    Deleted { deleted: Immutable },
}

/// One structural change to a list, indexed against the list as it was when
/// the change was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ListDelta {
    Insert {
        index: usize,
        item: Immutable,
    },
    Delete {
        index: usize,
        deleted: Immutable,
    },
    Move {
        previous_index: usize,
        index: usize,
        item: Immutable,
    },
    Set {
        index: usize,
        item: Immutable,
    },
}

impl ListDelta {
    pub fn index(&self) -> usize {
        match self {
            ListDelta::Insert { index, .. }
            | ListDelta::Delete { index, .. }
            | ListDelta::Move { index, .. }
            | ListDelta::Set { index, .. } => *index,
        }
    }
}

/// Notification for one node.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageUpdate {
    Record {
        node: NodeId,
        updates: BTreeMap<String, KeyUpdate>,
    },
    Map {
        node: NodeId,
        updates: BTreeMap<String, KeyUpdate>,
    },
    List {
        node: NodeId,
        updates: Vec<ListDelta>,
    },
}

impl StorageUpdate {
    pub fn node_id(&self) -> &NodeId {
        match self {
            StorageUpdate::Record { node, .. }
            | StorageUpdate::Map { node, .. }
            | StorageUpdate::List { node, .. } => node,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            StorageUpdate::Record { updates, .. } | StorageUpdate::Map { updates, .. } => {
                updates.is_empty()
            }
            StorageUpdate::List { updates, .. } => updates.is_empty(),
        }
    }

    pub(crate) fn record(node: &NodeId, key: impl Into<String>, update: KeyUpdate) -> Self {
        StorageUpdate::Record {
            node: node.clone(),
            updates: BTreeMap::from([(key.into(), update)]),
        }
    }

    pub(crate) fn map(node: &NodeId, key: impl Into<String>, update: KeyUpdate) -> Self {
        StorageUpdate::Map {
            node: node.clone(),
            updates: BTreeMap::from([(key.into(), update)]),
        }
    }

    pub(crate) fn list(node: &NodeId, updates: Vec<ListDelta>) -> Self {
        StorageUpdate::List {
            node: node.clone(),
            updates,
        }
    }

    /// Folds a later update for the same node into this one. Key updates are
    /// overwritten by key, list deltas are concatenated in order. Updates of
    /// different kinds keep the later one.
    pub fn merge(self, later: StorageUpdate) -> StorageUpdate {
        match (self, later) {
            (
                StorageUpdate::Record {
                    node,
                    updates: mut first,
                },
                StorageUpdate::Record { updates, .. },
            ) => {
                first.extend(updates);
                StorageUpdate::Record {
                    node,
                    updates: first,
                }
            }
            (
                StorageUpdate::Map {
                    node,
                    updates: mut first,
                },
                StorageUpdate::Map { updates, .. },
            ) => {
                first.extend(updates);
                StorageUpdate::Map {
                    node,
                    updates: first,
                }
            }
            (
                StorageUpdate::List {
                    node,
                    updates: mut first,
                },
                StorageUpdate::List { updates, .. },
            ) => {
                first.extend(updates);
                StorageUpdate::List {
                    node,
                    updates: first,
                }
            }
            (_, later) => later,
        }
    }
}

/// Adds `update` to `updates`, merging it into an existing entry for the same
/// node. First-seen node order is preserved.
pub fn merge_updates(updates: &mut Vec<StorageUpdate>, update: StorageUpdate) {
    match updates
        .iter()
        .position(|existing| existing.node_id() == update.node_id())
    {
        Some(index) => {
            let existing = updates.remove(index);
            updates.insert(index, existing.merge(update));
        }
        None => updates.push(update),
    }
}
