//! Typed mutable views of one node of a [`Document`].

use std::collections::BTreeMap;

use serde_json::Value;

use super::Document;
use crate::Result;
use crate::ids::NodeId;
use crate::node::{Field, NodeBody, NodeKind};
use crate::pool::Pool;
use crate::position::Position;
use crate::value::{Immutable, Lson};

/// What a field, entry or item holds. Registers read as their value.
#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    Value(Value),
    Node { id: NodeId, kind: NodeKind },
}

impl Child {
    fn of(pool: &Pool, id: &NodeId) -> Option<Child> {
        let node = pool.node(id)?;
        Some(match &node.body {
            NodeBody::Register(register) => Child::Value(register.data.clone()),
            _ => Child::Node {
                id: id.clone(),
                kind: node.kind(),
            },
        })
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Child::Value(value) => Some(value),
            Child::Node { .. } => None,
        }
    }

    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Child::Node { id, .. } => Some(id),
            Child::Value(_) => None,
        }
    }
}

/// A record of a document, borrowed for editing.
pub struct RecordMut<'a> {
    doc: &'a mut Document,
    id: NodeId,
}

impl<'a> RecordMut<'a> {
    pub(super) fn new(doc: &'a mut Document, id: NodeId) -> Self {
        Self { doc, id }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<Child> {
        let pool = &self.doc.pool;
        match pool.record(&self.id)?.fields.get(key)? {
            Field::Value(value) => Some(Child::Value(value.clone())),
            Field::Node(child) => Child::of(pool, child),
        }
    }

    /// Id of the nested node stored under `key`.
    pub fn child_id(&self, key: &str) -> Option<NodeId> {
        match self.doc.pool.record(&self.id)?.fields.get(key)? {
            Field::Node(child) => Some(child.clone()),
            Field::Value(_) => None,
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.doc
            .pool
            .record(&self.id)
            .map(|r| r.fields.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.doc.pool.record(&self.id).map_or(0, |r| r.fields.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Lson>) -> Result<()> {
        self.update([(key.into(), value.into())])
    }

    /// Writes several keys at once. Plain values are sent as a single op.
    pub fn update<K, V>(&mut self, patch: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: Into<String>,
        V: Into<Lson>,
    {
        let patch: BTreeMap<String, Lson> = patch
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.doc.pool.record_update(&self.id, patch)?;
        Ok(())
    }

    pub fn delete(&mut self, key: &str) -> Result<()> {
        self.doc.pool.record_delete(&self.id, key)?;
        Ok(())
    }

    pub fn to_immutable(&self) -> Immutable {
        self.doc.pool.immutable(&self.id)
    }
}

/// A list of a document, borrowed for editing.
pub struct ListMut<'a> {
    doc: &'a mut Document,
    id: NodeId,
}

impl<'a> ListMut<'a> {
    pub(super) fn new(doc: &'a mut Document, id: NodeId) -> Self {
        Self { doc, id }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.doc.pool.list_len(&self.id)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Child> {
        let pool = &self.doc.pool;
        Child::of(pool, pool.list_items(&self.id).get(index)?)
    }

    pub fn child_id(&self, index: usize) -> Option<NodeId> {
        self.doc.pool.list_items(&self.id).get(index).cloned()
    }

    /// Position of the item at `index`.
    pub fn position(&self, index: usize) -> Option<Position> {
        self.doc.pool.list_position_at(&self.id, index)
    }

    pub fn index_of_position(&self, position: &Position) -> Option<usize> {
        self.doc.pool.list_index_of_position(&self.id, position)
    }

    pub fn push(&mut self, value: impl Into<Lson>) -> Result<()> {
        self.doc.pool.list_push(&self.id, value.into())?;
        Ok(())
    }

    /// Inserts before the item currently at `index` (`index == len` appends).
    pub fn insert(&mut self, index: usize, value: impl Into<Lson>) -> Result<()> {
        self.doc.pool.list_insert(&self.id, index, value.into())?;
        Ok(())
    }

    /// Moves the item at `index` so that it ends up at `target`.
    pub fn move_item(&mut self, index: usize, target: usize) -> Result<()> {
        self.doc.pool.list_move(&self.id, index, target)?;
        Ok(())
    }

    pub fn delete(&mut self, index: usize) -> Result<()> {
        self.doc.pool.list_delete(&self.id, index)?;
        Ok(())
    }

    /// Replaces the item at `index`, keeping its position.
    pub fn set(&mut self, index: usize, value: impl Into<Lson>) -> Result<()> {
        self.doc.pool.list_set(&self.id, index, value.into())?;
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.doc.pool.list_clear(&self.id)?;
        Ok(())
    }

    pub fn to_immutable(&self) -> Immutable {
        self.doc.pool.immutable(&self.id)
    }
}

/// A map of a document, borrowed for editing.
pub struct MapMut<'a> {
    doc: &'a mut Document,
    id: NodeId,
}

impl<'a> MapMut<'a> {
    pub(super) fn new(doc: &'a mut Document, id: NodeId) -> Self {
        Self { doc, id }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<Child> {
        let pool = &self.doc.pool;
        Child::of(pool, pool.map(&self.id)?.entries.get(key)?)
    }

    pub fn child_id(&self, key: &str) -> Option<NodeId> {
        self.doc.pool.map(&self.id)?.entries.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.doc
            .pool
            .map(&self.id)
            .map(|m| m.entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.doc.pool.map(&self.id).map_or(0, |m| m.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set(&mut self, key: &str, value: impl Into<Lson>) -> Result<()> {
        self.doc.pool.map_set(&self.id, key, value.into())?;
        Ok(())
    }

    pub fn delete(&mut self, key: &str) -> Result<()> {
        self.doc.pool.map_delete(&self.id, key)?;
        Ok(())
    }

    pub fn to_immutable(&self) -> Immutable {
        self.doc.pool.immutable(&self.id)
    }
}
