//! Map editing tests

use std::collections::BTreeMap;

use livetree::{Child, Document, KeyUpdate, Lson, NodeId, Op, StorageUpdate};
use serde_json::json;

use crate::helpers::*;

fn remote(value: serde_json::Value) -> Op {
    serde_json::from_value(value).unwrap()
}

fn doc_with_map() -> (Document, NodeId) {
    let mut doc = Document::new(1);
    doc.root().set("m", Lson::map([("a", 1)])).unwrap();
    let own = doc.take_outbound();
    doc.receive(own);
    let map = root_child(&mut doc, "m");
    (doc, map)
}

#[test]
fn test_map_set_get_delete() {
    let (mut doc, map_id) = doc_with_map();
    let mut map = doc.map(&map_id).unwrap();
    map.set("b", "x").unwrap();

    assert_eq!(map.keys(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(map.get("b"), Some(Child::Value(json!("x"))));

    map.delete("a").unwrap();
    assert_eq!(map.keys(), vec!["b".to_string()]);
    map.delete("missing").unwrap();
    assert_eq!(map.len(), 1);

    let ops = doc.take_outbound();
    assert_eq!(ops.iter().map(Op::type_name).collect::<Vec<_>>(), vec!["CreateRegister", "DeleteNode"]);
    assert_eq!(doc.to_json(), json!({"m": {"b": "x"}}));
}

#[test]
fn test_map_overwrite_releases_previous_value() {
    let (mut doc, map_id) = doc_with_map();
    let recorder = Recorder::install(&mut doc);
    let before = doc.node_count();

    doc.map(&map_id).unwrap().set("a", Lson::list([1, 2])).unwrap();

    assert_eq!(doc.node_count(), before + 2);
    assert_eq!(doc.to_json(), json!({"m": {"a": [1, 2]}}));
    assert_eq!(
        recorder.calls()[0],
        vec![StorageUpdate::Map {
            node: map_id.clone(),
            updates: BTreeMap::from([("a".to_string(), KeyUpdate::Updated)]),
        }]
    );
}

#[test]
fn test_map_pending_set_ignores_earlier_remote_set() {
    let (mut doc, map_id) = doc_with_map();
    doc.map(&map_id).unwrap().set("k", 1).unwrap();
    let own = doc.take_outbound();

    let updates = doc.receive([remote(json!({
        "type": "CreateRegister", "op_id": "2:1", "id": "2:0",
        "parent_id": map_id.as_str(), "parent_key": "k", "data": 2
    }))]);
    assert!(updates.is_empty());
    assert_eq!(doc.to_json(), json!({"m": {"a": 1, "k": 1}}));

    doc.receive(own);
    doc.receive([remote(json!({
        "type": "CreateRegister", "op_id": "2:3", "id": "2:2",
        "parent_id": map_id.as_str(), "parent_key": "k", "data": 3
    }))]);
    assert_eq!(doc.to_json(), json!({"m": {"a": 1, "k": 3}}));
}

#[test]
fn test_map_remote_delete() {
    let (mut doc, map_id) = doc_with_map();
    let entry = doc.map(&map_id).unwrap().child_id("a").unwrap();

    let updates = doc.receive([remote(
        json!({"type": "DeleteNode", "op_id": "2:0", "id": entry.as_str()}),
    )]);

    assert_eq!(doc.to_json(), json!({"m": {}}));
    assert!(matches!(
        &updates[0],
        StorageUpdate::Map { updates, .. } if matches!(updates.get("a"), Some(KeyUpdate::Deleted { .. }))
    ));
    assert!(!doc.contains(&entry));
}

#[test]
fn test_map_handle_rejects_records() {
    let mut doc = Document::new(1);
    let root = doc.root_id().clone();
    assert!(doc.map(&root).err().unwrap().is_usage_error());
}
