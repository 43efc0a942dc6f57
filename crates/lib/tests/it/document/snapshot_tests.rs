//! Snapshot loading, serialization and reinitialization tests

use livetree::{Document, ListDelta, NodeId, StorageUpdate, snapshot};
use serde_json::json;

use crate::helpers::*;

const INITIAL: &str = r##"[
    ["root", {"type": "Record", "data": {"title": "a"}}],
    ["0:1", {"type": "List", "parent_id": "root", "parent_key": "items"}],
    ["0:3", {"type": "Register", "parent_id": "0:1", "parent_key": "\"", "data": "y"}],
    ["0:2", {"type": "Register", "parent_id": "0:1", "parent_key": "!", "data": "x"}],
    ["0:4", {"type": "Map", "parent_id": "root", "parent_key": "tags"}],
    ["0:5", {"type": "Record", "parent_id": "0:4", "parent_key": "k", "data": {"n": 1}}]
]"##;

const UPDATED: &str = r##"[
    ["root", {"type": "Record", "data": {"title": "b"}}],
    ["0:1", {"type": "List", "parent_id": "root", "parent_key": "items"}],
    ["0:3", {"type": "Register", "parent_id": "0:1", "parent_key": "!", "data": "y"}],
    ["0:6", {"type": "Register", "parent_id": "0:1", "parent_key": "#", "data": "z"}],
    ["0:4", {"type": "Map", "parent_id": "root", "parent_key": "tags"}],
    ["0:5", {"type": "Record", "parent_id": "0:4", "parent_key": "k", "data": {"n": 2}}]
]"##;

fn load(json: &str) -> Document {
    Document::from_snapshot(1, &snapshot::from_json(json).unwrap()).unwrap()
}

#[test]
fn test_from_snapshot_builds_tree() {
    let doc = load(INITIAL);

    assert_eq!(
        doc.to_json(),
        json!({"title": "a", "items": ["x", "y"], "tags": {"k": {"n": 1}}})
    );
    assert_eq!(doc.node_count(), 6);
    assert_eq!(
        doc.parent_of(&NodeId::new("0:5")),
        Some((NodeId::new("0:4"), "k".to_string()))
    );
}

#[test]
fn test_serialize_round_trips_through_json() {
    let doc = load(INITIAL);
    let text = serde_json::to_string(&doc.serialize()).unwrap();
    let reloaded = load(&text);

    assert_eq!(reloaded.to_json(), doc.to_json());
    assert_eq!(reloaded.node_count(), doc.node_count());
}

#[test]
fn test_new_ids_do_not_reuse_connection_prefix() {
    let mut doc = load(INITIAL);
    let list = root_child(&mut doc, "items");
    doc.list(&list).unwrap().push("w").unwrap();

    let created = doc.list(&list).unwrap().child_id(2).unwrap();
    assert!(created.as_str().starts_with("1:"));
}

#[test]
fn test_reinitialize_applies_differences() {
    let mut doc = load(INITIAL);
    let recorder = Recorder::install(&mut doc);

    let updates = doc
        .reinitialize(&snapshot::from_json(UPDATED).unwrap())
        .unwrap();

    assert_eq!(doc.to_json(), load(UPDATED).to_json());
    assert_eq!(recorder.count(), 1);
    assert_eq!(updates.len(), 3);

    let list_update = updates
        .iter()
        .find(|u| u.node_id() == &NodeId::new("0:1"))
        .unwrap();
    let StorageUpdate::List { updates: deltas, .. } = list_update else {
        panic!("expected a list update");
    };
    assert!(matches!(deltas.first(), Some(ListDelta::Delete { index: 0, .. })));
    assert!(matches!(deltas.last(), Some(ListDelta::Insert { index: 1, .. })));
}

#[test]
fn test_reinitialize_with_same_snapshot_is_silent() {
    let mut doc = load(INITIAL);
    let recorder = Recorder::install(&mut doc);

    let updates = doc
        .reinitialize(&snapshot::from_json(INITIAL).unwrap())
        .unwrap();
    assert!(updates.is_empty());
    assert_eq!(recorder.count(), 0);
}

#[test]
fn test_reinitialize_rejects_foreign_root() {
    let mut doc = load(INITIAL);
    let other = snapshot::from_json(r#"[["other", {"type": "Record", "data": {}}]]"#).unwrap();

    let err = doc.reinitialize(&other).unwrap_err();
    assert_eq!(err.module(), "node");
    assert_eq!(doc.to_json()["title"], json!("a"));
}

#[test]
fn test_snapshot_requires_single_root_record() {
    let two_roots = snapshot::from_json(
        r#"[["a", {"type": "Record", "data": {}}], ["b", {"type": "Record", "data": {}}]]"#,
    )
    .unwrap();
    assert!(Document::from_snapshot(1, &two_roots).is_err());

    let no_root = snapshot::from_json(
        r#"[["a", {"type": "List", "parent_id": "root", "parent_key": "x"}]]"#,
    )
    .unwrap();
    assert!(Document::from_snapshot(1, &no_root).is_err());

    assert!(snapshot::from_json("not json").unwrap_err().is_serialization_error());
}
