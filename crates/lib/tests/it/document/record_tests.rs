//! Record editing tests
//!
//! Covers local field writes and deletes, nested nodes under record keys and
//! how inbound updates interact with pending local writes.

use std::collections::BTreeMap;

use livetree::{Child, Document, Immutable, KeyUpdate, Lson, NodeId, Op, StorageUpdate};
use serde_json::json;

use crate::helpers::*;

fn remote(value: serde_json::Value) -> Op {
    serde_json::from_value(value).unwrap()
}

// ===== LOCAL WRITES =====

#[test]
fn test_record_set_and_get() {
    let mut doc = Document::new(1);
    doc.root().set("title", "x").unwrap();

    assert_eq!(doc.root().get("title"), Some(Child::Value(json!("x"))));
    assert_eq!(doc.to_json(), json!({"title": "x"}));

    let outbound = doc.take_outbound();
    assert_eq!(outbound.len(), 1);
    assert_eq!(
        serde_json::to_value(&outbound[0]).unwrap(),
        json!({"type": "UpdateRecord", "op_id": "1:0", "id": "root", "data": {"title": "x"}})
    );
    assert_eq!(doc.unacknowledged_ops().len(), 1);
}

#[test]
fn test_record_update_sends_scalars_in_one_op() {
    let mut doc = Document::new(1);
    doc.root()
        .update([
            ("a", Lson::from(1)),
            ("b", Lson::from(true)),
            ("nested", Lson::record([("c", 2)])),
        ])
        .unwrap();

    let names: Vec<_> = doc.take_outbound().iter().map(Op::type_name).collect();
    assert_eq!(names, vec!["UpdateRecord", "CreateRecord"]);
    assert_eq!(doc.to_json(), json!({"a": 1, "b": true, "nested": {"c": 2}}));
}

#[test]
fn test_record_delete_notifies_with_deleted_value() {
    let mut doc = Document::new(1);
    let recorder = Recorder::install(&mut doc);
    doc.root().set("a", 1).unwrap();
    doc.root().delete("a").unwrap();

    assert_eq!(doc.to_json(), json!({}));
    let calls = recorder.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[1],
        vec![StorageUpdate::Record {
            node: NodeId::new("root"),
            updates: BTreeMap::from([(
                "a".to_string(),
                KeyUpdate::Deleted {
                    deleted: Immutable::Value(json!(1)),
                },
            )]),
        }]
    );
}

#[test]
fn test_record_delete_missing_key_is_noop() {
    let mut doc = Document::new(1);
    let recorder = Recorder::install(&mut doc);
    doc.root().delete("missing").unwrap();

    assert!(doc.take_outbound().is_empty());
    assert_eq!(recorder.count(), 0);
}

#[test]
fn test_record_overwriting_nested_node_releases_it() {
    let mut doc = Document::new(1);
    doc.root().set("n", Lson::list([1, 2])).unwrap();
    assert_eq!(doc.node_count(), 4);

    doc.root().set("n", 5).unwrap();
    assert_eq!(doc.node_count(), 1);
    assert_eq!(doc.to_json(), json!({"n": 5}));
}

#[test]
fn test_record_handle_rejects_wrong_kind() {
    let mut doc = Document::new(1);
    let root = doc.root_id().clone();
    let err = doc.list(&root).err().unwrap();
    assert!(err.is_usage_error());

    let err = doc.record(&NodeId::new("nope")).err().unwrap();
    assert!(err.is_not_found());
}

// ===== INBOUND OPS =====

#[test]
fn test_record_applies_remote_update() {
    let mut doc = Document::new(1);
    let updates = doc.receive([remote(
        json!({"type": "UpdateRecord", "op_id": "2:0", "id": "root", "data": {"t": "r"}}),
    )]);

    assert_eq!(updates.len(), 1);
    assert_eq!(doc.to_json(), json!({"t": "r"}));
}

#[test]
fn test_record_pending_write_wins_until_acknowledged() {
    let mut doc = Document::new(1);
    doc.root().set("t", "local").unwrap();
    let own = doc.take_outbound();

    // A remote write ordered before ours is ignored
    let updates = doc.receive([remote(
        json!({"type": "UpdateRecord", "op_id": "2:0", "id": "root", "data": {"t": "remote"}}),
    )]);
    assert!(updates.is_empty());
    assert_eq!(doc.to_json(), json!({"t": "local"}));

    // Our own write comes back: nothing changes
    let updates = doc.receive(own);
    assert!(updates.is_empty());
    assert!(doc.unacknowledged_ops().is_empty());

    // Later remote writes apply again
    doc.receive([remote(
        json!({"type": "UpdateRecord", "op_id": "2:1", "id": "root", "data": {"t": "later"}}),
    )]);
    assert_eq!(doc.to_json(), json!({"t": "later"}));
}

#[test]
fn test_record_remote_delete_key() {
    let mut doc = Document::new(1);
    doc.root().set("a", Lson::map([("k", 1)])).unwrap();
    let own = doc.take_outbound();
    doc.receive(own);

    doc.receive([remote(
        json!({"type": "DeleteKey", "op_id": "2:0", "id": "root", "key": "a"}),
    )]);
    assert_eq!(doc.to_json(), json!({}));
    assert_eq!(doc.node_count(), 1);
}

#[test]
fn test_record_remote_create_under_key() {
    let mut doc = Document::new(1);
    doc.root().set("a", 1).unwrap();
    let own = doc.take_outbound();
    doc.receive(own);

    let updates = doc.receive([
        remote(json!({"type": "CreateList", "op_id": "2:1", "id": "2:0", "parent_id": "root", "parent_key": "a"})),
        remote(json!({"type": "CreateRegister", "op_id": "2:3", "id": "2:2", "parent_id": "2:0", "parent_key": "!", "data": "x"})),
    ]);

    assert_eq!(doc.to_json(), json!({"a": ["x"]}));
    // The list item is covered by the list's own creation
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].node_id(), &NodeId::new("root"));
}

#[test]
fn test_record_ops_on_unknown_nodes_are_ignored() {
    let mut doc = Document::new(1);
    let updates = doc.receive([
        remote(json!({"type": "UpdateRecord", "op_id": "2:0", "id": "9:9", "data": {"a": 1}})),
        remote(json!({"type": "DeleteNode", "op_id": "2:1", "id": "root"})),
    ]);
    assert!(updates.is_empty());
    assert_eq!(doc.to_json(), json!({}));
}
