//! Batch tests

use livetree::{Document, Op, StorageUpdate};
use serde_json::json;

use crate::helpers::*;

#[test]
fn test_batch_notifies_once() {
    let mut doc = doc_with_items(&["a"]);
    let list = root_child(&mut doc, "items");
    let recorder = Recorder::install(&mut doc);

    doc.batch(|d| {
        d.root().set("x", 1).unwrap();
        d.root().set("y", 2).unwrap();
        d.list(&list).unwrap().push("b").unwrap();
    });

    let calls = recorder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 2);
    let StorageUpdate::Record { updates, .. } = &calls[0][0] else {
        panic!("expected the root record first");
    };
    assert_eq!(updates.keys().collect::<Vec<_>>(), vec!["x", "y"]);
}

#[test]
fn test_batch_holds_ops_until_it_ends() {
    let mut doc = Document::new(1);
    let sent_inside = doc.batch(|d| {
        d.root().set("a", 1).unwrap();
        d.root().set("b", 2).unwrap();
        d.take_outbound().len()
    });

    assert_eq!(sent_inside, 0);
    assert_eq!(doc.take_outbound().len(), 2);
}

#[test]
fn test_batch_is_one_undo_frame() {
    let mut doc = doc_with_items(&["a"]);
    let list = root_child(&mut doc, "items");
    doc.batch(|d| {
        d.root().set("x", 1).unwrap();
        d.list(&list).unwrap().push("b").unwrap();
        d.list(&list).unwrap().move_item(1, 0).unwrap();
    });
    assert_eq!(doc.to_json(), json!({"items": ["b", "a"], "x": 1}));

    doc.undo().unwrap();
    assert_eq!(doc.to_json(), json!({"items": ["a"]}));
    doc.redo().unwrap();
    assert_eq!(doc.to_json(), json!({"items": ["b", "a"], "x": 1}));
}

#[test]
fn test_nested_batches_are_flattened() {
    let mut doc = Document::new(1);
    let recorder = Recorder::install(&mut doc);

    doc.batch(|d| {
        d.root().set("a", 1).unwrap();
        d.batch(|d| d.root().set("b", 2).unwrap());
        assert!(d.take_outbound().is_empty());
    });

    assert_eq!(recorder.count(), 1);
    doc.undo().unwrap();
    assert_eq!(doc.to_json(), json!({}));
}

#[test]
fn test_empty_batch_is_silent() {
    let mut doc = Document::new(1);
    let recorder = Recorder::install(&mut doc);
    doc.batch(|_| {});

    assert_eq!(recorder.count(), 0);
    assert!(!doc.can_undo());
}

#[test]
fn test_remote_writes_inside_a_batch_do_not_override_local_ones() {
    let remote = |seq: u32, value: &str| -> Op {
        serde_json::from_value(json!({
            "type": "UpdateRecord", "op_id": format!("2:{seq}"), "id": "root", "data": {"t": value}
        }))
        .unwrap()
    };
    let mut doc = Document::new(1);

    doc.batch(|d| {
        d.root().set("t", "mine").unwrap();
        d.receive([remote(0, "first")]);
        d.receive([remote(1, "second")]);
        assert_eq!(d.to_json()["t"], json!("mine"));
    });
    assert_eq!(doc.to_json()["t"], json!("mine"));

    let own = doc.take_outbound();
    assert_eq!(own.len(), 1);
    doc.receive([remote(2, "third")]);
    assert_eq!(doc.to_json()["t"], json!("mine"));

    doc.receive(own);
    assert_eq!(doc.to_json()["t"], json!("mine"));
    assert!(doc.unacknowledged_ops().is_empty());
}
