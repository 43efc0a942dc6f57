//! Undo and redo tests
//!
//! Every local change pushes the ops reverting it; undo replays them as
//! ordinary local changes that are also sent to the authority.

use livetree::{Document, Error, Lson, NodeError};
use serde_json::json;

use crate::helpers::*;

// ===== RECORDS =====

#[test]
fn test_undo_redo_record_writes() {
    let mut doc = Document::new(1);
    doc.root().set("t", 1).unwrap();
    doc.root().set("t", 2).unwrap();

    doc.undo().unwrap();
    assert_eq!(doc.to_json(), json!({"t": 1}));
    doc.undo().unwrap();
    assert_eq!(doc.to_json(), json!({}));
    assert!(!doc.can_undo());

    doc.redo().unwrap();
    assert_eq!(doc.to_json(), json!({"t": 1}));
    doc.redo().unwrap();
    assert_eq!(doc.to_json(), json!({"t": 2}));
    assert!(!doc.can_redo());
}

#[test]
fn test_undo_sends_ops() {
    let mut doc = Document::new(1);
    doc.root().set("t", 1).unwrap();
    doc.take_outbound();

    doc.undo().unwrap();
    let ops = doc.take_outbound();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].type_name(), "DeleteKey");
    assert!(ops[0].op_id().is_some());
    assert_eq!(doc.unacknowledged_ops().len(), 2);
}

#[test]
fn test_undo_restores_replaced_nested_node() {
    let mut doc = Document::new(1);
    doc.root().set("n", Lson::list([1])).unwrap();
    let list = root_child(&mut doc, "n");
    doc.root().set("n", 5).unwrap();

    doc.undo().unwrap();
    assert_eq!(doc.to_json(), json!({"n": [1]}));
    // The restored list keeps its identity
    assert_eq!(root_child(&mut doc, "n"), list);

    doc.redo().unwrap();
    assert_eq!(doc.to_json(), json!({"n": 5}));
}

#[test]
fn test_undo_record_delete() {
    let mut doc = Document::new(1);
    doc.root().set("a", Lson::record([("b", 1)])).unwrap();
    doc.root().delete("a").unwrap();

    doc.undo().unwrap();
    assert_eq!(doc.to_json(), json!({"a": {"b": 1}}));
}

// ===== LISTS =====

#[test]
fn test_undo_list_insert_and_delete() {
    let mut doc = doc_with_items(&["a", "b", "c"]);
    let list = root_child(&mut doc, "items");

    doc.list(&list).unwrap().insert(1, "x").unwrap();
    doc.undo().unwrap();
    assert_eq!(items(&doc), json!(["a", "b", "c"]));
    doc.redo().unwrap();
    assert_eq!(items(&doc), json!(["a", "x", "b", "c"]));

    doc.list(&list).unwrap().delete(2).unwrap();
    assert_eq!(items(&doc), json!(["a", "x", "c"]));
    doc.undo().unwrap();
    assert_eq!(items(&doc), json!(["a", "x", "b", "c"]));
}

#[test]
fn test_undo_list_move() {
    let mut doc = doc_with_items(&["a", "b", "c"]);
    let list = root_child(&mut doc, "items");
    doc.list(&list).unwrap().move_item(0, 2).unwrap();

    doc.undo().unwrap();
    assert_eq!(items(&doc), json!(["a", "b", "c"]));
    doc.redo().unwrap();
    assert_eq!(items(&doc), json!(["b", "c", "a"]));
}

#[test]
fn test_undo_list_set() {
    let mut doc = doc_with_items(&["a", "b"]);
    let list = root_child(&mut doc, "items");
    doc.list(&list).unwrap().set(0, "z").unwrap();

    doc.undo().unwrap();
    assert_eq!(items(&doc), json!(["a", "b"]));
    doc.redo().unwrap();
    assert_eq!(items(&doc), json!(["z", "b"]));
}

#[test]
fn test_undo_list_clear() {
    let mut doc = doc_with_items(&["a", "b"]);
    let list = root_child(&mut doc, "items");
    doc.list(&list).unwrap().clear().unwrap();

    doc.undo().unwrap();
    assert_eq!(items(&doc), json!(["a", "b"]));
}

// ===== FRAMES =====

#[test]
fn test_paused_history_forms_one_frame() {
    let mut doc = Document::new(1);
    doc.pause_history();
    doc.root().set("a", 1).unwrap();
    doc.root().set("a", 2).unwrap();
    doc.root().set("b", 3).unwrap();
    doc.resume_history();

    doc.undo().unwrap();
    assert_eq!(doc.to_json(), json!({}));
    assert!(!doc.can_undo());
}

#[test]
fn test_undo_while_paused_closes_the_frame() {
    let mut doc = Document::new(1);
    doc.pause_history();
    doc.root().set("a", 1).unwrap();
    assert!(doc.can_undo());

    doc.undo().unwrap();
    assert_eq!(doc.to_json(), json!({}));

    // Later changes get their own frames again
    doc.root().set("b", 1).unwrap();
    doc.root().set("b", 2).unwrap();
    doc.undo().unwrap();
    assert_eq!(doc.to_json(), json!({"b": 1}));
}

#[test]
fn test_new_change_clears_redo() {
    let mut doc = Document::new(1);
    doc.root().set("a", 1).unwrap();
    doc.undo().unwrap();
    assert!(doc.can_redo());

    doc.root().set("b", 1).unwrap();
    assert!(!doc.can_redo());
}

#[test]
fn test_undo_stack_is_bounded() {
    let mut doc = Document::new(1);
    for i in 0..60 {
        doc.root().set("n", i).unwrap();
    }

    let mut undone = 0;
    while doc.can_undo() {
        doc.undo().unwrap();
        undone += 1;
    }
    assert_eq!(undone, 50);
    assert_eq!(doc.to_json(), json!({"n": 9}));
}

#[test]
fn test_clear_history() {
    let mut doc = Document::new(1);
    doc.root().set("a", 1).unwrap();
    doc.undo().unwrap();
    doc.root().set("a", 2).unwrap();
    doc.clear_history();

    assert!(!doc.can_undo());
    assert!(!doc.can_redo());
    doc.undo().unwrap();
    assert_eq!(doc.to_json(), json!({"a": 2}));
}

#[test]
fn test_history_rejected_inside_batch() {
    let mut doc = Document::new(1);
    doc.root().set("a", 1).unwrap();

    let result = doc.batch(|d| d.undo());
    assert!(matches!(
        result,
        Err(Error::Node(NodeError::HistoryDuringBatch { .. }))
    ));
    assert_eq!(doc.to_json(), json!({"a": 1}));

    let result = doc.batch(|d| d.redo());
    assert!(result.is_err());
}
