//! Concurrent record edits: the write the authority orders last wins per key.

use livetree::Lson;
use serde_json::json;

use crate::helpers::*;

fn seeded() -> Network {
    Network::seeded(2, |doc| {
        doc.root()
            .update([("title", Lson::from("t")), ("meta", Lson::record([("x", 0)]))])
            .unwrap();
    })
}

#[test]
fn test_last_ordered_write_wins() {
    for first in [0, 1] {
        let mut network = seeded();
        network.client(0).root().set("title", "from-0").unwrap();
        network.client(1).root().set("title", "from-1").unwrap();

        network.send(first);
        network.send(1 - first);
        network.sync();

        network.assert_converged();
        let expected = if first == 0 { "from-1" } else { "from-0" };
        assert_eq!(network.server.to_json()["title"], json!(expected));
    }
}

#[test]
fn test_pending_write_survives_earlier_remote_write() {
    let mut network = seeded();
    network.client(0).root().set("title", "mine").unwrap();
    network.client(1).root().set("title", "theirs").unwrap();

    network.send(1);
    network.deliver(0);
    assert_eq!(network.client(0).to_json()["title"], json!("mine"));

    network.sync();
    network.assert_converged();
    assert_eq!(network.server.to_json()["title"], json!("mine"));
}

#[test]
fn test_delete_key_against_update() {
    for delete_first in [true, false] {
        let mut network = seeded();
        network.client(0).root().delete("title").unwrap();
        network.client(1).root().set("title", "kept").unwrap();

        if delete_first {
            network.send(0);
            network.send(1);
        } else {
            network.send(1);
            network.send(0);
        }
        network.sync();

        network.assert_converged();
        let title = network.server.to_json()["title"].clone();
        if delete_first {
            assert_eq!(title, json!("kept"));
        } else {
            assert_eq!(title, serde_json::Value::Null);
        }
    }
}

#[test]
fn test_nested_record_replaced_by_scalar() {
    let mut network = seeded();
    let meta = root_child(network.client(1), "meta");
    network.client(0).root().set("meta", 5).unwrap();
    network.client(1).record(&meta).unwrap().set("x", 1).unwrap();

    network.send(0);
    network.send(1);
    network.sync();

    network.assert_converged();
    assert_eq!(network.server.to_json()["meta"], json!(5));
}

#[test]
fn test_disjoint_keys_merge() {
    let mut network = seeded();
    network.client(0).root().set("a", 1).unwrap();
    network.client(1).root().set("b", 2).unwrap();
    network.sync();

    network.assert_converged();
    assert_eq!(
        network.server.to_json(),
        json!({"title": "t", "meta": {"x": 0}, "a": 1, "b": 2})
    );
}
