//! Concurrent map edits

use livetree::{Document, Lson, MapMut};
use serde_json::json;

use crate::helpers::*;

fn seeded() -> Network {
    Network::seeded(2, |doc| {
        doc.root().set("tags", Lson::map([("k", "initial")])).unwrap();
    })
}

fn tags(doc: &mut Document) -> MapMut<'_> {
    let id = root_child(doc, "tags");
    doc.map(&id).unwrap()
}

#[test]
fn test_concurrent_sets_of_one_key() {
    for first in [0, 1] {
        let mut network = seeded();
        tags(network.client(0)).set("k", "from-0").unwrap();
        tags(network.client(1)).set("k", "from-1").unwrap();

        network.send(first);
        network.send(1 - first);
        network.sync();

        network.assert_converged();
        let expected = if first == 0 { "from-1" } else { "from-0" };
        assert_eq!(network.server.to_json()["tags"]["k"], json!(expected));
    }
}

#[test]
fn test_delete_against_set() {
    for delete_first in [true, false] {
        let mut network = seeded();
        tags(network.client(0)).delete("k").unwrap();
        tags(network.client(1)).set("k", "new").unwrap();

        if delete_first {
            network.send(0);
            network.send(1);
        } else {
            network.send(1);
            network.send(0);
        }
        network.sync();

        // Deletes target one entry, so a replacement always survives
        network.assert_converged();
        assert_eq!(network.server.to_json()["tags"], json!({"k": "new"}));
    }
}

#[test]
fn test_set_then_delete_before_acknowledgement() {
    let mut network = seeded();
    tags(network.client(0)).set("k", "short-lived").unwrap();
    tags(network.client(0)).delete("k").unwrap();
    tags(network.client(1)).set("j", 1).unwrap();

    network.send(1);
    network.sync();

    network.assert_converged();
    assert_eq!(network.server.to_json()["tags"], json!({"j": 1}));
}

#[test]
fn test_refused_undo_does_not_block_later_writes() {
    let mut network = Network::seeded(3, |doc| {
        doc.root().set("tags", Lson::map([("k", "initial")])).unwrap();
        doc.clear_history();
    });
    tags(network.client(0)).delete("k").unwrap();
    tags(network.client(1)).delete("k").unwrap();
    network.send(0);
    network.send(1);
    network.client(0).undo().unwrap();
    network.client(1).undo().unwrap();
    network.send(0);
    network.send(1);
    // Keeps an op in flight so nothing settles on delivery
    tags(network.client(1)).set("j", 1).unwrap();

    // The second restore of the same entry is refused by the authority
    network.deliver(1);
    assert_eq!(network.client(1).to_json()["tags"], json!({"j": 1, "k": "initial"}));

    tags(network.client(2)).set("k", "late").unwrap();
    network.send(2);
    network.sync();

    network.assert_converged();
    assert_eq!(network.server.to_json()["tags"], json!({"j": 1, "k": "late"}));
}
