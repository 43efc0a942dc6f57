//! Shared test fixtures.
//!
//! [`Network`] connects several client documents through an in-process
//! ordering authority. The authority keeps its own replica and, for every op
//! it receives:
//! - drops ops it cannot apply (missing target or parent, registers as
//!   parents, duplicate ids) and answers the sender with an `Ack`,
//! - moves list writes that would land on an occupied position to a fresh
//!   position right after it,
//! - applies the op to its replica and relays it to every client, the
//!   sender included.

use std::sync::{Arc, Mutex};

use livetree::{
    Document, NodeId, NodeKind, Op, Position, Result, StorageUpdate, hooks::StorageHook,
};
use serde_json::Value;

pub struct Network {
    pub server: Document,
    clients: Vec<Document>,
    inboxes: Vec<Vec<Op>>,
}

impl Network {
    pub fn new(count: usize) -> Self {
        Self {
            server: Document::new(0),
            clients: (1..=count).map(|i| Document::new(i as u32)).collect(),
            inboxes: vec![Vec::new(); count],
        }
    }

    /// A network whose clients all start from the tree built by `setup` on
    /// client 0.
    pub fn seeded(count: usize, setup: impl FnOnce(&mut Document)) -> Self {
        let mut network = Self::new(count);
        setup(network.client(0));
        network.sync();
        network
    }

    pub fn client(&mut self, index: usize) -> &mut Document {
        &mut self.clients[index]
    }

    /// Sends the outbound ops of one client to the authority. Returns the
    /// number of ops sent.
    pub fn send(&mut self, index: usize) -> usize {
        let ops = self.clients[index].take_outbound();
        let count = ops.len();
        for op in ops {
            self.relay(index, op);
        }
        count
    }

    /// Applies everything relayed to one client so far.
    pub fn deliver(&mut self, index: usize) -> Vec<StorageUpdate> {
        let ops = std::mem::take(&mut self.inboxes[index]);
        self.clients[index].receive(ops)
    }

    /// Exchanges ops until every client is idle.
    pub fn sync(&mut self) {
        loop {
            let mut progressed = false;
            for index in 0..self.clients.len() {
                progressed |= self.send(index) > 0;
            }
            for index in 0..self.clients.len() {
                if !self.inboxes[index].is_empty() {
                    progressed = true;
                    self.deliver(index);
                }
            }
            if !progressed {
                break;
            }
        }
    }

    pub fn assert_converged(&self) {
        let expected = self.server.to_json();
        for (index, client) in self.clients.iter().enumerate() {
            assert_eq!(client.to_json(), expected, "client {index} diverged");
            assert!(
                client.unacknowledged_ops().is_empty(),
                "client {index} has unacknowledged ops"
            );
        }
    }

    fn relay(&mut self, origin: usize, op: Op) {
        let op_id = op.op_id().cloned();
        match self.authorize(op) {
            Some(op) => {
                self.server.receive([op.clone()]);
                for inbox in &mut self.inboxes {
                    inbox.push(op.clone());
                }
            }
            None => {
                if let Some(op_id) = op_id {
                    self.inboxes[origin].push(Op::Ack { op_id });
                }
            }
        }
    }

    fn authorize(&mut self, mut op: Op) -> Option<Op> {
        let server = &mut self.server;
        match &mut op {
            Op::Create(create) => {
                if server.contains(&create.id) {
                    return None;
                }
                match server.kind(&create.parent_id)? {
                    NodeKind::Register => return None,
                    NodeKind::List => {
                        let position = Position::normalize(&create.parent_key);
                        let list = server.list(&create.parent_id).ok()?;
                        if let Some(index) = list.index_of_position(&position) {
                            let replaces = create.is_set() && list.child_id(index) == create.superseded_id;
                            if !replaces {
                                let next = list.position(index + 1);
                                create.parent_key = Position::make(Some(&position), next.as_ref()).into();
                            }
                        }
                    }
                    NodeKind::Record | NodeKind::Map => {}
                }
            }
            Op::UpdateRecord { id, .. } | Op::DeleteKey { id, .. } => {
                if server.kind(id) != Some(NodeKind::Record) {
                    return None;
                }
            }
            Op::DeleteNode { id, .. } => {
                server.parent_of(id)?;
            }
            Op::SetParentKey { id, parent_key, .. } => {
                let (parent, _) = server.parent_of(id)?;
                let list = server.list(&parent).ok()?;
                let position = Position::normalize(parent_key);
                if let Some(index) = list.index_of_position(&position) {
                    if list.child_id(index).as_ref() != Some(&*id) {
                        let next = list.position(index + 1);
                        *parent_key = Position::make(Some(&position), next.as_ref()).into();
                    }
                }
            }
            Op::Ack { .. } => return None,
        }
        Some(op)
    }
}

/// Id of the nested node stored under `key` of the root record.
pub fn root_child(doc: &mut Document, key: &str) -> NodeId {
    doc.root()
        .child_id(key)
        .unwrap_or_else(|| panic!("root has no node under {key}"))
}

/// A document with `root.items` set to the given list.
pub fn doc_with_items(items: &[&str]) -> Document {
    let mut doc = Document::new(1);
    doc.root()
        .set("items", livetree::Lson::list(items.iter().copied()))
        .unwrap();
    doc
}

pub fn items(doc: &Document) -> Value {
    doc.to_json()["items"].clone()
}

/// Storage hook recording every notification it receives.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Vec<StorageUpdate>>>,
}

impl Recorder {
    pub fn install(doc: &mut Document) -> Arc<Recorder> {
        let recorder = Arc::new(Recorder::default());
        doc.subscribe(recorder.clone());
        recorder
    }

    pub fn calls(&self) -> Vec<Vec<StorageUpdate>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl StorageHook for Recorder {
    fn on_storage_updated(&self, updates: &[StorageUpdate]) -> Result<()> {
        self.calls.lock().unwrap().push(updates.to_vec());
        Ok(())
    }
}
