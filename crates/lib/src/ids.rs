//! Node and operation identifiers.
//!
//! Both kinds of identifier are generated as `{connection_id}:{counter}`. The
//! connection id comes from the transport and changes on reconnect; the
//! counter never resets, so ids minted under different connections cannot
//! collide with each other or with ids already present in the tree.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a node inside one document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

/// Identifier correlating a locally generated op with its acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(NodeId);
string_id!(OpId);

/// Monotonic `{connection_id}:{counter}` generator.
#[derive(Debug, Clone)]
pub(crate) struct IdGenerator {
    connection_id: u32,
    counter: u64,
}

impl IdGenerator {
    pub(crate) fn new(connection_id: u32) -> Self {
        Self {
            connection_id,
            counter: 0,
        }
    }

    /// Switches to a new connection id, keeping the counter.
    pub(crate) fn set_connection_id(&mut self, connection_id: u32) {
        self.connection_id = connection_id;
    }

    fn next_raw(&mut self) -> String {
        let id = format!("{}:{}", self.connection_id, self.counter);
        self.counter += 1;
        id
    }

    pub(crate) fn next_node_id(&mut self) -> NodeId {
        NodeId(self.next_raw())
    }

    pub(crate) fn next_op_id(&mut self) -> OpId {
        OpId(self.next_raw())
    }
}
