//! Registers: immutable JSON leaves.
//!
//! A register gives a plain value its own node id so that it can sit in a
//! list or map. Its data never changes after creation and it cannot hold
//! children; replacing a value means replacing the register.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RegisterNode {
    pub(crate) data: Value,
}
