//! Values going into and coming out of a document.
//!
//! [`Lson`] describes a value to store: plain JSON, or a nested record, list
//! or map that becomes a tree of live nodes. [`Immutable`] is the frozen,
//! cached projection of a live node returned by `to_immutable`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::Value;

/// JSON object payload of record creation and update ops.
pub type JsonObject = serde_json::Map<String, Value>;

/// A value to be written into a document.
///
/// Inside a record, [`Lson::Value`] fields are stored inline. Inside lists and
/// maps every value becomes an addressable node, plain JSON included.
#[derive(Debug, Clone, PartialEq)]
pub enum Lson {
    Value(Value),
    Record(BTreeMap<String, Lson>),
    List(Vec<Lson>),
    Map(BTreeMap<String, Lson>),
}

impl Lson {
    /// Builds a record from `(key, value)` pairs.
    pub fn record<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Lson>,
    {
        Lson::Record(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn list<V: Into<Lson>>(items: impl IntoIterator<Item = V>) -> Self {
        Lson::List(items.into_iter().map(Into::into).collect())
    }

    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Lson>,
    {
        Lson::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_node(&self) -> bool {
        !matches!(self, Lson::Value(_))
    }
}

impl From<Value> for Lson {
    fn from(value: Value) -> Self {
        Lson::Value(value)
    }
}

macro_rules! lson_from_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Lson {
                fn from(value: $ty) -> Self {
                    Lson::Value(Value::from(value))
                }
            }
        )*
    };
}

lson_from_scalar!(&str, String, bool, i32, i64, u32, u64, f64);

/// Frozen projection of a node.
///
/// Containers are reference counted so that unchanged subtrees keep returning
/// the same allocation between mutations; see [`Immutable::ptr_eq`].
#[derive(Debug, Clone, PartialEq)]
pub enum Immutable {
    Value(Value),
    Record(Arc<BTreeMap<String, Immutable>>),
    List(Arc<Vec<Immutable>>),
    Map(Arc<BTreeMap<String, Immutable>>),
}

impl Immutable {
    /// Whether both values share the same allocation. Plain values compare
    /// structurally.
    pub fn ptr_eq(&self, other: &Immutable) -> bool {
        match (self, other) {
            (Immutable::Record(a), Immutable::Record(b)) | (Immutable::Map(a), Immutable::Map(b)) => {
                Arc::ptr_eq(a, b)
            }
            (Immutable::List(a), Immutable::List(b)) => Arc::ptr_eq(a, b),
            (Immutable::Value(a), Immutable::Value(b)) => a == b,
            _ => false,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Immutable::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&BTreeMap<String, Immutable>> {
        match self {
            Immutable::Record(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Immutable]> {
        match self {
            Immutable::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Immutable>> {
        match self {
            Immutable::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Plain JSON rendering: records and maps become objects, lists arrays.
    pub fn to_json(&self) -> Value {
        match self {
            Immutable::Value(value) => value.clone(),
            Immutable::Record(fields) | Immutable::Map(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Immutable::List(items) => Value::Array(items.iter().map(Immutable::to_json).collect()),
        }
    }
}

impl Serialize for Immutable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Immutable::Value(value) => value.serialize(serializer),
            Immutable::Record(fields) | Immutable::Map(fields) => fields.serialize(serializer),
            Immutable::List(items) => items.serialize(serializer),
        }
    }
}
