//! Mapped graph values
//!
//! A raw payload enters as `serde_json::Value` and is converted into a tree of
//! `Node`s. Plain objects and arrays stay plain until a schema rule replaces
//! them with an `Instance` or `Collection` handle.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::collection::Collection;
use crate::instance::Instance;

/// Field map of a plain object or an instance
pub type Fields = BTreeMap<String, Node>;

/// One value in a mapped object graph
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// JSON scalar (null, bool, number, string)
    Value(Value),
    /// Plain, untyped object
    Object(Fields),
    /// Plain, untyped array
    Array(Vec<Node>),
    /// Typed instance handle
    Instance(Instance),
    /// Typed collection handle
    Collection(Collection),
}

impl Node {
    pub fn null() -> Self {
        Node::Value(Value::Null)
    }

    /// Null counts as absent for path resolution
    pub fn is_absent(&self) -> bool {
        matches!(self, Node::Value(Value::Null))
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Node::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Node::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Node::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Re-parse a `Node::Value` that carries an object or array so callers
    /// only ever see plain containers as `Object`/`Array`.
    pub fn normalized(self) -> Self {
        match self {
            Node::Value(value @ (Value::Object(_) | Value::Array(_))) => Node::from(value),
            other => other,
        }
    }

    /// Dump to plain JSON. Instances and collections are flattened to their
    /// field values.
    pub fn to_value(&self) -> Value {
        match self {
            Node::Value(value) => value.clone(),
            Node::Object(fields) => fields_to_value(fields),
            Node::Array(items) => Value::Array(items.iter().map(Node::to_value).collect()),
            Node::Instance(instance) => instance.to_value(),
            Node::Collection(collection) => collection.to_value(),
        }
    }
}

pub(crate) fn fields_to_value(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(key, node)| (key.clone(), node.to_value()))
            .collect(),
    )
}

/// Shallow field copy used when an instance is built from a payload.
/// Anything that is not an object contributes no fields.
pub(crate) fn into_fields(node: Node) -> Fields {
    match node.normalized() {
        Node::Object(fields) => fields,
        Node::Instance(instance) => instance.fields(),
        _ => Fields::new(),
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Node::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Node::from(value)))
                    .collect(),
            ),
            Value::Array(items) => Node::Array(items.into_iter().map(Node::from).collect()),
            scalar => Node::Value(scalar),
        }
    }
}

impl From<Instance> for Node {
    fn from(instance: Instance) -> Self {
        Node::Instance(instance)
    }
}

impl From<Collection> for Node {
    fn from(collection: Collection) -> Self {
        Node::Collection(collection)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
