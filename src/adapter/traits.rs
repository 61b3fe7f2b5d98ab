//! Core traits and types for the adapter abstraction
//!
//! An `Adapter` is the mapper's only route to a backing store. One adapter
//! may serve many model types; every call receives the model name.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AdapterError;
use crate::instance::Instance;

/// Lookup passed to `Adapter::find_record`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindQuery {
    /// Record id; `None` asks for every record matching `params`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Extra filters, matched against top-level record fields
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
}

impl FindQuery {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<Value>) -> Self {
        Self {
            id: Some(id.into()),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

/// Adapter operations, used for bookkeeping and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Reload,
    Remove,
    FindRecord,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Reload => "reload",
            Operation::Remove => "remove",
            Operation::FindRecord => "find_record",
        };
        f.write_str(name)
    }
}

/// The backing-store collaborator
///
/// Implementations must be Send + Sync for use in async contexts.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Persist a new record; returns the stored record (with its id)
    async fn create(&self, model: &str, instance: &Instance) -> Result<Value, AdapterError>;

    /// Fetch the current state of an existing record
    async fn reload(&self, model: &str, instance: &Instance) -> Result<Value, AdapterError>;

    /// Delete a record
    async fn remove(&self, model: &str, instance: &Instance) -> Result<(), AdapterError>;

    /// Fetch a record by id, or an array of records matching the query
    async fn find_record(&self, model: &str, query: &FindQuery) -> Result<Value, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_builders() {
        let query = FindQuery::by_id(3).param("active", true);
        assert_eq!(query.id, Some(json!(3)));
        assert_eq!(query.params.get("active"), Some(&json!(true)));
        assert_eq!(FindQuery::any(), FindQuery::default());
    }

    #[test]
    fn query_serializes_sparsely() {
        assert_eq!(serde_json::to_value(FindQuery::any()).unwrap(), json!({}));
        assert_eq!(
            serde_json::to_value(FindQuery::by_id("a")).unwrap(),
            json!({"id": "a"})
        );
    }

    #[test]
    fn operation_display() {
        assert_eq!(Operation::FindRecord.to_string(), "find_record");
        assert_eq!(Operation::Create.to_string(), "create");
    }
}
