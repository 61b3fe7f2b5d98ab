//! In-process adapter
//!
//! Keeps one table of raw records per model name. Useful as a default
//! backing store and as a test double: it counts calls per operation and can
//! be told to reject the next call of a given kind.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::traits::{Adapter, FindQuery, Operation};
use crate::error::AdapterError;
use crate::instance::{Instance, DEFAULT_ID_FIELD};

/// How `create` assigns ids to records that arrive without one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdStrategy {
    /// One more than the largest integer id in the table
    #[default]
    Sequential,
    /// Random v4 UUID string
    Uuid,
}

#[derive(Debug, Default)]
pub struct MemoryAdapter {
    tables: RwLock<HashMap<String, Vec<Value>>>,
    id_field: Option<String>,
    id_strategy: IdStrategy,
    calls: Mutex<HashMap<Operation, usize>>,
    fail_next: Mutex<HashSet<Operation>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_field(mut self, id_field: &str) -> Self {
        self.id_field = Some(id_field.to_string());
        self
    }

    pub fn with_id_strategy(mut self, id_strategy: IdStrategy) -> Self {
        self.id_strategy = id_strategy;
        self
    }

    fn id_field(&self) -> &str {
        self.id_field.as_deref().unwrap_or(DEFAULT_ID_FIELD)
    }

    /// Append a record, or every record of an array, to `model`'s table
    pub fn seed(&self, model: &str, data: Value) {
        let records = match data {
            Value::Array(records) => records,
            record => vec![record],
        };
        self.tables
            .write()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .extend(records);
    }

    /// Current contents of `model`'s table
    pub fn records(&self, model: &str) -> Vec<Value> {
        self.tables
            .read()
            .unwrap()
            .get(model)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of calls made for `op`, including rejected ones
    pub fn calls(&self, op: Operation) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    /// Reject the next call of `op` with `AdapterError::Rejected`
    pub fn fail_next(&self, op: Operation) {
        self.fail_next.lock().unwrap().insert(op);
    }

    fn enter(&self, op: Operation, model: &str) -> Result<(), AdapterError> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
        debug!(%op, model, "memory adapter call");

        if self.fail_next.lock().unwrap().remove(&op) {
            return Err(AdapterError::Rejected(format!("{op} on '{model}'")));
        }
        Ok(())
    }

    fn instance_id(&self, model: &str, instance: &Instance) -> Result<Value, AdapterError> {
        instance
            .value_at(self.id_field())
            .filter(|id| !id.is_null())
            .ok_or_else(|| AdapterError::MissingId {
                model: model.to_string(),
                id_field: self.id_field().to_string(),
            })
    }

    fn has_id(&self, record: &Value, id: &Value) -> bool {
        record
            .get(self.id_field())
            .is_some_and(|candidate| !candidate.is_null() && candidate == id)
    }

    fn next_id(&self, table: &[Value]) -> Value {
        match self.id_strategy {
            IdStrategy::Sequential => {
                let max = table
                    .iter()
                    .filter_map(|record| record.get(self.id_field()).and_then(Value::as_u64))
                    .max()
                    .unwrap_or(0);
                Value::from(max + 1)
            }
            IdStrategy::Uuid => Value::from(Uuid::new_v4().to_string()),
        }
    }

    fn not_found(model: &str, id: &Value) -> AdapterError {
        AdapterError::NotFound(format!("{model} {id}"))
    }
}

fn matches_params(record: &Value, query: &FindQuery) -> bool {
    query
        .params
        .iter()
        .all(|(key, expected)| record.get(key) == Some(expected))
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn create(&self, model: &str, instance: &Instance) -> Result<Value, AdapterError> {
        self.enter(Operation::Create, model)?;

        let mut record = match instance.to_value() {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let mut tables = self.tables.write().unwrap();
        let table = tables.entry(model.to_string()).or_default();

        let has_id = record
            .get(self.id_field())
            .is_some_and(|id| !id.is_null());
        if !has_id {
            record.insert(self.id_field().to_string(), self.next_id(table));
        }

        let record = Value::Object(record);
        table.push(record.clone());
        Ok(record)
    }

    async fn reload(&self, model: &str, instance: &Instance) -> Result<Value, AdapterError> {
        self.enter(Operation::Reload, model)?;
        let id = self.instance_id(model, instance)?;

        self.tables
            .read()
            .unwrap()
            .get(model)
            .and_then(|table| table.iter().find(|record| self.has_id(record, &id)).cloned())
            .ok_or_else(|| Self::not_found(model, &id))
    }

    async fn remove(&self, model: &str, instance: &Instance) -> Result<(), AdapterError> {
        self.enter(Operation::Remove, model)?;
        let id = self.instance_id(model, instance)?;

        let mut tables = self.tables.write().unwrap();
        let table = tables
            .get_mut(model)
            .ok_or_else(|| Self::not_found(model, &id))?;
        let index = table
            .iter()
            .position(|record| self.has_id(record, &id))
            .ok_or_else(|| Self::not_found(model, &id))?;
        table.remove(index);
        Ok(())
    }

    async fn find_record(&self, model: &str, query: &FindQuery) -> Result<Value, AdapterError> {
        self.enter(Operation::FindRecord, model)?;

        let tables = self.tables.read().unwrap();
        let table = tables.get(model).map(Vec::as_slice).unwrap_or_default();

        match &query.id {
            Some(id) => table
                .iter()
                .find(|record| self.has_id(record, id) && matches_params(record, query))
                .cloned()
                .ok_or_else(|| Self::not_found(model, id)),
            None => Ok(Value::Array(
                table
                    .iter()
                    .filter(|record| matches_params(record, query))
                    .cloned()
                    .collect(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(record: Value) -> Instance {
        Instance::from_value("User", record)
    }

    // ── create ───────────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let adapter = MemoryAdapter::new();
        adapter.seed("User", json!([{"id": 1}, {"id": 4}]));

        let created = adapter.create("User", &user(json!({"name": "a"}))).await.unwrap();
        assert_eq!(created, json!({"id": 5, "name": "a"}));
        assert_eq!(adapter.records("User").len(), 3);
    }

    #[tokio::test]
    async fn test_create_keeps_existing_id() {
        let adapter = MemoryAdapter::new();
        let created = adapter.create("User", &user(json!({"id": 42}))).await.unwrap();
        assert_eq!(created, json!({"id": 42}));
    }

    #[tokio::test]
    async fn test_create_with_uuid_strategy() {
        let adapter = MemoryAdapter::new()
            .with_id_field("uuid")
            .with_id_strategy(IdStrategy::Uuid);
        let created = adapter.create("Doc", &user(json!({}))).await.unwrap();
        let id = created["uuid"].as_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    // ── reload / remove ──────────────────────────────────────────

    #[tokio::test]
    async fn test_reload_by_id() {
        let adapter = MemoryAdapter::new();
        adapter.seed("User", json!({"id": 1, "name": "fresh"}));

        let record = adapter.reload("User", &user(json!({"id": 1}))).await.unwrap();
        assert_eq!(record["name"], "fresh");

        let err = adapter.reload("User", &user(json!({"id": 2}))).await.unwrap_err();
        assert!(matches!(err, AdapterError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reload_without_id() {
        let adapter = MemoryAdapter::new();
        let err = adapter.reload("User", &user(json!({}))).await.unwrap_err();
        assert!(matches!(err, AdapterError::MissingId { .. }));
    }

    #[tokio::test]
    async fn test_remove() {
        let adapter = MemoryAdapter::new();
        adapter.seed("User", json!([{"id": 1}, {"id": 2}]));

        adapter.remove("User", &user(json!({"id": 1}))).await.unwrap();
        assert_eq!(adapter.records("User"), vec![json!({"id": 2})]);
        assert!(adapter.remove("User", &user(json!({"id": 1}))).await.is_err());
    }

    // ── find_record ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_find_by_id_and_params() {
        let adapter = MemoryAdapter::new();
        adapter.seed(
            "User",
            json!([{"id": 1, "team": "a"}, {"id": 2, "team": "b"}, {"id": 3, "team": "a"}]),
        );

        let one = adapter.find_record("User", &FindQuery::by_id(2)).await.unwrap();
        assert_eq!(one, json!({"id": 2, "team": "b"}));

        let all = adapter
            .find_record("User", &FindQuery::any().param("team", "a"))
            .await
            .unwrap();
        assert_eq!(all, json!([{"id": 1, "team": "a"}, {"id": 3, "team": "a"}]));

        let empty = adapter.find_record("Nobody", &FindQuery::any()).await.unwrap();
        assert_eq!(empty, json!([]));
    }

    // ── bookkeeping ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_fail_next_rejects_once() {
        let adapter = MemoryAdapter::new();
        adapter.fail_next(Operation::FindRecord);

        let err = adapter.find_record("User", &FindQuery::any()).await.unwrap_err();
        assert!(matches!(err, AdapterError::Rejected(_)));
        assert!(adapter.find_record("User", &FindQuery::any()).await.is_ok());
        assert_eq!(adapter.calls(Operation::FindRecord), 2);
        assert_eq!(adapter.calls(Operation::Create), 0);
    }
}
