//! Per-model identity cache
//!
//! An ordered list of raw records, scanned linearly by id. It is only ever
//! replaced, extended or cleared wholesale.

use std::sync::RwLock;

use serde_json::Value;

/// Raw records preloaded or fetched for one model
#[derive(Debug, Default)]
pub struct IdentityCache {
    records: RwLock<Vec<Value>>,
}

impl IdentityCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in `records`, dropping the previous contents
    pub fn replace(&self, records: Vec<Value>) {
        *self.records.write().unwrap() = records;
    }

    /// Append `records` after the existing ones
    pub fn extend(&self, records: Vec<Value>) {
        self.records.write().unwrap().extend(records);
    }

    /// Drop every record
    pub fn clear(&self) {
        self.records.write().unwrap().clear();
    }

    /// Number of cached records
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }

    /// Copy of the cached records in order
    pub fn snapshot(&self) -> Vec<Value> {
        self.records.read().unwrap().clone()
    }

    /// First record whose `id_field` equals `id`. Records with a null or
    /// missing id never match. With no id, returns the first record.
    pub fn lookup(&self, id: Option<&Value>, id_field: &str) -> Option<Value> {
        let records = self.records.read().unwrap();
        match id {
            None => records.first().cloned(),
            Some(id) => records
                .iter()
                .find(|record| {
                    record
                        .get(id_field)
                        .is_some_and(|candidate| !candidate.is_null() && candidate == id)
                })
                .cloned(),
        }
    }
}

/// A record or an array of records, as a list
pub fn normalize(data: Value) -> Vec<Value> {
    match data {
        Value::Array(records) => records,
        record => vec![record],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> IdentityCache {
        let cache = IdentityCache::new();
        cache.replace(normalize(json!([{"id": 1, "n": "a"}, {"id": 2, "n": "b"}])));
        cache
    }

    #[test]
    fn lookup_by_id() {
        let cache = cache();
        assert_eq!(cache.lookup(Some(&json!(2)), "id"), Some(json!({"id": 2, "n": "b"})));
        assert_eq!(cache.lookup(Some(&json!(3)), "id"), None);
    }

    #[test]
    fn lookup_without_id_returns_first() {
        assert_eq!(cache().lookup(None, "id"), Some(json!({"id": 1, "n": "a"})));
        assert_eq!(IdentityCache::new().lookup(None, "id"), None);
    }

    #[test]
    fn null_ids_never_match() {
        let cache = IdentityCache::new();
        cache.replace(vec![json!({"id": null}), json!({"name": "x"})]);
        assert_eq!(cache.lookup(Some(&Value::Null), "id"), None);
    }

    #[test]
    fn custom_id_field() {
        let cache = IdentityCache::new();
        cache.replace(vec![json!({"uuid": "u-1"})]);
        assert!(cache.lookup(Some(&json!("u-1")), "uuid").is_some());
        assert!(cache.lookup(Some(&json!("u-1")), "id").is_none());
    }

    #[test]
    fn replace_is_wholesale() {
        let cache = cache();
        cache.replace(normalize(json!({"id": 9})));
        assert_eq!(cache.snapshot(), vec![json!({"id": 9})]);
    }

    #[test]
    fn extend_and_clear() {
        let cache = cache();
        cache.extend(vec![json!({"id": 3})]);
        assert_eq!(cache.len(), 3);
        cache.clear();
        assert!(cache.is_empty());
    }
}
