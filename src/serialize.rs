//! Record serializers
//!
//! A serializer rewrites data before it enters a model's identity cache. The
//! default passes records through; `KeyFilter` produces the "shallow dump
//! minus internal fields" form used for snapshots.

use std::collections::BTreeSet;

use serde_json::Value;

pub trait RecordSerializer: Send + Sync {
    fn serialize(&self, payload: Value) -> Value;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IdentitySerializer;

impl RecordSerializer for IdentitySerializer {
    fn serialize(&self, payload: Value) -> Value {
        payload
    }
}

/// Drops named top-level keys, and keys starting with a prefix, from each
/// record
#[derive(Debug, Default, Clone)]
pub struct KeyFilter {
    keys: BTreeSet<String>,
    prefix: Option<String>,
}

impl KeyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.prefix.is_none()
    }

    fn keeps(&self, key: &str) -> bool {
        if self.keys.contains(key) {
            return false;
        }
        match &self.prefix {
            Some(prefix) => !key.starts_with(prefix.as_str()),
            None => true,
        }
    }

    fn strip(&self, record: Value) -> Value {
        match record {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(key, _)| self.keeps(key))
                    .collect(),
            ),
            other => other,
        }
    }
}

impl RecordSerializer for KeyFilter {
    fn serialize(&self, payload: Value) -> Value {
        match payload {
            Value::Array(records) => {
                Value::Array(records.into_iter().map(|record| self.strip(record)).collect())
            }
            record => self.strip(record),
        }
    }
}
