//! Collections of typed instances
//!
//! A `Collection` wraps an array-shaped sub-payload. It remembers its `owner`
//! and `path`, and stamps the same pair onto every element it holds. An
//! element can then find its way back through the path resolver without the
//! collection keeping a reverse index.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{PathError, Result};
use crate::instance::{Instance, Owner};
use crate::mapping::Payload;
use crate::registry::Registry;

struct CollectionState {
    model: String,
    owner: Owner,
    path: String,
    items: Vec<Instance>,
}

/// Ordered, mutable sequence of instances of one model
#[derive(Clone)]
pub struct Collection {
    inner: Arc<RwLock<CollectionState>>,
}

/// Non-owning reference to a collection
#[derive(Clone)]
pub struct WeakCollection(Weak<RwLock<CollectionState>>);

impl WeakCollection {
    pub fn upgrade(&self) -> Option<Collection> {
        self.0.upgrade().map(|inner| Collection { inner })
    }
}

impl fmt::Debug for WeakCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakCollection(alive: {})", self.0.strong_count() > 0)
    }
}

impl Collection {
    pub(crate) fn new(model: &str, owner: Owner, path: &str) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CollectionState {
                model: model.to_string(),
                owner,
                path: path.to_string(),
                items: Vec::new(),
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CollectionState> {
        self.inner.read().unwrap()
    }

    fn write(&self) -> RwLockWriteGuard<'_, CollectionState> {
        self.inner.write().unwrap()
    }

    /// Model name of the elements
    pub fn model(&self) -> String {
        self.read().model.clone()
    }

    /// Owner recorded at construction
    pub fn owner(&self) -> Owner {
        self.read().owner.clone()
    }

    /// The owning instance, if it is still alive
    pub fn parent(&self) -> Option<Instance> {
        self.read().owner.instance()
    }

    /// Path of this collection within its owner
    pub fn path(&self) -> String {
        self.read().path.clone()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.read().items.len()
    }

    /// True when there are no elements
    pub fn is_empty(&self) -> bool {
        self.read().items.is_empty()
    }

    /// Element at `index`, if any
    pub fn get(&self, index: usize) -> Option<Instance> {
        self.read().items.get(index).cloned()
    }

    /// Snapshot of the elements in order
    pub fn items(&self) -> Vec<Instance> {
        self.read().items.clone()
    }

    /// Index of `instance` by identity
    pub fn position(&self, instance: &Instance) -> Option<usize> {
        self.read().items.iter().position(|item| item.ptr_eq(instance))
    }

    /// Whether `instance` is an element, by identity
    pub fn contains(&self, instance: &Instance) -> bool {
        self.position(instance).is_some()
    }

    pub(crate) fn push(&self, instance: Instance) {
        self.write().items.push(instance);
    }

    pub(crate) fn replace_at(&self, index: usize, instance: Instance) {
        if let Some(slot) = self.write().items.get_mut(index) {
            *slot = instance;
        }
    }

    /// Remove an element by identity, not by value
    pub fn remove(&self, instance: &Instance) -> bool {
        let mut state = self.write();
        match state.items.iter().position(|item| item.ptr_eq(instance)) {
            Some(index) => {
                state.items.remove(index);
                true
            }
            None => false,
        }
    }

    /// Create `instance` through its model's adapter and append the mapped
    /// result. The returned handle is the appended element.
    pub async fn add(&self, registry: &Registry, instance: &Instance) -> Result<Instance> {
        let model = registry.lookup(&instance.model())?;

        let record = model
            .adapter()
            .create(model.name(), instance)
            .await
            .map_err(|err| {
                warn!(model = %model.name(), error = %err, "create failed");
                err
            })?;

        let element = registry
            .model(model.name())?
            .apply_mapping_for_array(record, self)?;
        self.push(element.clone());

        debug!(model = %model.name(), path = %self.path(), len = self.len(), "appended created record");
        Ok(element)
    }

    /// Map `payload` as a `model` element of this collection and insert it at
    /// `index`
    pub fn insert_at(
        &self,
        registry: &Registry,
        index: usize,
        payload: impl Into<Payload>,
        model: &str,
    ) -> Result<Instance> {
        self.check_index(index)?;
        let element = registry
            .model(model)?
            .apply_mapping_for_array(payload, self)?;

        let mut state = self.write();
        let len = state.items.len();
        if index > len {
            return Err(self.out_of_bounds(index, len, &state.path).into());
        }
        state.items.insert(index, element.clone());
        Ok(element)
    }

    /// Map `payload` as a `model` element of this collection and append it
    pub fn insert_after(
        &self,
        registry: &Registry,
        payload: impl Into<Payload>,
        model: &str,
    ) -> Result<Instance> {
        let element = registry
            .model(model)?
            .apply_mapping_for_array(payload, self)?;
        self.push(element.clone());
        Ok(element)
    }

    fn check_index(&self, index: usize) -> std::result::Result<(), PathError> {
        let state = self.read();
        let len = state.items.len();
        if index > len {
            return Err(self.out_of_bounds(index, len, &state.path));
        }
        Ok(())
    }

    fn out_of_bounds(&self, index: usize, len: usize, path: &str) -> PathError {
        PathError::IndexOutOfBounds {
            path: path.to_string(),
            index,
            len,
        }
    }

    pub fn downgrade(&self) -> WeakCollection {
        WeakCollection(Arc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Collection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.items().iter().map(Instance::to_value).collect())
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("Collection")
            .field("model", &state.model)
            .field("path", &state.path)
            .field("owner", &state.owner)
            .field("items", &state.items)
            .finish()
    }
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
