//! Typed instances and their collection membership
//!
//! An `Instance` is a shared handle: clones point at the same fields, and two
//! handles compare equal only when they are the same instance. Instances built
//! for a collection carry a `Membership` naming their owner and path, which is
//! all they need to find the collection again and remove themselves from it.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::collection::{Collection, WeakCollection};
use crate::error::{MappingError, PathError, Result};
use crate::model::ModelType;
use crate::node::{self, Fields, Node};
use crate::path;
use crate::registry::Registry;

/// Path recorded on elements of a top-level collection. Resolving it from an
/// element yields the collection itself.
pub const SELF_PATH: &str = "@self";

/// Field name used by `Instance::id`
pub const DEFAULT_ID_FIELD: &str = "id";

struct InstanceState {
    model: String,
    fields: Fields,
    membership: Option<Membership>,
}

/// Typed wrapper around a record's fields
#[derive(Clone)]
pub struct Instance {
    inner: Arc<RwLock<InstanceState>>,
}

/// Non-owning reference to an instance
#[derive(Clone)]
pub struct WeakInstance(Weak<RwLock<InstanceState>>);

impl WeakInstance {
    pub fn upgrade(&self) -> Option<Instance> {
        self.0.upgrade().map(|inner| Instance { inner })
    }
}

/// Whatever owns a collection
#[derive(Clone)]
pub enum Owner {
    /// The instance holding the collection in one of its fields. Weak, since
    /// that instance already owns the collection.
    Instance(WeakInstance),
    /// Fresh instance standing in as parent of a top-level array
    Root(Instance),
}

impl Owner {
    pub fn instance(&self) -> Option<Instance> {
        match self {
            Owner::Instance(weak) => weak.upgrade(),
            Owner::Root(instance) => Some(instance.clone()),
        }
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Instance(weak) => match weak.upgrade() {
                Some(instance) => write!(f, "Owner::Instance({})", instance.model()),
                None => write!(f, "Owner::Instance(<dropped>)"),
            },
            Owner::Root(instance) => write!(f, "Owner::Root({})", instance.model()),
        }
    }
}

/// Parent/path tag carried by every collection element
#[derive(Clone, Debug)]
pub struct Membership {
    pub owner: Owner,
    pub path: String,
    collection: WeakCollection,
}

impl Membership {
    pub(crate) fn of(collection: &Collection) -> Self {
        Self {
            owner: collection.owner(),
            path: collection.path(),
            collection: collection.downgrade(),
        }
    }
}

impl Instance {
    pub fn new(model: &str, fields: Fields) -> Self {
        Self {
            inner: Arc::new(RwLock::new(InstanceState {
                model: model.to_string(),
                fields,
                membership: None,
            })),
        }
    }

    /// Shallow-copy a raw record's top-level fields
    pub fn from_value(model: &str, record: Value) -> Self {
        Self::new(model, node::into_fields(Node::from(record)))
    }

    fn read(&self) -> RwLockReadGuard<'_, InstanceState> {
        self.inner.read().unwrap()
    }

    fn write(&self) -> RwLockWriteGuard<'_, InstanceState> {
        self.inner.write().unwrap()
    }

    /// Model name this instance was mapped as
    pub fn model(&self) -> String {
        self.read().model.clone()
    }

    /// Whether this instance was mapped as `model`
    pub fn is_model(&self, model: &str) -> bool {
        self.read().model == model
    }

    /// Top-level field, if present and non-null
    pub fn field(&self, name: &str) -> Option<Node> {
        self.read()
            .fields
            .get(name)
            .filter(|node| !node.is_absent())
            .cloned()
    }

    /// Copy of all top-level fields
    pub fn fields(&self) -> Fields {
        self.read().fields.clone()
    }

    /// Node at a dotted `path`, if it resolves
    pub fn get(&self, path: &str) -> Option<Node> {
        let segments: Vec<&str> = path.split(path::SEPARATOR).collect();
        path::resolve_segments(&Node::Instance(self.clone()), &segments)
    }

    /// Plain JSON value at `path`
    pub fn value_at(&self, path: &str) -> Option<Value> {
        self.get(path).map(|node| node.to_value())
    }

    /// Value of the `id` field
    pub fn id(&self) -> Option<Value> {
        self.value_at(DEFAULT_ID_FIELD)
    }

    /// Assign `value` at a dotted `path`
    pub fn set(&self, path: &str, value: impl Into<Node>) -> std::result::Result<(), PathError> {
        let segments = path::segments(path)?;
        self.assign_segments(&segments, path, value.into())
    }

    pub(crate) fn assign_segments(
        &self,
        segments: &[&str],
        path: &str,
        value: Node,
    ) -> std::result::Result<(), PathError> {
        let pending = {
            let mut state = self.write();
            path::assign_in_fields(&mut state.fields, segments, path, value)?
        };
        match pending {
            Some(pending) => pending.finish(path),
            None => Ok(()),
        }
    }

    /// Overwrite top-level fields with `fields`, keeping any others
    pub(crate) fn merge_fields(&self, fields: Fields) {
        let mut state = self.write();
        for (key, node) in fields {
            state.fields.insert(key, node);
        }
    }

    /// Collection tag, for instances built as collection elements
    pub fn membership(&self) -> Option<Membership> {
        self.read().membership.clone()
    }

    /// True for instances produced for a collection
    pub fn is_embedded(&self) -> bool {
        self.read().membership.is_some()
    }

    pub(crate) fn set_membership(&self, membership: Membership) {
        self.write().membership = Some(membership);
    }

    /// Non-owning handle
    pub fn downgrade(&self) -> WeakInstance {
        WeakInstance(Arc::downgrade(&self.inner))
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Plain JSON dump of the fields
    pub fn to_value(&self) -> Value {
        node::fields_to_value(&self.fields())
    }

    // ---------------------------------------------------------------------------
    // Collection membership
    // ---------------------------------------------------------------------------

    /// Resolve this element's owner and path back to its collection. Falls
    /// back to the element's weak collection link when the owner has been
    /// dropped or the path no longer holds a collection.
    pub fn owning_collection(&self) -> std::result::Result<Collection, MappingError> {
        let membership = self.membership().ok_or_else(|| self.detached(""))?;

        if membership.path != SELF_PATH {
            let resolved = membership
                .owner
                .instance()
                .and_then(|parent| parent.get(&membership.path));
            if let Some(Node::Collection(collection)) = resolved {
                return Ok(collection);
            }
        }

        membership
            .collection
            .upgrade()
            .ok_or_else(|| self.detached(&membership.path))
    }

    /// Remove this element from its owning collection. Returns whether it was
    /// found there; instances outside any collection return `false`.
    pub fn remove_from_array(&self) -> std::result::Result<bool, MappingError> {
        if !self.is_embedded() {
            return Ok(false);
        }
        let collection = self.owning_collection()?;
        Ok(collection.remove(self))
    }

    fn detached(&self, path: &str) -> MappingError {
        MappingError::DetachedElement {
            model: self.model(),
            path: path.to_string(),
        }
    }

    // ---------------------------------------------------------------------------
    // Record lifecycle
    // ---------------------------------------------------------------------------

    /// Refresh fields from the adapter's `reload`. Identity and collection
    /// membership are kept.
    pub async fn reload(&self, registry: &Registry) -> Result<Instance> {
        let model = registry.lookup(&self.model())?;

        let record = model
            .adapter()
            .reload(model.name(), self)
            .await
            .map_err(|err| {
                warn!(model = %model.name(), error = %err, "reload failed");
                err
            })?;

        self.replace(registry, record)?;
        Ok(self.clone())
    }

    /// Overwrite fields from `record` and re-run the model's schema in place.
    /// If mapping fails the previous fields are restored.
    pub fn replace(&self, registry: &Registry, record: Value) -> Result<()> {
        let model = registry.model(&self.model())?;
        let fresh = Node::from(record);
        if matches!(fresh, Node::Array(_)) {
            return Err(MappingError::UnexpectedCollection {
                model: model.name().to_string(),
            }
            .into());
        }

        let previous = self.fields();
        self.merge_fields(node::into_fields(fresh));
        if let Err(err) = model.apply_mapping(self.clone()) {
            warn!(model = %model.name(), error = %err, "replace failed, fields restored");
            self.write().fields = previous;
            return Err(err);
        }
        Ok(())
    }

    /// Delete through the adapter's `remove`, then run `after_remove`.
    /// An embedded instance must still be able to find its collection, or
    /// the adapter is never called.
    pub async fn remove(&self, registry: &Registry) -> Result<Instance> {
        let model = registry.lookup(&self.model())?;
        let collection = match self.is_embedded() {
            true => Some(self.owning_collection()?),
            false => None,
        };

        model
            .adapter()
            .remove(model.name(), self)
            .await
            .map_err(|err| {
                warn!(model = %model.name(), error = %err, "remove failed");
                err
            })?;

        self.after_remove(&model, collection);
        Ok(self.clone())
    }

    /// Model hook first, then collection removal for embedded instances
    fn after_remove(&self, model: &ModelType, collection: Option<Collection>) {
        model.hooks().after_remove(self);

        if let Some(collection) = collection {
            let removed = collection.remove(self);
            debug!(model = %model.name(), removed, "removed from owning collection");
        }
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("Instance")
            .field("model", &state.model)
            .field("fields", &state.fields)
            .field("embedded", &state.membership.is_some())
            .finish()
    }
}

impl Serialize for Instance {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clones_share_fields() {
        let a = Instance::from_value("User", json!({"id": 1, "name": "a"}));
        let b = a.clone();
        b.set("name", Node::from(json!("b"))).unwrap();
        assert_eq!(a.value_at("name"), Some(json!("b")));
        assert_eq!(a, b);
    }

    #[test]
    fn equality_is_identity() {
        let a = Instance::from_value("User", json!({"id": 1}));
        let b = Instance::from_value("User", json!({"id": 1}));
        assert_ne!(a, b);
        assert_eq!(a.to_value(), b.to_value());
    }

    #[test]
    fn from_scalar_has_no_fields() {
        let instance = Instance::from_value("User", json!(42));
        assert!(instance.fields().is_empty());
        assert_eq!(instance.id(), None);
    }

    #[test]
    fn get_and_set_nested() {
        let instance = Instance::from_value("User", json!({"address": {"city": "X"}}));
        instance.set("address.city", Node::from(json!("Y"))).unwrap();
        assert_eq!(instance.value_at("address.city"), Some(json!("Y")));

        let err = instance
            .set("profile.bio", Node::from(json!("hi")))
            .unwrap_err();
        assert!(matches!(err, PathError::MissingSegment { .. }));
    }

    #[test]
    fn plain_instance_is_not_embedded() {
        let instance = Instance::from_value("User", json!({"id": 1}));
        assert!(!instance.is_embedded());
        assert_eq!(instance.remove_from_array(), Ok(false));
        assert!(matches!(
            instance.owning_collection(),
            Err(MappingError::DetachedElement { .. })
        ));
    }

    #[test]
    fn merge_keeps_unrelated_fields() {
        let instance = Instance::from_value("User", json!({"id": 1, "name": "a"}));
        instance.merge_fields(node::into_fields(Node::from(json!({"name": "b", "age": 3}))));
        assert_eq!(instance.to_value(), json!({"id": 1, "name": "b", "age": 3}));
    }

    #[test]
    fn serializes_fields_only() {
        let instance = Instance::from_value("User", json!({"id": 7}));
        assert_eq!(serde_json::to_value(&instance).unwrap(), json!({"id": 7}));
    }
}
