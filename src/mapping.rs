//! Recursive mapping engine
//!
//! Turns raw payloads into typed object graphs by walking a model's schema:
//!
//! ```text
//! payload ──► Array? ──yes──► Collection(owner = fresh root, path = "@self")
//!                │                  └─► each item ─► instantiate_member
//!                no
//!                ▼
//!           instantiate ──► apply_schema
//!                               for (path, target) in schema:
//!                                 resolve(path) absent  ─► skip
//!                                 array                 ─► Collection(owner = instance, path)
//!                                 object / instance     ─► target.instantiate
//!                                 scalar                ─► left as is
//!                               assign(path, replacement)
//! ```
//!
//! Every top-level call runs one `MappingWalk`. The walk tracks the instances
//! whose schema is being applied on the current branch, and a depth bound. An
//! instance graph that loops back on itself raises `MappingError::SchemaCycle`
//! instead of recursing forever.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::collection::Collection;
use crate::error::{MappingError, Result};
use crate::instance::{Instance, Membership, Owner, SELF_PATH};
use crate::model::ModelType;
use crate::node::{self, Fields, Node};
use crate::path;
use crate::registry::Registry;

/// Input to the engine. A payload is either a raw record or an instance
/// that already exists.
#[derive(Debug, Clone)]
pub enum Payload {
    Record(Node),
    Instance(Instance),
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Record(Node::from(value))
    }
}

impl From<Node> for Payload {
    fn from(node: Node) -> Self {
        match node {
            Node::Instance(instance) => Payload::Instance(instance),
            other => Payload::Record(other.normalized()),
        }
    }
}

impl From<Instance> for Payload {
    fn from(instance: Instance) -> Self {
        Payload::Instance(instance)
    }
}

/// Output of `apply_mapping`
#[derive(Debug, Clone, PartialEq)]
pub enum Mapped {
    Instance(Instance),
    Collection(Collection),
}

impl Mapped {
    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Mapped::Instance(instance) => Some(instance),
            Mapped::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Mapped::Collection(collection) => Some(collection),
            Mapped::Instance(_) => None,
        }
    }

    pub fn into_instance(self) -> Option<Instance> {
        match self {
            Mapped::Instance(instance) => Some(instance),
            Mapped::Collection(_) => None,
        }
    }

    pub fn into_collection(self) -> Option<Collection> {
        match self {
            Mapped::Collection(collection) => Some(collection),
            Mapped::Instance(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Mapped::Instance(instance) => instance.to_value(),
            Mapped::Collection(collection) => collection.to_value(),
        }
    }
}

impl From<Mapped> for Node {
    fn from(mapped: Mapped) -> Self {
        match mapped {
            Mapped::Instance(instance) => Node::Instance(instance),
            Mapped::Collection(collection) => Node::Collection(collection),
        }
    }
}

/// State for one top-level mapping call
pub(crate) struct MappingWalk<'r> {
    registry: &'r Registry,
    max_depth: usize,
    /// (model, instance identity) pairs whose schema is being applied on the
    /// current branch
    active: HashSet<(String, usize)>,
    depth: usize,
}

impl<'r> MappingWalk<'r> {
    pub(crate) fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            max_depth: registry.settings().max_depth,
            active: HashSet::new(),
            depth: 0,
        }
    }

    /// `apply_mapping`: arrays become a root collection, anything else an
    /// instance
    pub(crate) fn map(&mut self, model: &Arc<ModelType>, payload: Payload) -> Result<Mapped> {
        match payload {
            Payload::Record(Node::Array(items)) => {
                let root = Instance::new(model.name(), Fields::new());
                let items = items.into_iter().map(Payload::from).collect();
                let collection =
                    self.build_collection(model, items, Owner::Root(root), SELF_PATH, "")?;
                Ok(Mapped::Collection(collection))
            }
            Payload::Record(Node::Collection(existing)) => {
                let root = Instance::new(model.name(), Fields::new());
                let items = existing.items().into_iter().map(Payload::Instance).collect();
                let collection =
                    self.build_collection(model, items, Owner::Root(root), SELF_PATH, "")?;
                Ok(Mapped::Collection(collection))
            }
            other => Ok(Mapped::Instance(self.instantiate(model, other, "")?)),
        }
    }

    /// `apply_mapping_for_array`: an element tagged with the collection's
    /// owner and path
    pub(crate) fn map_member(
        &mut self,
        model: &Arc<ModelType>,
        payload: Payload,
        collection: &Collection,
    ) -> Result<Instance> {
        let at = collection.path();
        self.instantiate_member(model, payload, collection, &at)
    }

    fn shell(model: &ModelType, payload: Payload) -> Instance {
        match payload {
            Payload::Instance(existing) if existing.is_model(model.name()) => existing,
            Payload::Instance(other) => Instance::new(model.name(), other.fields()),
            Payload::Record(record) => Instance::new(model.name(), node::into_fields(record)),
        }
    }

    fn instantiate(&mut self, model: &Arc<ModelType>, payload: Payload, at: &str) -> Result<Instance> {
        let instance = Self::shell(model, payload);
        self.apply_schema(model, &instance, at)?;
        Ok(instance)
    }

    fn instantiate_member(
        &mut self,
        model: &Arc<ModelType>,
        payload: Payload,
        collection: &Collection,
        at: &str,
    ) -> Result<Instance> {
        let instance = Self::shell(model, payload);
        instance.set_membership(Membership::of(collection));
        self.apply_schema(model, &instance, at)?;
        Ok(instance)
    }

    fn build_collection(
        &mut self,
        model: &Arc<ModelType>,
        items: Vec<Payload>,
        owner: Owner,
        path: &str,
        at: &str,
    ) -> Result<Collection> {
        let collection = Collection::new(model.name(), owner, path);
        for (index, item) in items.into_iter().enumerate() {
            let element_at = path::join(at, &index.to_string());
            let element = self.instantiate_member(model, item, &collection, &element_at)?;
            collection.push(element);
        }
        Ok(collection)
    }

    fn apply_schema(&mut self, model: &Arc<ModelType>, instance: &Instance, at: &str) -> Result<()> {
        let key = (model.name().to_string(), instance.identity());
        if self.depth >= self.max_depth || self.active.contains(&key) {
            return Err(MappingError::SchemaCycle {
                model: model.name().to_string(),
                path: at.to_string(),
                depth: self.depth,
            }
            .into());
        }

        self.active.insert(key.clone());
        self.depth += 1;
        let result = self.apply_rules(model, instance, at);
        self.depth -= 1;
        self.active.remove(&key);
        result
    }

    fn apply_rules(&mut self, model: &Arc<ModelType>, instance: &Instance, at: &str) -> Result<()> {
        for rule in model.rules() {
            let Some(current) = instance.get(&rule.path) else {
                debug!(model = %model.name(), path = %rule.path, "path absent, skipped");
                continue;
            };

            let target = self.registry.lookup(&rule.model)?;
            let target_at = path::join(at, &rule.path);

            let replacement = match current.normalized() {
                Node::Array(items) => {
                    let items = items.into_iter().map(Payload::from).collect();
                    let owner = Owner::Instance(instance.downgrade());
                    Node::Collection(self.build_collection(&target, items, owner, &rule.path, &target_at)?)
                }
                Node::Collection(existing) if self.is_settled(&existing, &target, instance, &rule.path) => {
                    continue;
                }
                Node::Collection(existing) => {
                    let items = existing.items().into_iter().map(Payload::Instance).collect();
                    let owner = Owner::Instance(instance.downgrade());
                    Node::Collection(self.build_collection(&target, items, owner, &rule.path, &target_at)?)
                }
                node @ (Node::Object(_) | Node::Instance(_)) => {
                    Node::Instance(self.instantiate(&target, Payload::from(node), &target_at)?)
                }
                Node::Value(_) => {
                    debug!(model = %model.name(), path = %rule.path, "scalar left unmapped");
                    continue;
                }
            };

            instance.set(&rule.path, replacement)?;
        }
        Ok(())
    }

    /// A collection of the target model already owned by `instance` at `path`
    /// is left alone
    fn is_settled(&self, existing: &Collection, target: &ModelType, instance: &Instance, path: &str) -> bool {
        existing.model() == target.name()
            && existing.path() == path
            && existing.parent().is_some_and(|parent| parent.ptr_eq(instance))
    }
}
