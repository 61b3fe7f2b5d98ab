//! Model types and the handle used to operate on them
//!
//! A `ModelType` owns everything scoped to one model: its schema, identity
//! cache, adapter, serializer and lifecycle hooks. Callers reach it through a
//! `Model` handle borrowed from the `Registry`.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::adapter::{Adapter, FindQuery};
use crate::cache::{self, IdentityCache};
use crate::collection::Collection;
use crate::error::{MappingError, Result};
use crate::instance::{Instance, DEFAULT_ID_FIELD};
use crate::mapping::{Mapped, MappingWalk, Payload};
use crate::registry::Registry;
use crate::serialize::{IdentitySerializer, RecordSerializer};

/// One schema rule: replace the value at `path` with a `model` instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRule {
    pub path: String,
    pub model: String,
}

/// Per-model extension points
pub trait LifecycleHooks: Send + Sync {
    /// Runs after a successful `Instance::remove`, before an embedded
    /// instance leaves its collection
    fn after_remove(&self, _instance: &Instance) {}
}

/// Hooks that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl LifecycleHooks for NoHooks {}

pub struct ModelType {
    name: String,
    id_field: String,
    schema: RwLock<Vec<MappingRule>>,
    cache: IdentityCache,
    adapter: Arc<dyn Adapter>,
    serializer: Arc<dyn RecordSerializer>,
    hooks: Arc<dyn LifecycleHooks>,
}

impl ModelType {
    pub fn builder(name: &str, adapter: Arc<dyn Adapter>) -> ModelBuilder {
        ModelBuilder {
            name: name.to_string(),
            id_field: DEFAULT_ID_FIELD.to_string(),
            adapter,
            serializer: Arc::new(IdentitySerializer),
            hooks: Arc::new(NoHooks),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    pub fn serializer(&self) -> &dyn RecordSerializer {
        self.serializer.as_ref()
    }

    pub fn hooks(&self) -> &dyn LifecycleHooks {
        self.hooks.as_ref()
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// Schema rules in declaration order
    pub fn rules(&self) -> Vec<MappingRule> {
        self.schema.read().unwrap().clone()
    }

    /// Add a rule; re-declaring a path overwrites it in place
    pub fn declare(&self, path: &str, model: &str) {
        let mut schema = self.schema.write().unwrap();
        match schema.iter_mut().find(|rule| rule.path == path) {
            Some(rule) => rule.model = model.to_string(),
            None => schema.push(MappingRule {
                path: path.to_string(),
                model: model.to_string(),
            }),
        }
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("id_field", &self.id_field)
            .field("schema", &self.rules())
            .field("cached", &self.cache.len())
            .finish()
    }
}

pub struct ModelBuilder {
    name: String,
    id_field: String,
    adapter: Arc<dyn Adapter>,
    serializer: Arc<dyn RecordSerializer>,
    hooks: Arc<dyn LifecycleHooks>,
}

impl ModelBuilder {
    pub fn id_field(mut self, id_field: &str) -> Self {
        self.id_field = id_field.to_string();
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn RecordSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build(self) -> ModelType {
        ModelType {
            name: self.name,
            id_field: self.id_field,
            schema: RwLock::new(Vec::new()),
            cache: IdentityCache::new(),
            adapter: self.adapter,
            serializer: self.serializer,
            hooks: self.hooks,
        }
    }
}

/// Handle for operating on one registered model
#[derive(Clone)]
pub struct Model<'r> {
    registry: &'r Registry,
    model: Arc<ModelType>,
}

impl<'r> Model<'r> {
    pub(crate) fn new(registry: &'r Registry, model: Arc<ModelType>) -> Self {
        Self { registry, model }
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn model_type(&self) -> &Arc<ModelType> {
        &self.model
    }

    /// Declare that the value at `path` maps to `target` instances.
    /// `target` is looked up when mapping runs, so it may be registered later.
    pub fn map(self, path: &str, target: &str) -> Self {
        self.model.declare(path, target);
        self
    }

    pub fn apply_mapping(&self, payload: impl Into<Payload>) -> Result<Mapped> {
        MappingWalk::new(self.registry).map(&self.model, payload.into())
    }

    /// Map `payload` as an element of `collection`, tagged with the
    /// collection's owner and path. The element is not inserted.
    pub fn apply_mapping_for_array(
        &self,
        payload: impl Into<Payload>,
        collection: &Collection,
    ) -> Result<Instance> {
        MappingWalk::new(self.registry).map_member(&self.model, payload.into(), collection)
    }

    // ---------------------------------------------------------------------------
    // Identity cache
    // ---------------------------------------------------------------------------

    /// Replace the cache with `data` (a record or an array of records)
    pub fn preload(&self, data: Value) {
        let records = cache::normalize(self.model.serializer().serialize(data));
        info!(model = %self.name(), records = records.len(), "preloading identity cache");
        self.model.cache().replace(records);
    }

    /// `find_with` for a bare id. `None` returns the first cached record.
    pub async fn find(&self, id: impl Into<Option<Value>>) -> Result<Mapped> {
        self.find_with(FindQuery {
            id: id.into(),
            ..FindQuery::default()
        })
        .await
    }

    /// Serve from the identity cache, or fetch through the adapter on a miss
    pub async fn find_with(&self, query: FindQuery) -> Result<Mapped> {
        let cached = self
            .model
            .cache()
            .lookup(query.id.as_ref(), self.model.id_field());

        if let Some(record) = cached {
            debug!(model = %self.name(), id = ?query.id, "identity cache hit");
            return self.apply_mapping(record);
        }

        debug!(model = %self.name(), id = ?query.id, "identity cache miss, fetching");
        let record = self
            .model
            .adapter()
            .find_record(self.name(), &query)
            .await
            .map_err(|err| {
                warn!(model = %self.name(), error = %err, "find_record failed");
                err
            })?;

        if self.registry.settings().cache_fetched_records {
            let accepted = cache::normalize(self.model.serializer().serialize(record.clone()));
            self.model.cache().extend(accepted);
        }

        self.apply_mapping(record)
    }

    pub fn invalidate_cache(&self) {
        info!(model = %self.name(), "invalidating identity cache");
        self.model.cache().clear();
    }

    pub fn cached_len(&self) -> usize {
        self.model.cache().len()
    }
}

impl fmt::Debug for Model<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Model").field(&self.model).finish()
    }
}

/// Missing model name as a mapping error
pub(crate) fn unknown(name: &str) -> MappingError {
    MappingError::UnknownModel(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;

    fn model_type() -> ModelType {
        ModelType::builder("User", Arc::new(MemoryAdapter::new())).build()
    }

    #[test]
    fn declare_accumulates_in_order() {
        let model = model_type();
        model.declare("address", "Address");
        model.declare("friends", "User");
        let paths: Vec<String> = model.rules().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["address", "friends"]);
    }

    #[test]
    fn redeclare_overwrites_in_place() {
        let model = model_type();
        model.declare("address", "Address");
        model.declare("friends", "User");
        model.declare("address", "Location");
        assert_eq!(
            model.rules(),
            vec![
                MappingRule {
                    path: "address".into(),
                    model: "Location".into()
                },
                MappingRule {
                    path: "friends".into(),
                    model: "User".into()
                },
            ]
        );
    }

    #[test]
    fn builder_defaults() {
        let model = model_type();
        assert_eq!(model.name(), "User");
        assert_eq!(model.id_field(), "id");
        assert!(model.cache().is_empty());
    }

    #[test]
    fn builder_overrides_id_field() {
        let model = ModelType::builder("Doc", Arc::new(MemoryAdapter::new()))
            .id_field("uuid")
            .build();
        assert_eq!(model.id_field(), "uuid");
    }
}
