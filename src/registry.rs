//! Model registry
//!
//! The `Registry` owns every `ModelType` known to the process, keyed by name.
//! It is built at startup and passed by reference to each operation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::adapter::Adapter;
use crate::config::{MapperConfig, MapperSettings};
use crate::error::{MappingError, Result};
use crate::model::{self, Model, ModelType};

/// Registry of model types keyed by name
#[derive(Default)]
pub struct Registry {
    models: RwLock<HashMap<String, Arc<ModelType>>>,
    settings: MapperSettings,
}

impl Registry {
    /// Empty registry with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry with the given mapper settings
    pub fn with_settings(settings: MapperSettings) -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            settings,
        }
    }

    /// Settings every mapping call reads, such as `max_depth`
    pub fn settings(&self) -> &MapperSettings {
        &self.settings
    }

    /// Register a fully built model type
    pub fn register(&self, model: ModelType) -> std::result::Result<Model<'_>, MappingError> {
        let mut models = self.models.write().unwrap();
        if models.contains_key(model.name()) {
            return Err(MappingError::DuplicateModel(model.name().to_string()));
        }

        let model = Arc::new(model);
        models.insert(model.name().to_string(), model.clone());
        Ok(Model::new(self, model))
    }

    /// Register `name` with default id field, serializer and hooks
    pub fn define(
        &self,
        name: &str,
        adapter: Arc<dyn Adapter>,
    ) -> std::result::Result<Model<'_>, MappingError> {
        self.register(ModelType::builder(name, adapter).build())
    }

    /// Handle to a registered model, or `UnknownModel`
    pub fn model(&self, name: &str) -> std::result::Result<Model<'_>, MappingError> {
        Ok(Model::new(self, self.lookup(name)?))
    }

    pub(crate) fn lookup(&self, name: &str) -> std::result::Result<Arc<ModelType>, MappingError> {
        self.models
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| model::unknown(name))
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.models.read().unwrap().contains_key(name)
    }

    /// Registered model names, sorted
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a registry with every model declared in `config`, all served by
    /// `adapter`
    pub fn from_config(config: &MapperConfig, adapter: Arc<dyn Adapter>) -> Result<Self> {
        config.validate()?;
        let registry = Self::with_settings(config.settings);

        for (name, model_config) in &config.models {
            let model = ModelType::builder(name, adapter.clone())
                .id_field(&model_config.id_field)
                .serializer(model_config.serializer())
                .build();
            registry.register(model)?;
        }

        for (name, model_config) in &config.models {
            let model = registry.lookup(name)?;
            for mapping in &model_config.mappings {
                model.declare(&mapping.path, &mapping.model);
            }
        }

        info!(models = config.models.len(), "registry built from config");
        Ok(registry)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("models", &self.model_names())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;
    use crate::model::MappingRule;
    use serde_json::json;

    fn adapter() -> Arc<dyn Adapter> {
        Arc::new(MemoryAdapter::new())
    }

    #[test]
    fn test_define_and_lookup() {
        let registry = Registry::new();
        registry.define("User", adapter()).unwrap();

        assert!(registry.contains("User"));
        assert_eq!(registry.model("User").unwrap().name(), "User");
        assert_eq!(
            registry.model("Ghost").unwrap_err(),
            MappingError::UnknownModel("Ghost".into())
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = Registry::new();
        registry.define("User", adapter()).unwrap();
        assert_eq!(
            registry.define("User", adapter()).unwrap_err(),
            MappingError::DuplicateModel("User".into())
        );
    }

    #[test]
    fn test_schema_shared_between_handles() {
        let registry = Registry::new();
        registry.define("User", adapter()).unwrap().map("address", "Address");

        let rules = registry.model("User").unwrap().model_type().rules();
        assert_eq!(
            rules,
            vec![MappingRule {
                path: "address".into(),
                model: "Address".into()
            }]
        );
    }

    #[test]
    fn test_model_names_sorted() {
        let registry = Registry::new();
        registry.define("Team", adapter()).unwrap();
        registry.define("Address", adapter()).unwrap();
        assert_eq!(registry.model_names(), vec!["Address", "Team"]);
    }

    #[test]
    fn test_from_config() {
        let config = MapperConfig::from_yaml(
            r#"
settings:
  max_depth: 8
models:
  User:
    id_field: uuid
    mappings:
      - path: address
        model: Address
    strip_prefix: "_"
  Address: {}
"#,
        )
        .unwrap();

        let registry = Registry::from_config(&config, adapter()).unwrap();
        assert_eq!(registry.settings().max_depth, 8);

        let user = registry.model("User").unwrap();
        assert_eq!(user.model_type().id_field(), "uuid");
        assert_eq!(user.model_type().rules().len(), 1);

        user.preload(json!({"uuid": "u-1", "_dirty": true}));
        assert_eq!(user.model_type().cache().snapshot(), vec![json!({"uuid": "u-1"})]);
    }
}
