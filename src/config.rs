//! Mapper configuration parsing
//!
//! Loads model declarations and engine settings from YAML. A config file
//! looks like:
//!
//! ```yaml
//! settings:
//!   max_depth: 32
//!   cache_fetched_records: true
//! http:
//!   base_url: "https://api.example.com/v1/"
//!   timeout_secs: 10
//! models:
//!   User:
//!     resource: users
//!     mappings:
//!       - path: address
//!         model: Address
//!     strip_prefix: "_"
//!   Address: {}
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::instance::DEFAULT_ID_FIELD;
use crate::serialize::{IdentitySerializer, KeyFilter, RecordSerializer};

/// Root configuration structure for the mapper
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MapperConfig {
    #[serde(default)]
    pub settings: MapperSettings,
    #[serde(default)]
    pub http: Option<HttpConfig>,
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
}

/// Engine-wide knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct MapperSettings {
    /// Nesting bound for one mapping call
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Append records fetched by `find` to the identity cache
    #[serde(default)]
    pub cache_fetched_records: bool,
}

impl Default for MapperSettings {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            cache_fetched_records: false,
        }
    }
}

fn default_max_depth() -> usize {
    64
}

/// REST adapter connection settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HttpConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Configuration for a single model type
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// REST resource name (defaults to the lowercased model name)
    #[serde(default)]
    pub resource: Option<String>,
    /// Schema rules, in declaration order
    #[serde(default)]
    pub mappings: Vec<MappingConfig>,
    /// Top-level keys dropped before records enter the identity cache
    #[serde(default)]
    pub strip_keys: Vec<String>,
    #[serde(default)]
    pub strip_prefix: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id_field: default_id_field(),
            resource: None,
            mappings: Vec::new(),
            strip_keys: Vec::new(),
            strip_prefix: None,
        }
    }
}

fn default_id_field() -> String {
    DEFAULT_ID_FIELD.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MappingConfig {
    pub path: String,
    pub model: String,
}

impl ModelConfig {
    pub fn resource_name(&self, model: &str) -> String {
        self.resource
            .clone()
            .unwrap_or_else(|| model.to_lowercase())
    }

    /// Serializer for the identity cache
    pub fn serializer(&self) -> Arc<dyn RecordSerializer> {
        let mut filter = KeyFilter::new().keys(self.strip_keys.iter().cloned());
        if let Some(prefix) = &self.strip_prefix {
            filter = filter.prefix(prefix);
        }

        if filter.is_empty() {
            Arc::new(IdentitySerializer)
        } else {
            Arc::new(filter)
        }
    }
}

impl MapperConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: MapperConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with, and mappings that target
    /// undeclared models
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settings.max_depth == 0 {
            return Err(ConfigError::Invalid("settings.max_depth must be positive".into()));
        }

        for (name, model) in &self.models {
            if model.id_field.is_empty() {
                return Err(ConfigError::Invalid(format!("model '{name}' has an empty id_field")));
            }
            for mapping in &model.mappings {
                if mapping.path.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "model '{name}' declares a mapping with an empty path"
                    )));
                }
                if !self.models.contains_key(&mapping.model) {
                    return Err(ConfigError::Invalid(format!(
                        "model '{name}' maps '{}' to undeclared model '{}'",
                        mapping.path, mapping.model
                    )));
                }
            }
        }

        Ok(())
    }
}
