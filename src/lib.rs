//! Record Mapper - client-side object-graph mapping over JSON records
//!
//! Raw payloads from a backing store are turned into typed object graphs:
//! nested objects become `Instance`s of their declared model, nested arrays
//! become `Collection`s that remember their owner and path, so an element can
//! later remove itself. Each model keeps an identity cache that `find` serves
//! from before asking its adapter.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Callers: find / preload / apply_mapping / add / reload / remove│
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Registry                                  │
//! │      model name -> ModelType (schema, cache, adapter, hooks)    │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Mapping Engine                               │
//! │      path resolver + schema walk -> Instance / Collection       │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Adapter                                   │
//! │              (MemoryAdapter | HttpAdapter)                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use record_mapper::{MemoryAdapter, Registry};
//!
//! let registry = Registry::new();
//! let adapter = Arc::new(MemoryAdapter::new());
//! registry.define("Address", adapter.clone())?;
//! registry.define("User", adapter)?.map("address", "Address");
//!
//! let user = registry.model("User")?;
//! user.preload(json!([{"id": 1, "address": {"city": "X"}}]));
//! let found = user.find(json!(1)).await?;
//! ```

pub mod adapter;
pub mod cache;
pub mod collection;
pub mod config;
pub mod error;
pub mod instance;
pub mod mapping;
pub mod model;
pub mod node;
pub mod path;
pub mod registry;
pub mod serialize;

pub use adapter::{Adapter, FindQuery, HttpAdapter, IdStrategy, MemoryAdapter, Operation};
pub use cache::IdentityCache;
pub use collection::Collection;
pub use config::{MapperConfig, MapperSettings, ModelConfig};
pub use error::{AdapterError, ConfigError, Error, MappingError, PathError, Result};
pub use instance::{Instance, Membership, Owner, SELF_PATH};
pub use mapping::{Mapped, Payload};
pub use model::{LifecycleHooks, MappingRule, Model, ModelType, NoHooks};
pub use node::{Fields, Node};
pub use registry::Registry;
pub use serialize::{IdentitySerializer, KeyFilter, RecordSerializer};
