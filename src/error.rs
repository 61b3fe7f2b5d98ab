//! Error handling for the record mapper
//!
//! Each concern gets its own thiserror enum; `Error` rolls them up so callers
//! can propagate everything with `?`.

use thiserror::Error;

/// Main error type for the mapper
#[derive(Error, Debug)]
pub enum Error {
    #[error("Path error: {0}")]
    Path(#[from] PathError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Contract violations raised by `path::assign` and friends
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("empty path")]
    EmptyPath,

    #[error("segment '{segment}' of '{path}' is absent")]
    MissingSegment { path: String, segment: String },

    #[error("segment '{segment}' of '{path}' does not address a container")]
    NotAContainer { path: String, segment: String },

    #[error("index {index} out of bounds (len {len}) in '{path}'")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("only instances can be stored in a collection slot ('{path}')")]
    NotAnInstance { path: String },
}

/// Failures of the mapping engine itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("model '{0}' is already registered")]
    DuplicateModel(String),

    #[error("schema cycle mapping '{model}' at '{path}' (depth {depth})")]
    SchemaCycle {
        model: String,
        path: String,
        depth: usize,
    },

    #[error("expected a single '{model}' record, got an array")]
    UnexpectedCollection { model: String },

    #[error("'{model}' element is detached from its collection at '{path}'")]
    DetachedElement { model: String, path: String },
}

/// Failures reported by an external adapter
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("'{model}' record has no '{id_field}' value")]
    MissingId { model: String, id_field: String },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Configuration loading failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid base url: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, Error>;
