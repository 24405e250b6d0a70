//! Typed error boundaries for configuration and field mapping.

use crate::metadata::UnknownField;
use thiserror::Error;

/// Failure of a single field strategy. Caught by the registry and turned into
/// an empty cell plus a row-report entry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    /// A computed strategy's function failed.
    #[error("computation failed: {0}")]
    Computation(String),

    /// A required metadata value was missing or unparseable.
    #[error("missing input: {0}")]
    MissingInput(String),

    /// A value was present but invalid for the column.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Strategy configuration referenced something that does not exist.
    #[error("strategy misconfigured: {0}")]
    Misconfigured(String),
}

impl MappingError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<UnknownField> for MappingError {
    fn from(e: UnknownField) -> Self {
        Self::Misconfigured(e.to_string())
    }
}

/// Errors raised while loading or saving configuration files.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration root in {0} must be a JSON object")]
    NotAnObject(String),

    #[error("unknown {kind} configuration: {name}")]
    NotFound { kind: &'static str, name: String },
}
