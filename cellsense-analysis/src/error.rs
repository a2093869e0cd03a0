//! Error types for schema construction and diagnostic localization

use cellsense_parser::{MappedTextError, YamlParseError};
use thiserror::Error;

/// A defect in a schema description. These come from bundled schema data, not from the
/// document being edited, so callers treat them as fatal.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema description is not a recognized form: {0}")]
    UnrecognizedDescription(String),
    #[error("malformed `{key}` schema: {reason}")]
    Malformed { key: &'static str, reason: String },
    #[error("`closed` object schema has no properties")]
    ClosedWithoutProperties,
    #[error("schema `{0}` is not registered")]
    UnknownReference(String),
    #[error("schema `{0}` refers to itself through `resolveRef`")]
    CyclicReference(String),
    #[error("schema `{0}` registered twice with different definitions")]
    ConflictingDefinition(String),
    #[error("invalid regular expression `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("could not compile validator: {0}")]
    Compile(String),
    #[error("reading `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("field file `{file}`: {source}")]
    FieldFile {
        file: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Failure while turning validator output into located diagnostics
#[derive(Debug, Error)]
pub enum LocalizeError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Yaml(#[from] YamlParseError),
    #[error(transparent)]
    MappedText(#[from] MappedTextError),
    #[error("instance path `{0}` does not resolve in the annotated document")]
    UnresolvedInstance(String),
}
