//! Error types for the request layer

use cellsense_analysis::{LocalizeError, LocalizedDiagnostic, SchemaError};
use cellsense_parser::{MappedTextError, YamlParseError};
use thiserror::Error;

/// Anything that stops a completion or lint request from producing a result.
///
/// [`crate::YamlIntelligence::get_completions`] and [`crate::YamlIntelligence::get_lint`]
/// log these and answer `None`; the fallible variants of those calls return them.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Localize(#[from] LocalizeError),
    #[error(transparent)]
    MappedText(#[from] MappedTextError),
    #[error(transparent)]
    Yaml(#[from] YamlParseError),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("schema `{0}` is not loaded")]
    UnknownSchema(String),
    #[error("cannot complete inside a {0} cell")]
    UnsupportedCell(String),
    #[error("reading `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// User YAML that parsed but did not match its schema.
///
/// The message is the caller's heading followed by one report per diagnostic, separated by
/// blank lines.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ValidationFailure {
    pub message: String,
    pub diagnostics: Vec<LocalizedDiagnostic>,
}

/// Failure of [`crate::validated_yaml`] reads
#[derive(Debug, Error)]
pub enum ReadYamlError {
    #[error(transparent)]
    Invalid(#[from] ValidationFailure),
    #[error(transparent)]
    Automation(#[from] AutomationError),
}

impl From<YamlParseError> for ReadYamlError {
    fn from(err: YamlParseError) -> Self {
        ReadYamlError::Automation(err.into())
    }
}

impl From<SchemaError> for ReadYamlError {
    fn from(err: SchemaError) -> Self {
        ReadYamlError::Automation(err.into())
    }
}

impl From<LocalizeError> for ReadYamlError {
    fn from(err: LocalizeError) -> Self {
        ReadYamlError::Automation(err.into())
    }
}
