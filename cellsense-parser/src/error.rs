//! Error types for the parser crate

use thiserror::Error;

/// Failures while composing mapped strings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappedTextError {
    #[error("cannot concatenate an empty list of mapped strings")]
    EmptyConcat,
    #[error("mapped strings refer to different original texts")]
    MismatchedOriginals,
    #[error("range {start}..{end} is out of bounds for a value of length {len}")]
    OutOfBounds { start: usize, end: usize, len: usize },
    #[error("range {start}..{end} does not fall on character boundaries")]
    NotCharBoundary { start: usize, end: usize },
}

/// A YAML syntax error, located in the parsed text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at line {line}, column {column}")]
pub struct YamlParseError {
    pub message: String,
    /// Byte offset in the parsed value
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}
