//! Request context as sent by an editor bridge

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// A whole composite document: front matter, prose, code cells
    Markdown,
    /// A stand-alone YAML file, or a YAML block the caller already isolated
    Yaml,
    /// The text of one code cell, optionally with its `{language}` opening line
    Script,
}

/// What a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationKind {
    Completions,
    Validation,
}

impl fmt::Display for AutomationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutomationKind::Completions => f.write_str("completions"),
            AutomationKind::Validation => f.write_str("validation"),
        }
    }
}

/// Zero-based cursor position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub row: usize,
    pub column: usize,
}

impl CursorPosition {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationContext {
    pub filetype: FileType,
    pub code: String,
    pub position: CursorPosition,
    /// Text of the cursor line up to the cursor
    #[serde(default)]
    pub line: String,
    /// `Some(true)` when the user asked for diagnostics; `Some(false)` hides diagnostics on
    /// the lines the cursor is still editing
    #[serde(default)]
    pub explicit: Option<bool>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    /// Output formats the document targets, used to filter completions
    #[serde(default)]
    pub formats: Vec<String>,
}

impl AutomationContext {
    pub fn new(filetype: FileType, code: impl Into<String>, position: CursorPosition) -> Self {
        Self {
            filetype,
            code: code.into(),
            position,
            line: String::new(),
            explicit: None,
            path: None,
            engine: None,
            language: None,
            formats: Vec::new(),
        }
    }

    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.line = line.into();
        self
    }

    pub fn with_explicit(mut self, explicit: bool) -> Self {
        self.explicit = Some(explicit);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.formats = formats.into_iter().map(Into::into).collect();
        self
    }

    /// Extension of `path`, empty when there is none
    pub fn extension(&self) -> &str {
        self.path
            .as_deref()
            .map(Path::new)
            .and_then(Path::extension)
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
    }
}
