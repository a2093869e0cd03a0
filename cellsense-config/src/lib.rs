//! Shared configuration loader for cellsense.
//!
//! `defaults/cellsense.default.toml` is embedded into every binary so that docs and runtime
//! behavior stay in sync. Applications layer user-specific files on top of those defaults via
//! [`Loader`] before deserializing into [`CellsenseConfig`].

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

const DEFAULT_TOML: &str = include_str!("../defaults/cellsense.default.toml");

/// Top-level configuration consumed by cellsense applications.
#[derive(Debug, Clone, Deserialize)]
pub struct CellsenseConfig {
    pub formats: FormatsConfig,
    pub schemas: SchemasConfig,
    pub logging: LoggingConfig,
}

/// Known output formats and the aliases `formats` tags may refer to.
#[derive(Debug, Clone, Deserialize)]
pub struct FormatsConfig {
    pub all: Vec<String>,
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl FormatsConfig {
    /// Expand format names, following `$alias` references. Unknown aliases expand to
    /// nothing.
    pub fn expand<S: AsRef<str>>(&self, names: &[S]) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        let mut seen = BTreeSet::new();
        let mut queue: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
        while let Some(name) = queue.pop() {
            match name.strip_prefix('$') {
                Some(alias) => {
                    if seen.insert(alias.to_string()) {
                        if let Some(members) = self.aliases.get(alias) {
                            queue.extend(members.iter().cloned());
                        }
                    }
                }
                None => {
                    result.insert(name);
                }
            }
        }
        result
    }

    pub fn is_known(&self, format: &str) -> bool {
        self.all.iter().any(|f| f == format)
    }
}

/// Which schemas the dispatcher applies to which kind of YAML.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemasConfig {
    pub front_matter: String,
    pub project_config: String,
    pub default_engine: String,
    /// Load schema definitions from this directory instead of the bundled set.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
}

/// Helper for layering user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// Start a loader seeded with the embedded defaults.
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a configuration file. Missing files trigger an error.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer an optional configuration file (ignored if the file is absent).
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Apply a single key/value override.
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Finalize the builder and deserialize the resulting configuration.
    pub fn build(self) -> Result<CellsenseConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for callers that only need the defaults.
pub fn load_defaults() -> Result<CellsenseConfig, ConfigError> {
    Loader::new().build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_default_config() {
        let config = load_defaults().expect("defaults to deserialize");
        assert_eq!(config.schemas.front_matter, "front-matter");
        assert_eq!(config.schemas.default_engine, "markdown");
        assert!(config.schemas.directory.is_none());
        assert!(config.formats.is_known("html"));
        assert!(!config.formats.is_known("word"));
        assert_eq!(config.logging.filter, "cellsense=info");
    }

    #[test]
    fn supports_overrides() {
        let config = Loader::new()
            .set_override("schemas.default_engine", "knitr")
            .expect("override to apply")
            .build()
            .expect("config to build");
        assert_eq!(config.schemas.default_engine, "knitr");
    }

    #[test]
    fn expands_nested_aliases() {
        let config = load_defaults().expect("defaults to deserialize");
        let expanded = config.formats.expand(&["$html-files", "pdf"]);
        assert!(expanded.contains("html5"));
        assert!(expanded.contains("revealjs"));
        assert!(expanded.contains("pdf"));
        assert!(!expanded.contains("epub"));
        assert!(config.formats.expand(&["$no-such-alias"]).is_empty());
    }

    #[test]
    fn alias_members_are_known_formats() {
        let config = load_defaults().expect("defaults to deserialize");
        let names: Vec<String> = config.formats.aliases.keys().map(|k| format!("${k}")).collect();
        for format in config.formats.expand(&names) {
            assert!(config.formats.is_known(&format), "{format} is not a known format");
        }
    }
}
