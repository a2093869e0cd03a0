//! Bundled schema resources
//!
//! The schema data is plain YAML in `schemas/`:
//!
//!   ├── definitions.yml   named schemas, `name: <description>`
//!   ├── document-*.yml    front matter fields
//!   ├── cell-*.yml        code cell option fields
//!   └── project.yml       project configuration fields
//!
//! From those the loader derives three kinds of top-level schema: the front matter schema
//! (every document field, plus an `execute` object holding the fields tagged
//! `execute-only`), the project configuration schema (project and document fields), and
//! one cell options schema per engine. A cell field tagged `engine: knitr` only appears in
//! the knitr schema.

use crate::error::AutomationError;
use cellsense_analysis::description::SchemaDescription;
use cellsense_analysis::fields::{
    object_ref_schema_from_fields, register_field_files, FieldEntry, FieldFile,
};
use cellsense_analysis::{Schema, SchemaError, SchemaKind, SchemaRef, SchemaRegistry};
use cellsense_config::SchemasConfig;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub const ENGINES: [&str; 3] = ["markdown", "knitr", "jupyter"];

const DEFINITIONS: &str = include_str!("../schemas/definitions.yml");

const BUNDLED_FILES: &[(&str, &str)] = &[
    (
        "document-metadata",
        include_str!("../schemas/document-metadata.yml"),
    ),
    (
        "document-layout",
        include_str!("../schemas/document-layout.yml"),
    ),
    (
        "document-execute",
        include_str!("../schemas/document-execute.yml"),
    ),
    (
        "cell-attributes",
        include_str!("../schemas/cell-attributes.yml"),
    ),
    (
        "cell-codeoutput",
        include_str!("../schemas/cell-codeoutput.yml"),
    ),
    ("cell-figure", include_str!("../schemas/cell-figure.yml")),
    ("project", include_str!("../schemas/project.yml")),
];

/// Parsed schema data, before anything is built
#[derive(Debug, Clone, Default)]
pub struct SchemaSources {
    pub definitions: String,
    pub documents: Vec<FieldFile>,
    pub cells: Vec<FieldFile>,
    pub project: Vec<FieldFile>,
}

impl SchemaSources {
    /// The schema data compiled into the crate
    pub fn bundled() -> Result<Self, SchemaError> {
        let mut sources = Self {
            definitions: DEFINITIONS.to_string(),
            ..Self::default()
        };
        for (stem, text) in BUNDLED_FILES {
            sources.add(FieldFile::parse(*stem, text)?);
        }
        Ok(sources)
    }

    /// Read schema data from a directory laid out like the bundled set. Files that match no
    /// known name are ignored.
    pub async fn from_directory(dir: &Path) -> Result<Self, AutomationError> {
        let io_error = |path: &Path| {
            let path = path.display().to_string();
            move |source| AutomationError::Io { path, source }
        };
        let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error(dir))?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error(dir))? {
            paths.push(entry.path());
        }
        paths.sort();

        let mut sources = Self::default();
        for path in paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            if !matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yml" | "yaml")
            ) {
                continue;
            }
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(io_error(&path))?;
            if stem == "definitions" {
                sources.definitions = text;
            } else {
                sources.add(FieldFile::parse(stem, &text)?);
            }
        }
        tracing::debug!(
            dir = %dir.display(),
            documents = sources.documents.len(),
            cells = sources.cells.len(),
            "read schema directory"
        );
        Ok(sources)
    }

    fn add(&mut self, file: FieldFile) {
        if file.stem.starts_with("document-") {
            self.documents.push(file);
        } else if file.stem.starts_with("cell-") {
            self.cells.push(file);
        } else if file.stem.starts_with("project") {
            self.project.push(file);
        } else {
            tracing::debug!(stem = %file.stem, "ignoring schema file with unknown role");
        }
    }
}

/// Every schema the dispatcher needs, built and registered
#[derive(Debug, Clone)]
pub struct SchemaSet {
    pub registry: Arc<SchemaRegistry>,
    pub front_matter: SchemaRef,
    pub project_config: SchemaRef,
    engines: BTreeMap<String, SchemaRef>,
    default_engine: String,
}

impl SchemaSet {
    pub fn build(sources: &SchemaSources, config: &SchemasConfig) -> Result<Self, SchemaError> {
        let mut registry = SchemaRegistry::new();
        register_definitions(&mut registry, &sources.definitions)?;
        registry.build_all()?;

        let documents = register_field_files(&mut registry, &sources.documents)?;
        let cells = register_field_files(&mut registry, &sources.cells)?;
        let project = register_field_files(&mut registry, &sources.project)?;

        let front_matter = registry.register(
            config.front_matter.as_str(),
            front_matter_schema(&documents),
        )?;

        let mut config_entries = project;
        config_entries.extend(documents.iter().cloned());
        let project_config = registry.register(
            config.project_config.as_str(),
            object_ref_schema_from_fields(&config_entries),
        )?;

        let mut engines = BTreeMap::new();
        for engine in ENGINES {
            let entries: Vec<FieldEntry> = cells
                .iter()
                .filter(|entry| match entry.field.tag("engine") {
                    Some(Value::String(only)) => only == engine,
                    _ => true,
                })
                .cloned()
                .collect();
            let schema = registry.register(
                engine_schema_name(engine),
                object_ref_schema_from_fields(&entries),
            )?;
            engines.insert(engine.to_string(), schema);
        }

        registry.verify_refs()?;
        tracing::debug!(
            schemas = registry.len(),
            engines = engines.len(),
            "built schema set"
        );
        Ok(Self {
            registry: Arc::new(registry),
            front_matter,
            project_config,
            engines,
            default_engine: config.default_engine.clone(),
        })
    }

    /// The bundled schemas, configured by `config`
    pub fn bundled(config: &SchemasConfig) -> Result<Self, SchemaError> {
        Self::build(&SchemaSources::bundled()?, config)
    }

    /// The cell options schema for `engine`, falling back to the configured default engine
    /// when `engine` is absent or unknown.
    pub fn engine(&self, engine: Option<&str>) -> Option<&SchemaRef> {
        engine
            .and_then(|name| self.engines.get(name))
            .or_else(|| self.engines.get(&self.default_engine))
    }

    pub fn engines(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    /// A registered schema by name
    pub fn named(&self, name: &str) -> Option<SchemaRef> {
        self.registry.get(name)
    }
}

pub fn engine_schema_name(engine: &str) -> String {
    format!("engine-{}", engine)
}

fn register_definitions(registry: &mut SchemaRegistry, text: &str) -> Result<(), SchemaError> {
    if text.trim().is_empty() {
        return Ok(());
    }
    let mapping: serde_yaml::Mapping =
        serde_yaml::from_str(text).map_err(|source| SchemaError::FieldFile {
            file: "definitions".into(),
            source,
        })?;
    for (name, description) in &mapping {
        let Some(name) = name.as_str() else {
            return Err(SchemaError::UnrecognizedDescription(format!(
                "definition name {:?}",
                name
            )));
        };
        let description = SchemaDescription::from_yaml(description)?;
        registry.register_definition(name, description)?;
    }
    Ok(())
}

fn front_matter_schema(documents: &[FieldEntry]) -> Schema {
    let execute: Vec<FieldEntry> = documents
        .iter()
        .filter(|entry| {
            entry
                .field
                .tag("execute-only")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    let execute = object_ref_schema_from_fields(&execute)
        .with_tag(
            "description",
            Value::String("Code execution options".into()),
        )
        .with_documentation("Code execution options");

    let mut schema = object_ref_schema_from_fields(documents);
    if let SchemaKind::Object(object) = &mut schema.kind {
        object.properties.insert("execute".into(), Arc::new(execute));
    }
    schema
}
