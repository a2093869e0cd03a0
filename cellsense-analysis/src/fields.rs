//! Field-definition files
//!
//! A field file is a YAML list describing the fields of one configuration area:
//!
//! ```yaml
//! - name: echo
//!   schema: boolean
//!   description: Include cell source code in rendered output.
//!   tags:
//!     execute-only: true
//! - name: toc
//!   alias: table-of-contents
//!   schema: boolean
//!   enabled: [$html-doc, pdf]
//!   description:
//!     short: Include a table of contents.
//!     long: Include an automatically generated table of contents.
//! ```
//!
//! Every field is registered under `resource-<file stem>-<name>`.

use crate::builder::SchemaBuilder;
use crate::description::{Documentation, SchemaDescription};
use crate::error::SchemaError;
use crate::registry::SchemaRegistry;
use crate::schema::{ObjectSchema, Schema, SchemaRef};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub schema: serde_yaml::Value,
    #[serde(default)]
    pub description: Option<serde_yaml::Value>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub enabled: Option<Vec<String>>,
    #[serde(default)]
    pub disabled: Option<Vec<String>>,
    #[serde(default)]
    pub tags: BTreeMap<String, Value>,
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
}

impl SchemaField {
    /// The field's own tag value, if any
    pub fn tag(&self, name: &str) -> Option<&Value> {
        self.tags.get(name)
    }
}

/// The fields of one file, named by the file stem
#[derive(Debug, Clone)]
pub struct FieldFile {
    pub stem: String,
    pub fields: Vec<SchemaField>,
}

impl FieldFile {
    pub fn parse(stem: impl Into<String>, text: &str) -> Result<Self, SchemaError> {
        let stem = stem.into();
        let fields = serde_yaml::from_str(text).map_err(|source| SchemaError::FieldFile {
            file: stem.clone(),
            source,
        })?;
        Ok(Self { stem, fields })
    }

    pub fn read(path: &Path) -> Result<Self, SchemaError> {
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::parse(stem, &text)
    }
}

/// A field paired with the id it is registered under
#[derive(Debug, Clone)]
pub struct FieldEntry {
    pub schema_id: String,
    pub field: SchemaField,
}

pub fn field_schema_id(stem: &str, name: &str) -> String {
    format!("resource-{}-{}", stem, name)
}

/// Every field of `files` accepted by `filter`, with its derived id
pub fn schema_fields_from_files<F>(files: &[FieldFile], mut filter: F) -> Vec<FieldEntry>
where
    F: FnMut(&SchemaField, &FieldFile) -> bool,
{
    files
        .iter()
        .flat_map(|file| {
            file.fields
                .iter()
                .filter(|field| filter(field, file))
                .map(|field| FieldEntry {
                    schema_id: field_schema_id(&file.stem, &field.name),
                    field: field.clone(),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Build a field's schema and annotate it with the field's metadata.
pub fn schema_from_field(
    builder: &mut SchemaBuilder<'_>,
    field: &SchemaField,
) -> Result<Schema, SchemaError> {
    let description = SchemaDescription::from_yaml(&field.schema)?;
    let schema = builder.build(&description)?;
    Ok(annotate_from_field(field, schema))
}

fn annotate_from_field(field: &SchemaField, mut schema: Schema) -> Schema {
    if let Some(enabled) = &field.enabled {
        schema.tags.insert("formats".into(), Value::from(enabled.clone()));
    }
    if let Some(disabled) = &field.disabled {
        let negated: Vec<String> = disabled.iter().map(|f| format!("!{}", f)).collect();
        schema.tags.insert("formats".into(), Value::from(negated));
    }
    for (name, value) in &field.tags {
        schema.tags.insert(name.clone(), value.clone());
    }
    if let Some(documentation) = field.description.as_ref().and_then(Documentation::from_yaml) {
        schema.documentation = Some(documentation.short().to_string());
        schema
            .tags
            .insert("description".into(), documentation.to_tag());
    }
    if field.hidden {
        schema.tags.insert("hidden".into(), Value::Bool(true));
    }
    schema
}

/// An object whose properties are the fields themselves. Aliases share the field's schema.
pub fn object_schema_from_fields(
    builder: &mut SchemaBuilder<'_>,
    fields: &[SchemaField],
) -> Result<Schema, SchemaError> {
    let mut object = ObjectSchema::default();
    for field in fields {
        let schema = Arc::new(schema_from_field(builder, field)?);
        if let Some(alias) = &field.alias {
            object.properties.insert(alias.clone(), Arc::clone(&schema));
        }
        object.properties.insert(field.name.clone(), schema);
    }
    Ok(Schema::object(object))
}

/// An object whose properties refer to the registered field schemas
pub fn object_ref_schema_from_fields(entries: &[FieldEntry]) -> Schema {
    let mut object = ObjectSchema::default();
    for entry in entries {
        let reference: SchemaRef = Arc::new(Schema::reference(entry.schema_id.clone()));
        if let Some(alias) = &entry.field.alias {
            object.properties.insert(alias.clone(), Arc::clone(&reference));
        }
        object.properties.insert(entry.field.name.clone(), reference);
    }
    Schema::object(object)
}

/// Build and register every field of `files`.
pub fn register_field_files(
    registry: &mut SchemaRegistry,
    files: &[FieldFile],
) -> Result<Vec<FieldEntry>, SchemaError> {
    let entries = schema_fields_from_files(files, |_, _| true);
    let built = {
        let mut builder = SchemaBuilder::new(registry);
        entries
            .iter()
            .map(|entry| {
                let mut schema = schema_from_field(&mut builder, &entry.field)?;
                schema.id = Some(entry.schema_id.clone());
                Ok((entry.schema_id.clone(), schema))
            })
            .collect::<Result<Vec<_>, SchemaError>>()?
    };
    for (id, schema) in built {
        registry.register(id, schema)?;
    }
    tracing::debug!(files = files.len(), fields = entries.len(), "registered field files");
    Ok(entries)
}
