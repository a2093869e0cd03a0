//! Serializing schema IR as plain JSON Schema
//!
//! Only the structural part of a schema survives: ids, phrases, completions and tags are
//! editor metadata. `ref` nodes become `$ref`s into a `$defs` table holding every registered
//! schema reachable from the root.

use crate::error::SchemaError;
use crate::registry::SchemaRegistry;
use crate::schema::{Schema, SchemaKind};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

/// JSON pointer fragment naming the definition of `name`
pub fn definition_pointer(name: &str) -> String {
    format!("#/$defs/{}", escape_token(name))
}

fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Collects the definitions referenced while writing schemas.
pub struct JsonSchemaWriter<'r> {
    registry: &'r SchemaRegistry,
    referenced: BTreeSet<String>,
}

impl<'r> JsonSchemaWriter<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self {
            registry,
            referenced: BTreeSet::new(),
        }
    }

    pub fn write(&mut self, schema: &Schema) -> Value {
        match &schema.kind {
            SchemaKind::Any => Value::Bool(true),
            SchemaKind::Never => Value::Bool(false),
            SchemaKind::Null => json!({ "type": "null" }),
            SchemaKind::String { pattern: None } => json!({ "type": "string" }),
            SchemaKind::String {
                pattern: Some(pattern),
            } => json!({ "type": "string", "pattern": pattern }),
            SchemaKind::Number => json!({ "type": "number" }),
            SchemaKind::Boolean => json!({ "type": "boolean" }),
            SchemaKind::Enum(values) => json!({ "enum": values }),
            SchemaKind::Value(value) => json!({ "enum": [value] }),
            SchemaKind::Array { items } => {
                let mut out = Map::new();
                out.insert("type".into(), json!("array"));
                if let Some(items) = items {
                    out.insert("items".into(), self.write(items));
                }
                Value::Object(out)
            }
            SchemaKind::AnyOf(branches) => {
                let branches: Vec<Value> = branches.iter().map(|b| self.write(b)).collect();
                json!({ "anyOf": branches })
            }
            SchemaKind::AllOf(branches) => {
                let branches: Vec<Value> = branches.iter().map(|b| self.write(b)).collect();
                json!({ "allOf": branches })
            }
            SchemaKind::Ref(name) => {
                self.referenced.insert(name.clone());
                json!({ "$ref": definition_pointer(name) })
            }
            SchemaKind::Object(object) => {
                let mut out = Map::new();
                out.insert("type".into(), json!("object"));
                if !object.properties.is_empty() {
                    let properties: Map<String, Value> = object
                        .properties
                        .iter()
                        .map(|(name, s)| (name.clone(), self.write(s)))
                        .collect();
                    out.insert("properties".into(), Value::Object(properties));
                }
                if !object.pattern_properties.is_empty() {
                    let patterns: Map<String, Value> = object
                        .pattern_properties
                        .iter()
                        .map(|(pattern, s)| (pattern.clone(), self.write(s)))
                        .collect();
                    out.insert("patternProperties".into(), Value::Object(patterns));
                }
                if let Some(names) = &object.property_names {
                    out.insert("propertyNames".into(), self.write(names));
                }
                if let Some(additional) = &object.additional_properties {
                    out.insert("additionalProperties".into(), self.write(additional));
                }
                if !object.required.is_empty() {
                    out.insert("required".into(), json!(object.required));
                }
                Value::Object(out)
            }
        }
    }

    /// The `$defs` table for every definition referenced so far, transitively.
    pub fn definitions(&mut self) -> Result<Map<String, Value>, SchemaError> {
        let mut defs = Map::new();
        loop {
            let pending: Vec<String> = self
                .referenced
                .iter()
                .filter(|name| !defs.contains_key(name.as_str()))
                .cloned()
                .collect();
            if pending.is_empty() {
                return Ok(defs);
            }
            for name in pending {
                let schema = self
                    .registry
                    .get(&name)
                    .ok_or_else(|| SchemaError::UnknownReference(name.clone()))?;
                let written = self.write(&schema);
                defs.insert(name, written);
            }
        }
    }
}

/// Attach a `$defs` table to a written schema. Boolean schemas never reference anything,
/// so an empty table is all they can receive.
pub fn with_definitions(mut root: Value, defs: &Map<String, Value>) -> Value {
    if defs.is_empty() {
        return root;
    }
    if let Value::Object(map) = &mut root {
        map.insert("$defs".into(), Value::Object(defs.clone()));
    }
    root
}

/// `schema` as a self-contained JSON Schema document
pub fn to_json_schema(schema: &Schema, registry: &SchemaRegistry) -> Result<Value, SchemaError> {
    let mut writer = JsonSchemaWriter::new(registry);
    let root = writer.write(schema);
    let defs = writer.definitions()?;
    Ok(with_definitions(root, &defs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_standalone;
    use crate::description::SchemaDescription;

    fn build(text: &str) -> Schema {
        build_standalone(&SchemaDescription::parse_str(text).unwrap()).unwrap()
    }

    #[test]
    fn record_writes_closed_object() {
        let registry = SchemaRegistry::new();
        let json = to_json_schema(&build("record:\n  baz: number\n  bar: string\n"), &registry)
            .unwrap();
        assert_eq!(
            json,
            json!({
                "type": "object",
                "properties": {
                    "baz": { "type": "number" },
                    "bar": { "type": "string" }
                },
                "propertyNames": { "enum": ["baz", "bar"] },
                "required": ["baz", "bar"]
            })
        );
    }

    #[test]
    fn metadata_is_stripped() {
        let registry = SchemaRegistry::new();
        let schema = build("boolean:\n  description: Flag\n  completions: [yes]\n");
        assert_eq!(
            to_json_schema(&schema, &registry).unwrap(),
            json!({ "type": "boolean" })
        );
    }

    #[test]
    fn refs_pull_in_transitive_definitions() {
        let mut registry = SchemaRegistry::new();
        registry.register("leaf", Schema::number()).unwrap();
        registry
            .register("middle", Schema::array(Some(Schema::reference("leaf"))))
            .unwrap();
        let json = to_json_schema(&Schema::reference("middle"), &registry).unwrap();
        assert_eq!(json["$ref"], json!("#/$defs/middle"));
        assert_eq!(json["$defs"]["middle"]["items"]["$ref"], json!("#/$defs/leaf"));
        assert_eq!(json["$defs"]["leaf"], json!({ "type": "number" }));
    }

    #[test]
    fn unknown_ref_fails() {
        let registry = SchemaRegistry::new();
        assert!(to_json_schema(&Schema::reference("nope"), &registry).is_err());
    }

    #[test]
    fn value_and_boolean_literals() {
        let registry = SchemaRegistry::new();
        assert_eq!(
            to_json_schema(&Schema::value(json!(3)), &registry).unwrap(),
            json!({ "enum": [3] })
        );
        assert_eq!(
            to_json_schema(&Schema::never(), &registry).unwrap(),
            json!(false)
        );
    }
}
