//! Building schema IR from descriptions

use crate::description::{
    AdditionalProperties, BaseProperties, DescriptionForm, ObjectDescription, Required,
    SchemaDescription,
};
use crate::error::SchemaError;
use crate::registry::SchemaRegistry;
use crate::schema::{compile_pattern, ObjectSchema, Schema, SchemaKind, SchemaRef};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Converts [`SchemaDescription`]s into [`Schema`]s.
///
/// `resolveRef` looks names up in the registry: a schema already built there is used as is,
/// a registered raw definition is built on demand and memoized for the lifetime of the
/// builder. `ref` is left symbolic and resolved during navigation and validation.
pub struct SchemaBuilder<'r> {
    registry: &'r SchemaRegistry,
    resolved: HashMap<String, SchemaRef>,
    in_progress: Vec<String>,
}

impl<'r> SchemaBuilder<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self {
            registry,
            resolved: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    pub fn build(&mut self, description: &SchemaDescription) -> Result<Schema, SchemaError> {
        let schema = self.build_form(&description.form)?;
        let schema = apply_base_properties(schema, &description.inner);
        Ok(apply_base_properties(schema, &description.outer))
    }

    /// The registered schema `name`, building its definition when needed
    pub fn resolve(&mut self, name: &str) -> Result<SchemaRef, SchemaError> {
        if let Some(schema) = self.registry.get(name) {
            return Ok(schema);
        }
        if let Some(schema) = self.resolved.get(name) {
            return Ok(Arc::clone(schema));
        }
        let Some(definition) = self.registry.definition(name) else {
            return Err(SchemaError::UnknownReference(name.to_string()));
        };
        if self.in_progress.iter().any(|n| n == name) {
            return Err(SchemaError::CyclicReference(name.to_string()));
        }
        self.in_progress.push(name.to_string());
        let built = self.build(definition);
        self.in_progress.pop();
        let mut schema = built?;
        if schema.id.is_none() {
            schema.id = Some(name.to_string());
        }
        let schema = Arc::new(schema);
        tracing::trace!(name, kind = schema.type_name(), "resolved schema definition");
        self.resolved.insert(name.to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    fn child(&mut self, description: &SchemaDescription) -> Result<SchemaRef, SchemaError> {
        self.build(description).map(Arc::new)
    }

    fn build_form(&mut self, form: &DescriptionForm) -> Result<Schema, SchemaError> {
        let schema = match form {
            DescriptionForm::Value(value) => Schema::value(value.clone()),
            DescriptionForm::AnyOf(branches) => Schema::new(SchemaKind::AnyOf(
                branches
                    .iter()
                    .map(|d| self.child(d))
                    .collect::<Result<_, _>>()?,
            )),
            DescriptionForm::AllOf(branches) => Schema::new(SchemaKind::AllOf(
                branches
                    .iter()
                    .map(|d| self.child(d))
                    .collect::<Result<_, _>>()?,
            )),
            DescriptionForm::Boolean => Schema::boolean(),
            DescriptionForm::Null => Schema::null(),
            DescriptionForm::Number => Schema::number(),
            DescriptionForm::Path => Schema::string(),
            DescriptionForm::ArrayOf(items) => Schema::new(SchemaKind::Array {
                items: Some(self.child(items)?),
            }),
            DescriptionForm::Enum(values) => Schema::enumeration(values.clone()),
            DescriptionForm::MaybeArrayOf(inner) => {
                let inner = self.child(inner)?;
                let array = Arc::new(Schema::new(SchemaKind::Array {
                    items: Some(Arc::clone(&inner)),
                }));
                Schema::new(SchemaKind::AnyOf(vec![inner, array]))
                    .with_tag("complete-from", json!(["anyOf", 0]))
            }
            DescriptionForm::Object(object) => self.build_object(object)?,
            DescriptionForm::Record(fields) => self.build_object(&ObjectDescription {
                properties: fields.clone(),
                pattern_properties: Vec::new(),
                property_names: None,
                additional_properties: None,
                super_schema: None,
                required: Required::All,
                closed: true,
            })?,
            DescriptionForm::Ref(name) => Schema::reference(name.clone()),
            DescriptionForm::ResolveRef(name) => return Ok((*self.resolve(name)?).clone()),
            DescriptionForm::String { pattern: None } => Schema::string(),
            DescriptionForm::String {
                pattern: Some(pattern),
            }
            | DescriptionForm::Pattern(pattern) => {
                check_pattern(pattern)?;
                Schema::regex(pattern.clone())
            }
            DescriptionForm::Schema(inner) => self.build(inner)?,
        };
        Ok(schema)
    }

    fn build_object(&mut self, description: &ObjectDescription) -> Result<Schema, SchemaError> {
        let mut object = ObjectSchema::default();
        for (name, property) in &description.properties {
            object.properties.insert(name.clone(), self.child(property)?);
        }
        for (pattern, property) in &description.pattern_properties {
            check_pattern(pattern)?;
            object
                .pattern_properties
                .insert(pattern.clone(), self.child(property)?);
        }
        object.required = match &description.required {
            Required::None => Vec::new(),
            Required::All => object.properties.keys().cloned().collect(),
            Required::Fields(names) => names.clone(),
        };
        object.additional_properties = match &description.additional_properties {
            None => None,
            Some(AdditionalProperties::Forbidden) => Some(Arc::new(Schema::never())),
            Some(AdditionalProperties::Schema(schema)) => Some(self.child(schema)?),
        };
        if let Some(base) = &description.super_schema {
            let base = self.child(base)?;
            let base = match &base.kind {
                SchemaKind::Ref(name) => self.resolve(name)?,
                _ => base,
            };
            merge_base(&mut object, base);
        }
        object.closed = description.closed;
        object.property_names = match &description.property_names {
            Some(names) => Some(self.child(names)?),
            None if description.closed => {
                if object.properties.is_empty() {
                    return Err(SchemaError::ClosedWithoutProperties);
                }
                let keys = object.properties.keys().cloned().map(Value::String).collect();
                Some(Arc::new(Schema::enumeration(keys)))
            }
            None => None,
        };
        Ok(Schema::object(object))
    }
}

/// Fold a `super` schema into `object`. Properties the object declares itself win.
fn merge_base(object: &mut ObjectSchema, base: SchemaRef) {
    if let Some(parent) = base.as_object() {
        let mut properties = parent.properties.clone();
        for (name, schema) in object.properties.drain(..) {
            properties.insert(name, schema);
        }
        object.properties = properties;

        let mut patterns = parent.pattern_properties.clone();
        for (pattern, schema) in object.pattern_properties.drain(..) {
            patterns.insert(pattern, schema);
        }
        object.pattern_properties = patterns;

        let mut required = parent.required.clone();
        for name in object.required.drain(..) {
            if !required.contains(&name) {
                required.push(name);
            }
        }
        object.required = required;

        if object.additional_properties.is_none() {
            object.additional_properties = parent.additional_properties.clone();
        }
    } else {
        tracing::warn!(kind = base.type_name(), "`super` schema is not an object");
    }
    object.base_schema.push(base);
}

fn check_pattern(pattern: &str) -> Result<(), SchemaError> {
    compile_pattern(pattern)
        .map(|_| ())
        .map_err(|source| SchemaError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Apply the shared decorations in their fixed order.
pub fn apply_base_properties(mut schema: Schema, base: &BaseProperties) -> Schema {
    if let Some(extra) = &base.additional_completions {
        match &mut schema.completions {
            Some(explicit) => explicit.extend(extra.iter().cloned()),
            None => schema.additional_completions.extend(extra.iter().cloned()),
        }
    }
    if let Some(completions) = &base.completions {
        schema = schema.with_completions(completions.clone());
    }
    if let Some(id) = &base.id {
        schema.id = Some(id.clone());
    }
    if base.hidden {
        schema = schema.hidden();
    }
    for (name, value) in &base.tags {
        schema.tags.insert(name.clone(), value.clone());
    }
    if let Some(documentation) = &base.description {
        schema
            .tags
            .insert("description".into(), documentation.to_tag());
        schema.documentation = Some(documentation.short().to_string());
    }
    if let Some(phrase) = &base.error_description {
        schema.description = phrase.clone();
    }
    if let Some(message) = &base.error_message {
        schema.error_message = Some(message.clone());
    }
    schema
}

/// Build a description that uses no `resolveRef`.
pub fn build_standalone(description: &SchemaDescription) -> Result<Schema, SchemaError> {
    let registry = SchemaRegistry::new();
    SchemaBuilder::new(&registry).build(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Completion;
    use rstest::rstest;

    fn build(text: &str) -> Schema {
        build_standalone(&SchemaDescription::parse_str(text).unwrap()).unwrap()
    }

    #[rstest]
    #[case("string", "be a string")]
    #[case("path", "be a string")]
    #[case("number", "be a number")]
    #[case("boolean", "be `true` or `false`")]
    #[case("null", "be the null value")]
    #[case("object", "be an object")]
    #[case("html", "be \"html\"")]
    #[case("\"object\"", "be an object")]
    #[case("ref: date", "be date")]
    #[case("enum: [a, b]", "be one of: `a`, `b`")]
    #[case("pattern: \"^a\"", "be a string that satisfies regex \"^a\"")]
    #[case("string:\n  pattern: \"^b\"", "be a string that satisfies regex \"^b\"")]
    fn phrases_by_form(#[case] text: &str, #[case] phrase: &str) {
        assert_eq!(build(text).description, phrase);
    }

    #[test]
    fn record_is_closed_and_requires_all() {
        let schema = build("record:\n  baz: number\n  bar: string\n");
        let object = schema.as_object().unwrap();
        assert_eq!(object.required, vec!["baz", "bar"]);
        assert!(object.closed);
        let names = object.property_names.as_ref().unwrap();
        assert_eq!(
            names.kind,
            SchemaKind::Enum(vec![json!("baz"), json!("bar")])
        );
    }

    #[test]
    fn closed_object_needs_properties() {
        let description = SchemaDescription::parse_str("object:\n  closed: true\n").unwrap();
        assert!(matches!(
            build_standalone(&description),
            Err(SchemaError::ClosedWithoutProperties)
        ));
    }

    #[test]
    fn maybe_array_of_prefers_first_branch() {
        let schema = build("maybeArrayOf: string");
        let SchemaKind::AnyOf(branches) = &schema.kind else {
            panic!("expected anyOf");
        };
        assert_eq!(branches.len(), 2);
        assert!(matches!(branches[1].kind, SchemaKind::Array { .. }));
        assert_eq!(schema.complete_from(), Some(("anyOf", 0)));
    }

    #[test]
    fn base_properties_apply_inner_then_outer() {
        let schema = build(
            "anyOf:\n  schemas: [string, number]\n  id: inner\n  completions: [x]\nid: outer\nadditionalCompletions: [y]\n",
        );
        assert_eq!(schema.id.as_deref(), Some("outer"));
        assert_eq!(
            schema.completions,
            Some(vec![Completion::from("x"), Completion::from("y")])
        );
    }

    #[test]
    fn error_description_replaces_phrase() {
        let schema = build("string:\n  description: A title\n  errorDescription: be a title\n");
        assert_eq!(schema.description, "be a title");
        assert_eq!(schema.documentation.as_deref(), Some("A title"));
        assert_eq!(schema.tag("description"), Some(&json!("A title")));
    }

    #[test]
    fn hidden_overrides_completions() {
        let schema = build("boolean:\n  completions: [yes]\n  hidden: true\n");
        assert!(schema.is_hidden());
        assert_eq!(schema.completions, Some(Vec::new()));
    }

    #[test]
    fn additional_properties_false_forbids() {
        let schema = build("object:\n  properties:\n    a: string\n  additionalProperties: false\n");
        let object = schema.as_object().unwrap();
        assert_eq!(
            object.additional_properties.as_deref().map(|s| &s.kind),
            Some(&SchemaKind::Never)
        );
    }

    #[test]
    fn building_twice_is_structurally_equal() {
        let text = "object:\n  properties:\n    a:\n      maybeArrayOf: string\n    b:\n      enum: [x, y]\n  required: [a]\n";
        assert_eq!(build(text), build(text));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let description = SchemaDescription::parse_str("pattern: \"(\"").unwrap();
        assert!(matches!(
            build_standalone(&description),
            Err(SchemaError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn invalid_pattern_property_key_is_rejected() {
        let description =
            SchemaDescription::parse_str("object:\n  patternProperties:\n    \"[a-\": number\n")
                .unwrap();
        assert!(matches!(
            build_standalone(&description),
            Err(SchemaError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn resolve_ref_without_registry_fails() {
        let description = SchemaDescription::parse_str("resolveRef: nothing").unwrap();
        assert!(matches!(
            build_standalone(&description),
            Err(SchemaError::UnknownReference(_))
        ));
    }
}
