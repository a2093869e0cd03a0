//! Structural validation
//!
//! [`SchemaValidator`] compiles a schema's JSON Schema form with the `jsonschema` crate and
//! normalizes what it reports into [`ValidatorError`] records. A failing `anyOf` only says
//! that no branch matched, so each such failure is expanded by validating every branch
//! against the same value and appending the branch errors, with their paths rebased onto
//! the union's.

use crate::error::SchemaError;
use crate::json::{with_definitions, JsonSchemaWriter};
use crate::navigation::{navigate_schema_path, pointer_tokens};
use crate::registry::SchemaRegistry;
use crate::schema::{SchemaKind, SchemaRef};
use jsonschema::error::ValidationErrorKind;
use jsonschema::{ValidationError, Validator};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

const MAX_UNION_DEPTH: usize = 16;

/// One raw validation failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatorError {
    /// JSON pointer to the failing value
    pub instance_path: String,
    /// JSON pointer into the schema, ending with the failing keyword
    pub schema_path: String,
    pub keyword: String,
    pub params: Value,
    pub message: String,
}

impl ValidatorError {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }
}

pub struct SchemaValidator {
    schema: SchemaRef,
    registry: Arc<SchemaRegistry>,
    defs: Map<String, Value>,
    validator: Validator,
    branches: HashMap<String, Validator>,
}

impl SchemaValidator {
    pub fn new(schema: SchemaRef, registry: Arc<SchemaRegistry>) -> Result<Self, SchemaError> {
        let mut writer = JsonSchemaWriter::new(&registry);
        let root = writer.write(&schema);
        let defs = writer.definitions()?;
        let validator = compile(&with_definitions(root, &defs))?;
        tracing::debug!(
            schema = schema.id.as_deref().unwrap_or("<anonymous>"),
            definitions = defs.len(),
            "compiled validator"
        );
        Ok(Self {
            schema,
            registry,
            defs,
            validator,
            branches: HashMap::new(),
        })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }

    /// Every failure of `instance`, union failures expanded into their branches
    pub fn validate(&mut self, instance: &Value) -> Vec<ValidatorError> {
        let raw = collect_errors(&self.validator, instance);
        let schema = Arc::clone(&self.schema);
        self.expand(&schema, instance, raw, 0)
    }

    fn expand(
        &mut self,
        schema: &SchemaRef,
        instance: &Value,
        errors: Vec<ValidatorError>,
        depth: usize,
    ) -> Vec<ValidatorError> {
        let mut out = Vec::with_capacity(errors.len());
        for error in errors {
            let is_union = error.keyword == "anyOf";
            let instance_path = error.instance_path.clone();
            let schema_path = error.schema_path.clone();
            out.push(error);
            if !is_union || depth >= MAX_UNION_DEPTH {
                continue;
            }
            let tokens = pointer_tokens(&schema_path);
            let parent: Vec<&str> = tokens[..tokens.len().saturating_sub(1)]
                .iter()
                .map(String::as_str)
                .collect();
            let Some(union) = navigate_schema_path(schema, &parent, &self.registry) else {
                continue;
            };
            let SchemaKind::AnyOf(branches) = &union.kind else {
                continue;
            };
            let Some(value) = instance.pointer(&instance_path) else {
                continue;
            };
            for (index, branch) in branches.iter().enumerate() {
                let branch_errors = match self.validate_branch(branch, value) {
                    Ok(errors) => errors,
                    Err(err) => {
                        tracing::warn!(error = %err, "could not compile union branch");
                        continue;
                    }
                };
                let expanded = self.expand(branch, value, branch_errors, depth + 1);
                out.extend(expanded.into_iter().map(|e| ValidatorError {
                    instance_path: format!("{}{}", instance_path, e.instance_path),
                    schema_path: format!("{}/{}{}", schema_path, index, e.schema_path),
                    ..e
                }));
            }
        }
        out
    }

    fn validate_branch(
        &mut self,
        branch: &SchemaRef,
        value: &Value,
    ) -> Result<Vec<ValidatorError>, SchemaError> {
        let mut writer = JsonSchemaWriter::new(&self.registry);
        let written = writer.write(branch);
        let key = written.to_string();
        if !self.branches.contains_key(&key) {
            let compiled = compile(&with_definitions(written, &self.defs))?;
            self.branches.insert(key.clone(), compiled);
        }
        Ok(self
            .branches
            .get(&key)
            .map(|validator| collect_errors(validator, value))
            .unwrap_or_default())
    }
}

fn compile(json: &Value) -> Result<Validator, SchemaError> {
    jsonschema::validator_for(json).map_err(|e| SchemaError::Compile(e.to_string()))
}

fn collect_errors(validator: &Validator, instance: &Value) -> Vec<ValidatorError> {
    validator
        .iter_errors(instance)
        .flat_map(|error| normalize(&error))
        .collect()
}

/// Flatten one `jsonschema` error into records keyed by the failing keyword
fn normalize(error: &ValidationError<'_>) -> Vec<ValidatorError> {
    let instance_path = error.instance_path.to_string();
    let schema_path = error.schema_path.to_string();
    let message = error.to_string();
    let tokens = pointer_tokens(&schema_path);
    let keyword = tokens.last().cloned().unwrap_or_default();
    // Some failures inside `propertyNames` arrive unwrapped, with the key as the instance.
    let in_property_names = tokens.len() >= 2 && tokens[tokens.len() - 2] == "propertyNames";
    let record = |keyword: String, schema_path: String, mut params: Value| {
        if in_property_names {
            if let (Value::Object(map), Some(name)) = (&mut params, error.instance.as_str()) {
                map.insert("propertyName".into(), json!(name));
            }
        }
        ValidatorError {
            instance_path: instance_path.clone(),
            schema_path,
            keyword,
            params,
            message: message.clone(),
        }
    };
    match &error.kind {
        ValidationErrorKind::AdditionalProperties { unexpected } => unexpected
            .iter()
            .map(|property| {
                record(
                    "additionalProperties".into(),
                    schema_path.clone(),
                    json!({ "additionalProperty": property }),
                )
            })
            .collect(),
        ValidationErrorKind::PropertyNames { error: inner } => {
            let inner_keyword = pointer_tokens(&inner.schema_path.to_string())
                .pop()
                .unwrap_or_else(|| "propertyNames".into());
            let name = inner.instance.as_str().unwrap_or_default().to_string();
            vec![record(
                inner_keyword.clone(),
                format!("{}/{}", schema_path, inner_keyword),
                json!({ "propertyName": name }),
            )]
        }
        ValidationErrorKind::Required { property } => {
            vec![record(keyword, schema_path.clone(), json!({ "missingProperty": property }))]
        }
        ValidationErrorKind::Enum { options } => {
            vec![record(keyword, schema_path.clone(), json!({ "allowedValues": options }))]
        }
        ValidationErrorKind::Pattern { pattern } => {
            vec![record(keyword, schema_path.clone(), json!({ "pattern": pattern }))]
        }
        _ => vec![record(keyword, schema_path.clone(), json!({}))],
    }
}
