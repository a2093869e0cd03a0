//! Turning validator output into located diagnostics
//!
//! Raw validator output is noisy: one bad value inside a union fails every branch, and a
//! missing key deep in a tree also fails each enclosing union. Pruning keeps the most
//! specific failures:
//!
//! 1. an unexpected property is reported at the property, not the object holding it
//! 2. errors are grouped by instance path
//! 3. a group is dropped when another group's path lies strictly below it
//! 4. in a group holding a union failure, `enum` and `type` errors are dropped, and so is
//!    the union failure itself
//!
//! Each survivor is anchored to its node in the annotated document and phrased with the
//! description of the schema node that rejected it.

use crate::error::LocalizeError;
use crate::navigation::{navigate_schema_path, pointer_tokens};
use crate::registry::SchemaRegistry;
use crate::schema::SchemaRef;
use crate::validator::{SchemaValidator, ValidatorError};
use cellsense_parser::text::Position;
use cellsense_parser::yaml::{AnnotatedNode, AnnotatedYaml, PathSegment};
use indexmap::IndexMap;
use serde::Serialize;

pub const INVALID_PROPERTY: &str = "_custom_invalidProperty";

/// Byte range of the offending node in the validated text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViolatingObject {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalizedDiagnostic {
    pub instance_path: String,
    pub violating_object: ViolatingObject,
    /// The message prefixed with its location
    pub message: String,
    pub message_no_location: String,
    /// First character of the node, in the original file
    pub start: Position,
    /// One past the node's last character, in the original file
    pub end: Position,
    pub error: ValidatorError,
}

impl LocalizedDiagnostic {
    pub fn keyword(&self) -> &str {
        &self.error.keyword
    }
}

/// An error after relabeling, with how to find its node
struct Located {
    error: ValidatorError,
    node_path: Vec<PathSegment>,
    return_key: bool,
    message: Option<String>,
}

fn relabel(mut error: ValidatorError) -> Located {
    let mut node_path: Vec<PathSegment> = pointer_tokens(&error.instance_path)
        .iter()
        .map(|token| PathSegment::from_pointer_token(token))
        .collect();
    if error.keyword == "additionalProperties" {
        if let Some(property) = error.param("additionalProperty").map(str::to_string) {
            error.instance_path = format!("{}/{}", error.instance_path, escape_token(&property));
            error.keyword = INVALID_PROPERTY.into();
            node_path.push(PathSegment::Key(property.clone()));
            return Located {
                error,
                node_path,
                return_key: true,
                message: Some(invalid_property_message(&property)),
            };
        }
    }
    if let Some(property) = error.param("propertyName").map(str::to_string) {
        node_path.push(PathSegment::Key(property.clone()));
        return Located {
            error,
            node_path,
            return_key: true,
            message: Some(invalid_property_message(&property)),
        };
    }
    Located {
        error,
        node_path,
        return_key: false,
        message: None,
    }
}

fn invalid_property_message(property: &str) -> String {
    format!("property {} not allowed in object", property)
}

fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn is_strict_prefix(prefix: &[String], path: &[String]) -> bool {
    prefix.len() < path.len() && path.starts_with(prefix)
}

/// Prune `errors` and anchor the survivors in `annotation`, sorted by position.
pub fn localize_and_prune_errors(
    annotation: &AnnotatedYaml,
    errors: Vec<ValidatorError>,
    schema: &SchemaRef,
    registry: &SchemaRegistry,
) -> Vec<LocalizedDiagnostic> {
    let mut groups: IndexMap<String, Vec<Located>> = IndexMap::new();
    for error in errors {
        let located = relabel(error);
        groups
            .entry(located.error.instance_path.clone())
            .or_default()
            .push(located);
    }

    let paths: Vec<Vec<String>> = groups.keys().map(|p| pointer_tokens(p)).collect();
    let mut diagnostics = Vec::new();
    for (index, (_, group)) in groups.into_iter().enumerate() {
        if paths.iter().any(|other| is_strict_prefix(&paths[index], other)) {
            continue;
        }
        let has_union = group
            .iter()
            .any(|l| matches!(l.error.keyword.as_str(), "anyOf" | "oneOf"));
        for located in group {
            let keyword = located.error.keyword.as_str();
            if has_union && matches!(keyword, "anyOf" | "oneOf" | "enum" | "type") {
                continue;
            }
            diagnostics.push(localize(annotation, located, schema, registry));
        }
    }
    diagnostics.sort_by_key(|d| d.violating_object.start);
    tracing::debug!(count = diagnostics.len(), "localized validation errors");
    diagnostics
}

fn localize(
    annotation: &AnnotatedYaml,
    located: Located,
    schema: &SchemaRef,
    registry: &SchemaRegistry,
) -> LocalizedDiagnostic {
    let node = find_node(&annotation.root, &located.node_path, located.return_key);
    let violating_object = ViolatingObject {
        start: node.start,
        end: node.end,
    };
    let error = located.error;
    let message_no_location = located.message.unwrap_or_else(|| {
        let tokens = pointer_tokens(&error.schema_path);
        let parent: Vec<&str> = tokens[..tokens.len().saturating_sub(1)]
            .iter()
            .map(String::as_str)
            .collect();
        match navigate_schema_path(schema, &parent, registry) {
            Some(target) => target.error_message.clone().unwrap_or_else(|| {
                format!(
                    "Expected field {} to {}",
                    error.instance_path,
                    target.description
                )
            }),
            None => error.message.clone(),
        }
    });
    let source = &annotation.source;
    let start = source.position_of(node.start).unwrap_or_default();
    let end = source.position_of(node.end).unwrap_or(start);
    LocalizedDiagnostic {
        instance_path: error.instance_path.clone(),
        violating_object,
        message: format!("{}: {}", location_string(start, end), message_no_location),
        message_no_location,
        start,
        end,
        error,
    }
}

/// The deepest node along `path`; the root when nothing on the path exists
fn find_node<'a>(root: &'a AnnotatedNode, path: &[PathSegment], return_key: bool) -> &'a AnnotatedNode {
    if let Some(node) = root.navigate(path, return_key) {
        return node;
    }
    (0..path.len())
        .rev()
        .find_map(|len| root.navigate(&path[..len], false))
        .unwrap_or(root)
}

/// `(line 3, columns 5--9)`, or a line-spanning form when start and end differ in line.
/// Lines and columns are shown one-based.
pub fn location_string(start: Position, end: Position) -> String {
    if start.line == end.line {
        format!(
            "(line {}, columns {}--{})",
            start.line + 1,
            start.column + 1,
            end.column + 1
        )
    } else {
        format!(
            "(line {}, column {} through line {}, column {})",
            start.line + 1,
            start.column + 1,
            end.line + 1,
            end.column + 1
        )
    }
}

/// Validate an annotated document and localize whatever fails.
pub fn validate_annotated(
    validator: &mut SchemaValidator,
    annotation: &AnnotatedYaml,
) -> Result<Vec<LocalizedDiagnostic>, LocalizeError> {
    let errors = validator.validate(annotation.value());
    if errors.is_empty() {
        return Ok(Vec::new());
    }
    let schema = validator.schema().clone();
    let registry = validator.registry().clone();
    Ok(localize_and_prune_errors(annotation, errors, &schema, &registry))
}
