//! Schema navigation
//!
//! Two walks over the IR: by instance path (the keys and indices leading to a value in the
//! document), which may reach several schemas at once through unions, and by the schema path
//! a JSON Schema validator reports, which names exactly one node.

use crate::registry::SchemaRegistry;
use crate::schema::{SchemaKind, SchemaRef};
use cellsense_parser::yaml::PathSegment;
use std::sync::Arc;

/// Every schema reachable from `schema` along `path`.
///
/// Union branches are all followed and their results concatenated. Within an object a key
/// is matched against properties, then pattern properties, then additional properties. A
/// final key that only prefixes some property name (a key still being typed) yields the
/// object itself.
pub fn navigate_schema(
    schema: &SchemaRef,
    path: &[PathSegment],
    registry: &SchemaRegistry,
) -> Vec<SchemaRef> {
    let mut out = Vec::new();
    navigate_into(schema, path, 0, registry, &mut out);
    out
}

fn navigate_into(
    schema: &SchemaRef,
    path: &[PathSegment],
    index: usize,
    registry: &SchemaRegistry,
    out: &mut Vec<SchemaRef>,
) {
    let schema = match registry.resolve(schema) {
        Ok(schema) => schema,
        Err(err) => {
            tracing::debug!(error = %err, "schema navigation stopped at unresolved ref");
            return;
        }
    };
    let Some(segment) = path.get(index) else {
        out.push(schema);
        return;
    };
    match &schema.kind {
        SchemaKind::Object(object) => {
            let Some(key) = segment.as_key() else {
                return;
            };
            if let Some(property) = object.properties.get(key) {
                return navigate_into(property, path, index + 1, registry, out);
            }
            if let Some(property) = object.pattern_property(key) {
                return navigate_into(property, path, index + 1, registry, out);
            }
            if let Some(additional) = &object.additional_properties {
                return navigate_into(additional, path, index + 1, registry, out);
            }
            if index + 1 == path.len() && object.properties.keys().any(|k| k.starts_with(key)) {
                out.push(schema);
            }
        }
        SchemaKind::Array { items: Some(items) } => {
            if matches!(segment, PathSegment::Index(_)) {
                navigate_into(items, path, index + 1, registry, out);
            }
        }
        SchemaKind::AnyOf(branches) | SchemaKind::AllOf(branches) => {
            for branch in branches {
                navigate_into(branch, path, index, registry, out);
            }
        }
        _ => {}
    }
}

/// The node a validator schema path points at. `segments` are the path's tokens in order;
/// callers drop the trailing keyword first so the result is the schema carrying it.
///
/// `$ref` steps into the registered schema of the current `ref` node, `$defs/<name>` jumps
/// to a registered schema directly.
pub fn navigate_schema_path(
    schema: &SchemaRef,
    segments: &[&str],
    registry: &SchemaRegistry,
) -> Option<SchemaRef> {
    let mut current = Arc::clone(schema);
    let mut index = 0;
    while let Some(segment) = segments.get(index) {
        index += 1;
        if matches!(current.kind, SchemaKind::Ref(_)) && !matches!(*segment, "$ref" | "$defs") {
            // Paths reported through a definition may omit the `$ref` step.
            current = registry.resolve(&current).ok()?;
        }
        current = match (*segment, &current.kind) {
            ("$ref", SchemaKind::Ref(_)) => registry.resolve(&current).ok()?,
            ("$defs", _) => {
                let name = segments.get(index)?;
                index += 1;
                registry.get(name)?
            }
            ("properties", SchemaKind::Object(object)) => {
                let name = segments.get(index)?;
                index += 1;
                Arc::clone(object.properties.get(*name)?)
            }
            ("patternProperties", SchemaKind::Object(object)) => {
                let pattern = segments.get(index)?;
                index += 1;
                Arc::clone(object.pattern_properties.get(*pattern)?)
            }
            ("additionalProperties", SchemaKind::Object(object)) => {
                Arc::clone(object.additional_properties.as_ref()?)
            }
            ("propertyNames", SchemaKind::Object(object)) => {
                Arc::clone(object.property_names.as_ref()?)
            }
            ("items", SchemaKind::Array { items: Some(items) }) => Arc::clone(items),
            ("anyOf" | "oneOf", SchemaKind::AnyOf(branches))
            | ("allOf", SchemaKind::AllOf(branches)) => {
                let branch: usize = segments.get(index)?.parse().ok()?;
                index += 1;
                Arc::clone(branches.get(branch)?)
            }
            _ => {
                tracing::trace!(segment, kind = current.type_name(), "schema path left the IR");
                return None;
            }
        };
    }
    Some(current)
}

/// Split a JSON pointer into its unescaped tokens.
pub fn pointer_tokens(pointer: &str) -> Vec<String> {
    if pointer.is_empty() {
        return Vec::new();
    }
    pointer
        .trim_start_matches('/')
        .split('/')
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect()
}
