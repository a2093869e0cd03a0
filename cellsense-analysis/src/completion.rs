//! Completion engine
//!
//! Two layers. [`completions`] answers "what can go at this schema path" for a path and a
//! partial word. [`complete_at_cursor`] works out that path and word from YAML still being
//! typed, retrying the parse with characters deleted left of the cursor until something
//! parses, and falling back to indentation when the parse cannot place the cursor.

use crate::navigation::navigate_schema;
use crate::registry::SchemaRegistry;
use crate::schema::{display_value, Completion, SchemaKind, SchemaRef};
use cellsense_config::FormatsConfig;
use cellsense_parser::cursor::{attempt_parses_at_line, locate_cursor, locate_from_indentation};
use cellsense_parser::text::{row_col_to_index, Position};
use cellsense_parser::yaml::PathSegment;
use cellsense_parser::MappedString;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

const MAX_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionKind {
    Key,
    Value,
}

/// One suggestion, with the schema node it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionCandidate {
    #[serde(rename = "type")]
    pub kind: CompletionKind,
    pub display: String,
    /// Text to insert
    pub value: String,
    pub description: String,
    pub documentation: Option<String>,
    /// Ask the client to complete again once this one is accepted
    pub suggest_on_accept: bool,
    /// For keys, the object holding the key; for values, the schema offering the value
    #[serde(skip)]
    pub schema: SchemaRef,
}

impl CompletionCandidate {
    fn value(value: impl Into<String>, schema: &SchemaRef) -> Self {
        let value = value.into();
        Self {
            kind: CompletionKind::Value,
            display: value.clone(),
            value,
            description: String::new(),
            documentation: None,
            suggest_on_accept: false,
            schema: Arc::clone(schema),
        }
    }

    fn key(name: &str, object: &SchemaRef) -> Self {
        Self {
            kind: CompletionKind::Key,
            display: name.to_string(),
            value: format!("{}: ", name),
            description: String::new(),
            documentation: None,
            suggest_on_accept: true,
            schema: Arc::clone(object),
        }
    }

    fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.unwrap_or_default();
        self
    }

    fn with_documentation(mut self, documentation: Option<String>) -> Self {
        self.documentation = documentation;
        self
    }

    fn is_key(&self) -> bool {
        self.kind == CompletionKind::Key
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionResult {
    /// The partial word the completions were filtered by
    pub token: String,
    pub completions: Vec<CompletionCandidate>,
    /// Whether extending `token` can be answered by filtering `completions` again
    pub cacheable: bool,
}

impl CompletionResult {
    /// No completions, and nothing the client may reuse
    pub fn empty() -> Self {
        Self {
            token: String::new(),
            completions: Vec::new(),
            cacheable: false,
        }
    }

    fn cacheable(token: String, completions: Vec<CompletionCandidate>) -> Self {
        Self {
            token,
            completions,
            cacheable: true,
        }
    }

    fn retain_kind(&mut self, kind: CompletionKind) {
        self.completions.retain(|c| c.kind == kind);
    }
}

/// Everything the engine needs for one query
#[derive(Debug, Clone)]
pub struct CompletionContext<'a> {
    pub schema: &'a SchemaRef,
    pub registry: &'a SchemaRegistry,
    /// Keys and indices leading to the cursor's container
    pub path: Vec<PathSegment>,
    pub word: String,
    /// Indentation of the cursor line
    pub indent: usize,
    /// Prefix repeated on continuation lines, e.g. `#| ` inside cell options
    pub comment_prefix: String,
    /// Output formats active for the document
    pub formats: Vec<String>,
    pub formats_config: &'a FormatsConfig,
}

/// Completions for `ctx.path`, filtered by `ctx.word`.
pub fn completions(ctx: &CompletionContext<'_>) -> CompletionResult {
    let registry = ctx.registry;
    let mut path = ctx.path.clone();
    let mut word = ctx.word.clone();

    let mut matching = unique_by_id(navigate_schema(ctx.schema, &path, registry));
    if matching.is_empty() {
        // The last segment may be the word being typed rather than a finished key.
        let Some(last) = path.pop() else {
            return CompletionResult::cacheable(word, Vec::new());
        };
        let candidates = navigate_schema(ctx.schema, &path, registry);
        if candidates.is_empty() {
            return CompletionResult::cacheable(word, Vec::new());
        }
        word = last.to_string();
        matching = unique_by_id(candidates);
    }

    let formats: Vec<String> = ctx
        .formats
        .iter()
        .filter(|f| ctx.formats_config.is_known(f))
        .cloned()
        .collect();
    let under_execute = path.first().and_then(PathSegment::as_key) == Some("execute");

    let mut found = Vec::new();
    for schema in &matching {
        for mut candidate in schema_completions(schema, registry, 0) {
            if drop_for_execute(&candidate, under_execute, registry) {
                continue;
            }
            add_value_snippet(&mut candidate, ctx.indent, &ctx.comment_prefix, registry);
            found.push(candidate);
        }
    }

    found.retain(|c| c.value.starts_with(word.as_str()));
    found.retain(|c| !is_hidden(c, registry));
    if !formats.is_empty() {
        found.retain(|c| matches_formats(c, &formats, ctx.formats_config, registry));
    }
    for candidate in &mut found {
        if candidate.description.is_empty() {
            if let Some(documentation) = &candidate.documentation {
                candidate.description = documentation.clone();
            }
        }
    }
    let mut seen = HashSet::new();
    found.retain(|c| seen.insert(c.value.clone()));

    tracing::trace!(word = %word, count = found.len(), "schema completions");
    CompletionResult::cacheable(word, found)
}

fn unique_by_id(schemas: Vec<SchemaRef>) -> Vec<SchemaRef> {
    let mut seen = HashSet::new();
    schemas
        .into_iter()
        .filter(|schema| match &schema.id {
            Some(id) => seen.insert(id.clone()),
            None => true,
        })
        .collect()
}

/// Completions a schema offers by itself: declared ones if any, else those its shape implies
pub fn schema_completions(
    schema: &SchemaRef,
    registry: &SchemaRegistry,
    depth: usize,
) -> Vec<CompletionCandidate> {
    if depth > MAX_DEPTH {
        return Vec::new();
    }
    let resolved = match registry.resolve(schema) {
        Ok(resolved) => resolved,
        Err(err) => {
            tracing::debug!(error = %err, "no completions from unresolved ref");
            return Vec::new();
        }
    };
    let source = if schema.completions.is_some() {
        schema
    } else {
        &resolved
    };
    let mut out = match &source.completions {
        Some(declared) => declared
            .iter()
            .map(|c| declared_candidate(c, source))
            .collect(),
        None => shape_completions(&resolved, registry, depth),
    };
    out.extend(
        source
            .additional_completions
            .iter()
            .map(|c| declared_candidate(c, source)),
    );
    out
}

fn declared_candidate(completion: &Completion, schema: &SchemaRef) -> CompletionCandidate {
    match completion {
        Completion::Literal(value) => CompletionCandidate::value(value.as_str(), schema),
        Completion::Described {
            value,
            display,
            description,
            suggest_on_accept,
        } => {
            let mut candidate = CompletionCandidate::value(value.as_str(), schema)
                .with_description(description.clone());
            if let Some(display) = display {
                candidate.display = display.clone();
            }
            candidate.suggest_on_accept = suggest_on_accept.unwrap_or(false);
            candidate
        }
    }
}

fn shape_completions(
    schema: &SchemaRef,
    registry: &SchemaRegistry,
    depth: usize,
) -> Vec<CompletionCandidate> {
    let literals = |values: &[&str]| {
        values
            .iter()
            .map(|v| CompletionCandidate::value(*v, schema))
            .collect()
    };
    match &schema.kind {
        SchemaKind::Object(object) => object
            .properties
            .iter()
            .map(|(name, property)| {
                let target = registry
                    .resolve(property)
                    .unwrap_or_else(|_| Arc::clone(property));
                CompletionCandidate::key(name, schema)
                    .with_description(
                        property
                            .field_description()
                            .or_else(|| target.field_description()),
                    )
                    .with_documentation(
                        property
                            .documentation
                            .clone()
                            .or_else(|| target.documentation.clone()),
                    )
            })
            .collect(),
        SchemaKind::Boolean => literals(&["true", "false"]),
        SchemaKind::Null => literals(&["null"]),
        SchemaKind::Enum(values) => values
            .iter()
            .map(|v| CompletionCandidate::value(display_value(v), schema))
            .collect(),
        SchemaKind::Value(value) => vec![CompletionCandidate::value(display_value(value), schema)],
        SchemaKind::Array { items: Some(items) } => schema_completions(items, registry, depth + 1),
        SchemaKind::AnyOf(branches) => match schema.complete_from() {
            Some(("anyOf", index)) => branches
                .get(index)
                .map(|branch| schema_completions(branch, registry, depth + 1))
                .unwrap_or_default(),
            _ => branches
                .iter()
                .flat_map(|branch| schema_completions(branch, registry, depth + 1))
                .collect(),
        },
        SchemaKind::AllOf(branches) => branches
            .iter()
            .flat_map(|branch| schema_completions(branch, registry, depth + 1))
            .collect(),
        _ => Vec::new(),
    }
}

/// Schemas reached by accepting a key completion
fn key_targets(candidate: &CompletionCandidate, registry: &SchemaRegistry) -> Vec<SchemaRef> {
    let key = PathSegment::Key(candidate.display.clone());
    navigate_schema(&candidate.schema, &[key], registry)
}

/// Execute-only keys belong under `execute` and nowhere else.
fn drop_for_execute(
    candidate: &CompletionCandidate,
    under_execute: bool,
    registry: &SchemaRegistry,
) -> bool {
    if !candidate.is_key() {
        return false;
    }
    let targets = key_targets(candidate, registry);
    if targets.is_empty() {
        return false;
    }
    let execute_only = targets.iter().all(|t| t.is_execute_only());
    if under_execute {
        !execute_only
    } else {
        execute_only
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Shape {
    Object,
    Array,
    Scalar,
}

fn accepts(schema: &SchemaRef, shape: Shape, registry: &SchemaRegistry, depth: usize) -> bool {
    if depth > MAX_DEPTH {
        return false;
    }
    let Ok(schema) = registry.resolve(schema) else {
        return false;
    };
    match &schema.kind {
        SchemaKind::Object(_) => shape == Shape::Object,
        SchemaKind::Array { .. } => shape == Shape::Array,
        SchemaKind::AnyOf(branches) => branches
            .iter()
            .any(|b| accepts(b, shape, registry, depth + 1)),
        SchemaKind::AllOf(branches) => branches
            .iter()
            .all(|b| accepts(b, shape, registry, depth + 1)),
        _ => false,
    }
}

/// A value is unambiguous when the schema takes exactly one shape and every array it
/// takes has unambiguous elements.
fn can_suggest_on_accept(schema: &SchemaRef, registry: &SchemaRegistry, depth: usize) -> bool {
    if depth > MAX_DEPTH {
        return false;
    }
    let mut shapes = BTreeSet::new();
    let mut elements = Vec::new();
    collect_shapes(schema, registry, &mut shapes, &mut elements, 0);
    shapes.len() <= 1
        && elements
            .iter()
            .all(|items| can_suggest_on_accept(items, registry, depth + 1))
}

fn collect_shapes(
    schema: &SchemaRef,
    registry: &SchemaRegistry,
    shapes: &mut BTreeSet<Shape>,
    elements: &mut Vec<SchemaRef>,
    depth: usize,
) {
    if depth > MAX_DEPTH {
        return;
    }
    let Ok(schema) = registry.resolve(schema) else {
        shapes.insert(Shape::Scalar);
        return;
    };
    match &schema.kind {
        SchemaKind::Object(_) => {
            shapes.insert(Shape::Object);
        }
        SchemaKind::Array { items } => {
            shapes.insert(Shape::Array);
            elements.extend(items.iter().cloned());
        }
        SchemaKind::AnyOf(branches) | SchemaKind::AllOf(branches) => {
            for branch in branches {
                collect_shapes(branch, registry, shapes, elements, depth + 1);
            }
        }
        _ => {
            shapes.insert(Shape::Scalar);
        }
    }
}

/// Append the start of a nested block to keys whose value is an object or an array.
fn add_value_snippet(
    candidate: &mut CompletionCandidate,
    indent: usize,
    comment_prefix: &str,
    registry: &SchemaRegistry,
) {
    if !candidate.is_key()
        || !candidate.suggest_on_accept
        || !accepts(&candidate.schema, Shape::Object, registry, 0)
    {
        return;
    }
    let targets = key_targets(candidate, registry);
    if !targets
        .iter()
        .all(|t| can_suggest_on_accept(t, registry, 0))
    {
        candidate.suggest_on_accept = false;
        return;
    }
    let snippet = format!("\n{}{}", comment_prefix, " ".repeat(indent + 2));
    if targets.iter().any(|t| accepts(t, Shape::Object, registry, 0)) {
        candidate.value.push_str(&snippet);
    } else if targets.iter().any(|t| accepts(t, Shape::Array, registry, 0)) {
        candidate.value.push_str(&snippet);
        candidate.value.push_str("- ");
    }
}

fn is_hidden(candidate: &CompletionCandidate, registry: &SchemaRegistry) -> bool {
    match candidate.kind {
        CompletionKind::Value => candidate.schema.is_hidden(),
        CompletionKind::Key => {
            let targets = key_targets(candidate, registry);
            !targets.is_empty() && targets.iter().all(|t| t.is_hidden())
        }
    }
}

/// The `formats` tag governing a candidate
fn candidate_formats(candidate: &CompletionCandidate, registry: &SchemaRegistry) -> Option<Vec<String>> {
    match candidate.kind {
        CompletionKind::Value => Some(candidate.schema.formats()),
        CompletionKind::Key => {
            let object = candidate.schema.as_object()?;
            let property = object
                .properties
                .get(&candidate.display)
                .or_else(|| object.pattern_property(&candidate.display))?;
            let own = property.formats();
            if !own.is_empty() {
                return Some(own);
            }
            Some(
                registry
                    .resolve(property)
                    .map(|resolved| resolved.formats())
                    .unwrap_or_default(),
            )
        }
    }
}

fn matches_formats(
    candidate: &CompletionCandidate,
    formats: &[String],
    config: &FormatsConfig,
    registry: &SchemaRegistry,
) -> bool {
    let Some(tags) = candidate_formats(candidate, registry) else {
        return true;
    };
    let enabled: Vec<&str> = tags
        .iter()
        .map(String::as_str)
        .filter(|t| !t.starts_with('!'))
        .collect();
    let mut allowed = if enabled.is_empty() {
        config.all.iter().cloned().collect()
    } else {
        config.expand(&enabled)
    };
    for disabled in tags.iter().filter_map(|t| t.strip_prefix('!')) {
        for format in config.expand(&[disabled]) {
            allowed.remove(&format);
        }
    }
    formats.iter().any(|f| allowed.contains(f))
}

/// The word being typed at the end of `line`. Empty right after a `:` or on a list item.
pub fn partial_word(line: &str) -> String {
    if line.ends_with(':') || line.trim_start().starts_with('-') {
        return String::new();
    }
    line.rsplit(' ').next().unwrap_or_default().to_string()
}

/// A completion query against YAML being edited
#[derive(Debug, Clone)]
pub struct CursorCompletion<'a> {
    pub code: &'a MappedString,
    /// The cursor line up to the cursor
    pub line: &'a str,
    /// Cursor position within `code`
    pub position: Position,
    pub schema: &'a SchemaRef,
    pub registry: &'a SchemaRegistry,
    pub comment_prefix: &'a str,
    pub formats: &'a [String],
    pub formats_config: &'a FormatsConfig,
}

impl<'a> CursorCompletion<'a> {
    fn context(&self, path: Vec<PathSegment>, word: String, indent: usize) -> CompletionContext<'a> {
        CompletionContext {
            schema: self.schema,
            registry: self.registry,
            path,
            word,
            indent,
            comment_prefix: self.comment_prefix.to_string(),
            formats: self.formats.to_vec(),
            formats_config: self.formats_config,
        }
    }
}

/// Completions at the cursor of a YAML document.
///
/// On a blank line only keys are offered. After a `:` only values are offered, and
/// accepting one does not ask for more. On a line without `-` only keys are offered.
pub fn complete_at_cursor(request: &CursorCompletion<'_>) -> CompletionResult {
    let line = request.line;
    let row = request.position.line;
    let column = request.position.column;
    let word = partial_word(line);

    if line.trim().is_empty() {
        let path = locate_from_indentation(request.code.value(), row, line);
        let mut result = completions(&request.context(path, word, line.len()));
        result.retain_kind(CompletionKind::Key);
        return result;
    }

    let indent = line.trim_end().len() - line.trim().len();
    for attempt in attempt_parses_at_line(request.code, row, column) {
        let kept = line.len().saturating_sub(attempt.deletions);
        let before = line.get(..kept).unwrap_or_default();
        if before.trim().is_empty() {
            let path = locate_from_indentation(attempt.code.value(), row, before);
            let mut result = completions(&request.context(path, word, before.len()));
            result.retain_kind(CompletionKind::Key);
            return result;
        }

        let cursor = Position::new(row, column.saturating_sub(attempt.deletions));
        let mut path = row_col_to_index(attempt.code.value(), cursor)
            .and_then(|offset| locate_cursor(&attempt.yaml.root, offset))
            .unwrap_or_else(|| locate_from_indentation(attempt.code.value(), row, before));
        if path.last().map(|segment| segment.to_string()).as_deref() == Some(word.as_str()) {
            path.pop();
        }
        tracing::trace!(deletions = attempt.deletions, ?path, "located completion cursor");

        let mut result = completions(&request.context(path, word, indent));
        if line.contains(':') {
            result.retain_kind(CompletionKind::Value);
            for candidate in &mut result.completions {
                candidate.suggest_on_accept = false;
            }
        } else if !line.contains('-') {
            result.retain_kind(CompletionKind::Key);
        }
        return result;
    }
    CompletionResult::empty()
}
