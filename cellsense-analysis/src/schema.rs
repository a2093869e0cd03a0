//! Schema IR
//!
//! A [`Schema`] is an immutable tree of [`SchemaKind`] variants decorated with editor
//! metadata: a stable id, the phrase used in diagnostics ("be a string"), documentation,
//! completion overrides and a free-form tag map. Children are shared through [`SchemaRef`].
//!
//! Tags the analysis layer reads:
//!
//! - `hidden: true` keeps the schema out of completions
//! - `formats: [..]` limits a field to some output formats, `!fmt` excludes one
//! - `execute-only: true` marks fields that only make sense under `execute`
//! - `complete-from: [anyOf, n]` takes completions from one union branch only
//! - `description` holds the field description as written

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

pub type SchemaRef = Arc<Schema>;

/// Pattern-property regexes, compiled once per pattern text
static COMPILED_PATTERNS: Lazy<RwLock<HashMap<String, Regex>>> = Lazy::new(Default::default);

/// The compiled form of `pattern`, from the cache when it was seen before.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let cached = COMPILED_PATTERNS
        .read()
        .ok()
        .and_then(|patterns| patterns.get(pattern).cloned());
    if let Some(regex) = cached {
        return Ok(regex);
    }
    let regex = Regex::new(pattern)?;
    if let Ok(mut patterns) = COMPILED_PATTERNS.write() {
        patterns.insert(pattern.to_string(), regex.clone());
    }
    Ok(regex)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    /// Accepts anything (`true`)
    Any,
    /// Accepts nothing (`false`)
    Never,
    Null,
    String {
        pattern: Option<String>,
    },
    Number,
    Boolean,
    Enum(Vec<Value>),
    Object(ObjectSchema),
    Array {
        items: Option<SchemaRef>,
    },
    AnyOf(Vec<SchemaRef>),
    AllOf(Vec<SchemaRef>),
    /// A named schema in the registry
    Ref(String),
    /// Exactly one value
    Value(Value),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    pub properties: IndexMap<String, SchemaRef>,
    pub pattern_properties: IndexMap<String, SchemaRef>,
    pub property_names: Option<SchemaRef>,
    /// `Some(Never)` when additional properties are forbidden
    pub additional_properties: Option<SchemaRef>,
    pub required: Vec<String>,
    /// Schemas merged in through `super`
    pub base_schema: Vec<SchemaRef>,
    pub closed: bool,
}

impl ObjectSchema {
    /// The schema of the first pattern property whose regex matches `key`
    pub fn pattern_property(&self, key: &str) -> Option<&SchemaRef> {
        self.pattern_properties.iter().find_map(|(pattern, schema)| {
            compile_pattern(pattern)
                .ok()
                .filter(|regex| regex.is_match(key))
                .map(|_| schema)
        })
    }
}

/// A completion declared on a schema, either a bare value or a described one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Completion {
    Literal(String),
    Described {
        value: String,
        #[serde(default)]
        display: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        suggest_on_accept: Option<bool>,
    },
}

impl Completion {
    pub fn value(&self) -> &str {
        match self {
            Completion::Literal(value) => value,
            Completion::Described { value, .. } => value,
        }
    }
}

impl From<&str> for Completion {
    fn from(value: &str) -> Self {
        Completion::Literal(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub kind: SchemaKind,
    pub id: Option<String>,
    /// Phrase completing "Expected field x to ..."
    pub description: String,
    pub documentation: Option<String>,
    /// Replaces the completions the schema's shape would offer
    pub completions: Option<Vec<Completion>>,
    pub additional_completions: Vec<Completion>,
    pub tags: BTreeMap<String, Value>,
    pub error_message: Option<String>,
}

impl Schema {
    pub fn new(kind: SchemaKind) -> Self {
        let description = describe_kind(&kind);
        Self {
            kind,
            id: None,
            description,
            documentation: None,
            completions: None,
            additional_completions: Vec::new(),
            tags: BTreeMap::new(),
            error_message: None,
        }
    }

    pub fn any() -> Self {
        Self::new(SchemaKind::Any)
    }

    pub fn never() -> Self {
        Self::new(SchemaKind::Never)
    }

    pub fn null() -> Self {
        Self::new(SchemaKind::Null)
    }

    pub fn string() -> Self {
        Self::new(SchemaKind::String { pattern: None })
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self::new(SchemaKind::String {
            pattern: Some(pattern.into()),
        })
    }

    pub fn number() -> Self {
        Self::new(SchemaKind::Number)
    }

    pub fn boolean() -> Self {
        Self::new(SchemaKind::Boolean)
    }

    pub fn enumeration(values: Vec<Value>) -> Self {
        Self::new(SchemaKind::Enum(values))
    }

    pub fn value(value: Value) -> Self {
        Self::new(SchemaKind::Value(value))
    }

    pub fn array(items: Option<Schema>) -> Self {
        Self::new(SchemaKind::Array {
            items: items.map(Arc::new),
        })
    }

    pub fn any_of(schemas: Vec<Schema>) -> Self {
        Self::new(SchemaKind::AnyOf(schemas.into_iter().map(Arc::new).collect()))
    }

    pub fn all_of(schemas: Vec<Schema>) -> Self {
        Self::new(SchemaKind::AllOf(schemas.into_iter().map(Arc::new).collect()))
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(SchemaKind::Ref(name.into()))
    }

    pub fn object(object: ObjectSchema) -> Self {
        Self::new(SchemaKind::Object(object))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: Value) -> Self {
        self.tags.insert(name.into(), value);
        self
    }

    pub fn with_documentation(mut self, documentation: impl Into<String>) -> Self {
        self.documentation = Some(documentation.into());
        self
    }

    pub fn with_completions(mut self, completions: Vec<Completion>) -> Self {
        self.completions = Some(completions);
        self.additional_completions.clear();
        self
    }

    /// Mark the schema hidden. Hidden schemas offer no completions.
    pub fn hidden(mut self) -> Self {
        self.completions = Some(Vec::new());
        self.additional_completions.clear();
        self.tags.insert("hidden".into(), Value::Bool(true));
        self
    }

    pub fn tag(&self, name: &str) -> Option<&Value> {
        self.tags.get(name)
    }

    pub fn is_hidden(&self) -> bool {
        self.tag("hidden").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn is_execute_only(&self) -> bool {
        self.tag("execute-only")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The `formats` tag, `!`-prefixed entries included
    pub fn formats(&self) -> Vec<String> {
        match self.tag("formats") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(single)) => vec![single.clone()],
            _ => Vec::new(),
        }
    }

    /// The `complete-from` tag as `(keyword, index)`
    pub fn complete_from(&self) -> Option<(&str, usize)> {
        let Value::Array(parts) = self.tag("complete-from")? else {
            return None;
        };
        let keyword = parts.first()?.as_str()?;
        let index = parts.get(1)?.as_u64()?;
        Some((keyword, index as usize))
    }

    /// The field description for completion menus: the `description` tag (short form),
    /// else the documentation.
    pub fn field_description(&self) -> Option<String> {
        match self.tag("description") {
            Some(Value::String(text)) => Some(text.clone()),
            Some(Value::Object(map)) => map.get("short").and_then(Value::as_str).map(str::to_string),
            _ => self.documentation.clone(),
        }
    }

    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match &self.kind {
            SchemaKind::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Short name of the variant, used in logs
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            SchemaKind::Any => "true",
            SchemaKind::Never => "false",
            SchemaKind::Null => "null",
            SchemaKind::String { .. } => "string",
            SchemaKind::Number => "number",
            SchemaKind::Boolean => "boolean",
            SchemaKind::Enum(_) => "enum",
            SchemaKind::Object(_) => "object",
            SchemaKind::Array { .. } => "array",
            SchemaKind::AnyOf(_) => "anyOf",
            SchemaKind::AllOf(_) => "allOf",
            SchemaKind::Ref(_) => "ref",
            SchemaKind::Value(_) => "value",
        }
    }
}

/// The default diagnostic phrase for a schema shape
pub fn describe_kind(kind: &SchemaKind) -> String {
    match kind {
        SchemaKind::Any => "be anything".into(),
        SchemaKind::Never => "be no possible value".into(),
        SchemaKind::Null => "be the null value".into(),
        SchemaKind::String { pattern: None } => "be a string".into(),
        SchemaKind::String {
            pattern: Some(pattern),
        } => format!("be a string that satisfies regex \"{}\"", pattern),
        SchemaKind::Number => "be a number".into(),
        SchemaKind::Boolean => "be `true` or `false`".into(),
        SchemaKind::Enum(values) => match values.as_slice() {
            [single] => format!("be '{}'", display_value(single)),
            _ => {
                let listed: Vec<String> = values
                    .iter()
                    .map(|v| format!("`{}`", display_value(v)))
                    .collect();
                format!("be one of: {}", listed.join(", "))
            }
        },
        SchemaKind::Object(_) => "be an object".into(),
        SchemaKind::Array { items: None } => "be an array of values".into(),
        SchemaKind::Array { items: Some(items) } => format!(
            "be an array of values, where each element must {}",
            items.description
        ),
        SchemaKind::AnyOf(schemas) => format!("be at least one of: {}", join_phrases(schemas)),
        SchemaKind::AllOf(schemas) => format!("be all of: {}", join_phrases(schemas)),
        SchemaKind::Ref(name) => format!("be {}", name),
        SchemaKind::Value(value) => format!("be {}", value),
    }
}

fn join_phrases(schemas: &[SchemaRef]) -> String {
    schemas
        .iter()
        .map(|s| s.description.strip_prefix("be ").unwrap_or(&s.description))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Strings without quotes, everything else as JSON
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitive_phrases() {
        assert_eq!(Schema::string().description, "be a string");
        assert_eq!(Schema::number().description, "be a number");
        assert_eq!(Schema::boolean().description, "be `true` or `false`");
        assert_eq!(Schema::null().description, "be the null value");
        assert_eq!(Schema::any().description, "be anything");
        assert_eq!(
            Schema::regex("^a+$").description,
            "be a string that satisfies regex \"^a+$\""
        );
    }

    #[test]
    fn pattern_properties_match_through_the_cache() {
        let mut object = ObjectSchema::default();
        object
            .pattern_properties
            .insert("^x-[a-z]+$".into(), Arc::new(Schema::number()));
        assert_eq!(
            object.pattern_property("x-extra").map(|s| &s.kind),
            Some(&SchemaKind::Number)
        );
        assert!(object.pattern_property("extra").is_none());

        let cached = COMPILED_PATTERNS.read().unwrap();
        assert_eq!(cached.get("^x-[a-z]+$").map(Regex::as_str), Some("^x-[a-z]+$"));
    }

    #[test]
    fn invalid_patterns_are_errors() {
        assert!(compile_pattern("(unclosed").is_err());
        assert!(!COMPILED_PATTERNS.read().unwrap().contains_key("(unclosed"));
    }

    #[test]
    fn enum_phrases() {
        assert_eq!(Schema::enumeration(vec![json!("a")]).description, "be 'a'");
        assert_eq!(
            Schema::enumeration(vec![json!("a"), json!(2)]).description,
            "be one of: `a`, `2`"
        );
    }

    #[test]
    fn compound_phrases() {
        let union = Schema::any_of(vec![Schema::string(), Schema::number()]);
        assert_eq!(union.description, "be at least one of: a string, a number");
        let array = Schema::array(Some(Schema::string()));
        assert_eq!(
            array.description,
            "be an array of values, where each element must be a string"
        );
    }

    #[test]
    fn hidden_clears_completions() {
        let schema = Schema::boolean()
            .with_completions(vec!["yes".into()])
            .hidden();
        assert!(schema.is_hidden());
        assert_eq!(schema.completions, Some(Vec::new()));
    }

    #[test]
    fn tag_accessors() {
        let schema = Schema::string()
            .with_tag("formats", json!(["html", "!pdf"]))
            .with_tag("complete-from", json!(["anyOf", 0]))
            .with_tag("execute-only", json!(true));
        assert_eq!(schema.formats(), vec!["html", "!pdf"]);
        assert_eq!(schema.complete_from(), Some(("anyOf", 0)));
        assert!(schema.is_execute_only());
    }

    #[test]
    fn completions_deserialize_from_strings_and_maps() {
        let parsed: Vec<Completion> =
            serde_json::from_value(json!(["a", {"value": "b", "description": "B"}])).unwrap();
        assert_eq!(parsed[0], Completion::Literal("a".into()));
        assert_eq!(parsed[1].value(), "b");
    }
}
