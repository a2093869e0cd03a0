//! Declarative schema descriptions
//!
//! Schemas are authored in YAML. A description is either a bare literal (`string`,
//! `number`, `boolean`, `object`, `path`, `null`), any other scalar (a schema accepting
//! exactly that value), or a mapping keyed by one reserved word. When a mapping holds more
//! than one reserved word the first in this order wins:
//!
//! `anyOf`, `allOf`, `boolean`, `arrayOf`, `enum`, `maybeArrayOf`, `null`, `number`,
//! `object`, `path`, `record`, `ref`, `resolveRef`, `string`, `pattern`, `schema`
//!
//! Both the outer mapping and, for most forms, the mapping under the reserved word may carry
//! base properties (`id`, `description`, `completions`, `hidden`, `tags`, ...). Parsing
//! produces a closed [`DescriptionForm`] so the builder can match on it exhaustively.

use crate::error::SchemaError;
use crate::schema::Completion;
use serde_json::Value;
use serde_yaml::{Mapping, Value as Yaml};
use std::collections::BTreeMap;

/// Reserved words in priority order
pub const RESERVED_KEYS: [&str; 16] = [
    "anyOf",
    "allOf",
    "boolean",
    "arrayOf",
    "enum",
    "maybeArrayOf",
    "null",
    "number",
    "object",
    "path",
    "record",
    "ref",
    "resolveRef",
    "string",
    "pattern",
    "schema",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Documentation {
    Short(String),
    Full { short: String, long: String },
}

impl Documentation {
    pub fn short(&self) -> &str {
        match self {
            Documentation::Short(text) => text,
            Documentation::Full { short, .. } => short,
        }
    }

    /// The tag value recorded under `description`
    pub fn to_tag(&self) -> Value {
        match self {
            Documentation::Short(text) => Value::String(text.clone()),
            Documentation::Full { short, long } => {
                serde_json::json!({ "short": short, "long": long })
            }
        }
    }

    pub fn from_yaml(value: &Yaml) -> Option<Self> {
        match value {
            Yaml::String(text) => Some(Documentation::Short(text.clone())),
            Yaml::Mapping(map) => {
                let short = map.get("short").and_then(Yaml::as_str)?.to_string();
                let long = map
                    .get("long")
                    .and_then(Yaml::as_str)
                    .unwrap_or(&short)
                    .to_string();
                Some(Documentation::Full { short, long })
            }
            _ => None,
        }
    }
}

/// Decorations shared by every schema form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseProperties {
    pub additional_completions: Option<Vec<Completion>>,
    pub completions: Option<Vec<Completion>>,
    pub id: Option<String>,
    pub hidden: bool,
    pub tags: BTreeMap<String, Value>,
    pub description: Option<Documentation>,
    pub error_description: Option<String>,
    pub error_message: Option<String>,
}

impl BaseProperties {
    pub fn from_yaml(value: &Yaml) -> Result<Self, SchemaError> {
        let Yaml::Mapping(map) = value else {
            return Ok(Self::default());
        };
        let tags = match map.get("tags") {
            Some(Yaml::Mapping(tags)) => tags
                .iter()
                .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v)))
                .map(|(k, v)| Ok((k, to_json(v, "tags")?)))
                .collect::<Result<_, SchemaError>>()?,
            Some(other) => {
                return Err(malformed("tags", format!("expected a mapping, got {:?}", other)))
            }
            None => BTreeMap::new(),
        };
        Ok(Self {
            additional_completions: completions(map.get("additionalCompletions"))?,
            completions: completions(map.get("completions"))?,
            id: map.get("id").and_then(Yaml::as_str).map(str::to_string),
            hidden: map.get("hidden").and_then(Yaml::as_bool).unwrap_or(false),
            tags,
            description: map.get("description").and_then(Documentation::from_yaml),
            error_description: map
                .get("errorDescription")
                .and_then(Yaml::as_str)
                .map(str::to_string),
            error_message: map
                .get("errorMessage")
                .and_then(Yaml::as_str)
                .map(str::to_string),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdditionalProperties {
    Forbidden,
    Schema(Box<SchemaDescription>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Required {
    None,
    All,
    Fields(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDescription {
    pub properties: Vec<(String, SchemaDescription)>,
    pub pattern_properties: Vec<(String, SchemaDescription)>,
    pub property_names: Option<Box<SchemaDescription>>,
    pub additional_properties: Option<AdditionalProperties>,
    pub super_schema: Option<Box<SchemaDescription>>,
    pub required: Required,
    pub closed: bool,
}

impl ObjectDescription {
    fn empty() -> Self {
        Self {
            properties: Vec::new(),
            pattern_properties: Vec::new(),
            property_names: None,
            additional_properties: None,
            super_schema: None,
            required: Required::None,
            closed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DescriptionForm {
    /// A scalar that is not a primitive literal
    Value(Value),
    AnyOf(Vec<SchemaDescription>),
    AllOf(Vec<SchemaDescription>),
    Boolean,
    ArrayOf(Box<SchemaDescription>),
    Enum(Vec<Value>),
    MaybeArrayOf(Box<SchemaDescription>),
    Null,
    Number,
    Object(ObjectDescription),
    Path,
    /// A closed object requiring every listed property
    Record(Vec<(String, SchemaDescription)>),
    Ref(String),
    ResolveRef(String),
    String { pattern: Option<String> },
    Pattern(String),
    Schema(Box<SchemaDescription>),
}

/// A parsed schema description. `inner` holds the base properties written under the reserved
/// word, `outer` those written next to it; the builder applies `inner` first.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDescription {
    pub form: DescriptionForm,
    pub inner: BaseProperties,
    pub outer: BaseProperties,
}

impl SchemaDescription {
    fn bare(form: DescriptionForm) -> Self {
        Self {
            form,
            inner: BaseProperties::default(),
            outer: BaseProperties::default(),
        }
    }

    pub fn parse_str(text: &str) -> Result<Self, SchemaError> {
        let yaml: Yaml = serde_yaml::from_str(text).map_err(|source| SchemaError::FieldFile {
            file: "<string>".into(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn from_yaml(yaml: &Yaml) -> Result<Self, SchemaError> {
        match yaml {
            Yaml::Null => Ok(Self::bare(DescriptionForm::Null)),
            Yaml::String(text) => Ok(Self::bare(match text.as_str() {
                "object" => DescriptionForm::Object(ObjectDescription::empty()),
                "path" => DescriptionForm::Path,
                "string" => DescriptionForm::String { pattern: None },
                "number" => DescriptionForm::Number,
                "boolean" => DescriptionForm::Boolean,
                _ => DescriptionForm::Value(Value::String(text.clone())),
            })),
            Yaml::Bool(_) | Yaml::Number(_) => {
                Ok(Self::bare(DescriptionForm::Value(to_json(yaml, "value")?)))
            }
            Yaml::Mapping(map) => Self::from_mapping(map),
            Yaml::Tagged(tagged) => Self::from_yaml(&tagged.value),
            Yaml::Sequence(_) => Err(SchemaError::UnrecognizedDescription(format!("{:?}", yaml))),
        }
    }

    fn from_mapping(map: &Mapping) -> Result<Self, SchemaError> {
        let Some(key) = RESERVED_KEYS.iter().copied().find(|k| map.contains_key(*k)) else {
            return Err(SchemaError::UnrecognizedDescription(format!("{:?}", map)));
        };
        let Some(value) = map.get(key) else {
            return Err(SchemaError::UnrecognizedDescription(key.to_string()));
        };
        let outer = BaseProperties::from_yaml(&Yaml::Mapping(map.clone()))?;
        let inner = BaseProperties::from_yaml(value)?;
        let description = match key {
            "anyOf" | "allOf" => {
                let (schemas, nested) = match value {
                    Yaml::Sequence(items) => (items, false),
                    Yaml::Mapping(m) => match m.get("schemas") {
                        Some(Yaml::Sequence(items)) => (items, true),
                        _ => return Err(malformed(key, "expected a list or `schemas`")),
                    },
                    _ => return Err(malformed(key, "expected a list or `schemas`")),
                };
                let schemas = schemas
                    .iter()
                    .map(Self::from_yaml)
                    .collect::<Result<Vec<_>, _>>()?;
                let form = if key == "anyOf" {
                    DescriptionForm::AnyOf(schemas)
                } else {
                    DescriptionForm::AllOf(schemas)
                };
                Self::with(form, nested.then_some(inner), Some(outer))
            }
            "boolean" => Self::with(DescriptionForm::Boolean, Some(inner), None),
            "null" => Self::with(DescriptionForm::Null, Some(inner), None),
            "number" => Self::with(DescriptionForm::Number, Some(inner), None),
            "path" => Self::with(DescriptionForm::Path, Some(inner), None),
            "arrayOf" => match value.get("schema") {
                Some(schema) => Self::with(
                    DescriptionForm::ArrayOf(Box::new(Self::from_yaml(schema)?)),
                    Some(inner),
                    Some(outer),
                ),
                None => Self::with(
                    DescriptionForm::ArrayOf(Box::new(Self::from_yaml(value)?)),
                    None,
                    Some(outer),
                ),
            },
            "maybeArrayOf" => Self::with(
                DescriptionForm::MaybeArrayOf(Box::new(Self::from_yaml(value)?)),
                None,
                Some(outer),
            ),
            "enum" => match value {
                Yaml::Sequence(values) => {
                    Self::with(DescriptionForm::Enum(json_list(values)?), None, Some(outer))
                }
                Yaml::Mapping(m) => match m.get("values") {
                    Some(Yaml::Sequence(values)) => Self::with(
                        DescriptionForm::Enum(json_list(values)?),
                        Some(inner),
                        Some(outer),
                    ),
                    _ => return Err(malformed("enum", "expected a list or `values`")),
                },
                _ => return Err(malformed("enum", "expected a list or `values`")),
            },
            "object" => Self::with(
                DescriptionForm::Object(object_description(value)?),
                Some(inner),
                Some(outer),
            ),
            "record" => match value.get("properties") {
                Some(Yaml::Mapping(properties)) => Self::with(
                    DescriptionForm::Record(described_entries(properties)?),
                    Some(inner),
                    Some(outer),
                ),
                _ => match value {
                    Yaml::Mapping(properties) => Self::with(
                        DescriptionForm::Record(described_entries(properties)?),
                        None,
                        Some(outer),
                    ),
                    _ => return Err(malformed("record", "expected a mapping")),
                },
            },
            "ref" => match value.as_str() {
                Some(name) => Self::with(DescriptionForm::Ref(name.into()), None, Some(outer)),
                None => return Err(malformed("ref", "expected a schema name")),
            },
            "resolveRef" => match value.as_str() {
                Some(name) => Self::with(DescriptionForm::ResolveRef(name.into()), None, None),
                None => return Err(malformed("resolveRef", "expected a schema name")),
            },
            "string" => {
                let pattern = value
                    .get("pattern")
                    .and_then(Yaml::as_str)
                    .map(str::to_string);
                Self::with(DescriptionForm::String { pattern }, Some(inner), Some(outer))
            }
            "pattern" => match value {
                Yaml::String(regex) => {
                    Self::with(DescriptionForm::Pattern(regex.clone()), None, Some(outer))
                }
                Yaml::Mapping(m) => match m.get("regex").and_then(Yaml::as_str) {
                    Some(regex) => Self::with(
                        DescriptionForm::Pattern(regex.to_string()),
                        Some(inner),
                        Some(outer),
                    ),
                    None => return Err(malformed("pattern", "expected a string or `regex`")),
                },
                _ => return Err(malformed("pattern", "expected a string or `regex`")),
            },
            _ => Self::with(
                DescriptionForm::Schema(Box::new(Self::from_yaml(value)?)),
                None,
                Some(outer),
            ),
        };
        Ok(description)
    }

    fn with(form: DescriptionForm, inner: Option<BaseProperties>, outer: Option<BaseProperties>) -> Self {
        Self {
            form,
            inner: inner.unwrap_or_default(),
            outer: outer.unwrap_or_default(),
        }
    }
}

fn object_description(value: &Yaml) -> Result<ObjectDescription, SchemaError> {
    let Yaml::Mapping(map) = value else {
        return Ok(ObjectDescription::empty());
    };
    let entries = |key: &str| -> Result<Vec<(String, SchemaDescription)>, SchemaError> {
        match map.get(key) {
            Some(Yaml::Mapping(m)) => described_entries(m),
            Some(Yaml::Null) | None => Ok(Vec::new()),
            Some(_) => Err(malformed("object", format!("`{}` must be a mapping", key))),
        }
    };
    let additional_properties = match map.get("additionalProperties") {
        None => None,
        Some(Yaml::Bool(false)) => Some(AdditionalProperties::Forbidden),
        Some(other) => Some(AdditionalProperties::Schema(Box::new(
            SchemaDescription::from_yaml(other)?,
        ))),
    };
    let required = match map.get("required") {
        None => Required::None,
        Some(Yaml::String(all)) if all == "all" => Required::All,
        Some(Yaml::Sequence(names)) => Required::Fields(
            names
                .iter()
                .filter_map(Yaml::as_str)
                .map(str::to_string)
                .collect(),
        ),
        Some(_) => return Err(malformed("object", "`required` must be `all` or a list")),
    };
    Ok(ObjectDescription {
        properties: entries("properties")?,
        pattern_properties: entries("patternProperties")?,
        property_names: map
            .get("propertyNames")
            .map(SchemaDescription::from_yaml)
            .transpose()?
            .map(Box::new),
        additional_properties,
        super_schema: map
            .get("super")
            .map(SchemaDescription::from_yaml)
            .transpose()?
            .map(Box::new),
        required,
        closed: map.get("closed").and_then(Yaml::as_bool).unwrap_or(false),
    })
}

fn described_entries(map: &Mapping) -> Result<Vec<(String, SchemaDescription)>, SchemaError> {
    map.iter()
        .map(|(key, value)| {
            let key = match key {
                Yaml::String(k) => k.clone(),
                other => serde_yaml::to_string(other)
                    .map(|s| s.trim().to_string())
                    .map_err(|e| malformed("object", e.to_string()))?,
            };
            Ok((key, SchemaDescription::from_yaml(value)?))
        })
        .collect()
}

fn completions(value: Option<&Yaml>) -> Result<Option<Vec<Completion>>, SchemaError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let Yaml::Sequence(items) = value else {
        return Err(malformed("completions", "expected a list"));
    };
    items
        .iter()
        .map(|item| match item {
            Yaml::Mapping(_) => serde_yaml::from_value(item.clone())
                .map_err(|e| malformed("completions", e.to_string())),
            scalar => {
                let json = to_json(scalar, "completions")?;
                Ok(Completion::Literal(crate::schema::display_value(&json)))
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn json_list(values: &[Yaml]) -> Result<Vec<Value>, SchemaError> {
    values.iter().map(|v| to_json(v, "enum")).collect()
}

fn to_json(value: &Yaml, key: &'static str) -> Result<Value, SchemaError> {
    serde_json::to_value(value).map_err(|e| malformed(key, e.to_string()))
}

fn malformed(key: &'static str, reason: impl Into<String>) -> SchemaError {
    SchemaError::Malformed {
        key,
        reason: reason.into(),
    }
}
