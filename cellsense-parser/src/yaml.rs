//! Annotated YAML
//!
//! Parses a YAML document held in a [`MappedString`] into a tree of [`AnnotatedNode`]s. Every
//! node records the byte range it covers in the parsed value and carries its plain JSON
//! value, so a validator can check the JSON while diagnostics are located through the tree.
//!
//! Parsing is event driven over `yaml-rust2`'s marked events. The scanner reports character
//! indices; they are converted to byte offsets here so every offset in this crate is a byte
//! offset. Scalars whose end cannot be read off the source directly (block scalars, folded
//! plain scalars) are closed when the next event arrives.
//!
//! Mapping nodes store their components as alternating key, value nodes.

use crate::error::YamlParseError;
use crate::mapped_text::MappedString;
use crate::text::LineIndex;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::fmt;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};

/// One step of a path into a YAML document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    /// Parse a JSON pointer token: all-digit tokens are indices.
    pub fn from_pointer_token(token: &str) -> Self {
        let unescaped = token.replace("~1", "/").replace("~0", "~");
        match unescaped.parse::<usize>() {
            Ok(index) if !unescaped.is_empty() && unescaped.bytes().all(|b| b.is_ascii_digit()) => {
                PathSegment::Index(index)
            }
            _ => PathSegment::Key(unescaped),
        }
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            PathSegment::Key(key) => Some(key),
            PathSegment::Index(_) => None,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Split a JSON pointer (`/a/0/b`) into path segments.
pub fn parse_pointer(pointer: &str) -> Vec<PathSegment> {
    pointer
        .split('/')
        .skip(1)
        .map(PathSegment::from_pointer_token)
        .collect()
}

/// Render path segments as a JSON pointer.
pub fn to_pointer(path: &[PathSegment]) -> String {
    path.iter()
        .map(|segment| {
            format!(
                "/{}",
                segment.to_string().replace('~', "~0").replace('/', "~1")
            )
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Mapping,
    Sequence,
    Scalar,
}

/// A YAML node with its source range and JSON value
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedNode {
    pub start: usize,
    pub end: usize,
    pub kind: NodeKind,
    pub result: Value,
    pub components: Vec<AnnotatedNode>,
}

impl AnnotatedNode {
    fn scalar(start: usize, end: usize, result: Value) -> Self {
        Self {
            start,
            end,
            kind: NodeKind::Scalar,
            result,
            components: Vec::new(),
        }
    }

    /// A null value with no source text (`key:` with nothing after it)
    pub fn is_implicit_null(&self) -> bool {
        self.kind == NodeKind::Scalar && self.start == self.end && self.result.is_null()
    }

    /// Key/value pairs of a mapping node
    pub fn pairs(&self) -> impl Iterator<Item = (&AnnotatedNode, &AnnotatedNode)> {
        let components: &[AnnotatedNode] = if self.kind == NodeKind::Mapping {
            &self.components
        } else {
            &[]
        };
        components.chunks_exact(2).map(|pair| (&pair[0], &pair[1]))
    }

    /// The key text as a string, whatever scalar type it parsed as
    pub fn key_text(&self) -> String {
        match &self.result {
            Value::String(s) => s.clone(),
            Value::Null => "null".to_string(),
            other => other.to_string(),
        }
    }

    /// Walk `path` down the tree. With `return_key`, a final mapping step yields the key
    /// node instead of the value. A scalar reached before the path is exhausted is returned
    /// as is.
    pub fn navigate(&self, path: &[PathSegment], return_key: bool) -> Option<&AnnotatedNode> {
        let Some((head, rest)) = path.split_first() else {
            return Some(self);
        };
        match self.kind {
            NodeKind::Mapping => {
                let wanted = head.to_string();
                let (key, value) = self
                    .pairs()
                    .filter(|(key, _)| key.key_text() == wanted)
                    .last()?;
                if return_key && rest.is_empty() {
                    Some(key)
                } else {
                    value.navigate(rest, return_key)
                }
            }
            NodeKind::Sequence => {
                let index = match head {
                    PathSegment::Index(index) => *index,
                    PathSegment::Key(key) => key.parse().ok()?,
                };
                self.components.get(index)?.navigate(rest, return_key)
            }
            NodeKind::Scalar => Some(self),
        }
    }
}

/// A parsed document together with the text it was parsed from
#[derive(Debug, Clone)]
pub struct AnnotatedYaml {
    pub source: MappedString,
    pub root: AnnotatedNode,
}

impl AnnotatedYaml {
    pub fn value(&self) -> &Value {
        &self.root.result
    }

    pub fn navigate(&self, path: &[PathSegment], return_key: bool) -> Option<&AnnotatedNode> {
        self.root.navigate(path, return_key)
    }
}

/// Parse `source` into an annotated tree. Only the first document of a stream is read;
/// an empty document parses as a zero-length null.
pub fn parse_annotated(source: &MappedString) -> Result<AnnotatedYaml, YamlParseError> {
    let text = source.value();
    let mut builder = TreeBuilder::new(text);
    let mut parser = Parser::new_from_str(text);
    if let Err(err) = parser.load(&mut builder, false) {
        let offset = builder.offsets.byte(err.marker().index());
        let position = LineIndex::new(text).position(offset);
        return Err(YamlParseError {
            message: err.info().to_string(),
            offset,
            line: position.line,
            column: position.column,
        });
    }
    builder.flush_pending(text.len());
    let root = builder
        .root
        .unwrap_or_else(|| AnnotatedNode::scalar(0, 0, Value::Null));
    tracing::trace!(len = text.len(), "parsed annotated yaml");
    Ok(AnnotatedYaml {
        source: source.clone(),
        root,
    })
}

/// Parse a plain string (identity mapping).
pub fn parse_annotated_str(text: &str) -> Result<AnnotatedYaml, YamlParseError> {
    parse_annotated(&MappedString::new(text))
}

/// Character index to byte offset conversion
struct CharOffsets {
    table: Option<Vec<usize>>,
    len: usize,
}

impl CharOffsets {
    fn new(text: &str) -> Self {
        let table = if text.is_ascii() {
            None
        } else {
            Some(text.char_indices().map(|(i, _)| i).collect())
        };
        Self {
            table,
            len: text.len(),
        }
    }

    fn byte(&self, char_index: usize) -> usize {
        match &self.table {
            None => char_index.min(self.len),
            Some(table) => table.get(char_index).copied().unwrap_or(self.len),
        }
    }
}

struct Frame {
    kind: NodeKind,
    start: usize,
    anchor: usize,
    components: Vec<AnnotatedNode>,
}

struct Pending {
    node: AnnotatedNode,
    anchor: usize,
}

struct TreeBuilder<'a> {
    text: &'a str,
    offsets: CharOffsets,
    stack: Vec<Frame>,
    root: Option<AnnotatedNode>,
    pending: Option<Pending>,
    anchors: HashMap<usize, AnnotatedNode>,
}

impl<'a> TreeBuilder<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            offsets: CharOffsets::new(text),
            stack: Vec::new(),
            root: None,
            pending: None,
            anchors: HashMap::new(),
        }
    }

    fn insert(&mut self, node: AnnotatedNode, anchor: usize) {
        if anchor > 0 {
            self.anchors.insert(anchor, node.clone());
        }
        match self.stack.last_mut() {
            Some(frame) => frame.components.push(node),
            None => {
                if self.root.is_none() {
                    self.root = Some(node);
                }
            }
        }
    }

    /// Close a scalar whose end is only known once the following event is seen.
    fn flush_pending(&mut self, next: usize) {
        if let Some(Pending { mut node, anchor }) = self.pending.take() {
            let bytes = self.text.as_bytes();
            let mut end = next.max(node.start);
            while end > node.start && matches!(bytes[end - 1], b' ' | b'\t' | b'\r' | b'\n' | b',') {
                end -= 1;
            }
            node.end = end;
            self.insert(node, anchor);
        }
    }

    fn on_scalar(&mut self, value: String, style: TScalarStyle, anchor: usize, offset: usize) {
        let text = self.text;
        let rest = &text[offset..];
        match style {
            TScalarStyle::Plain => {
                if value == "~" && !rest.starts_with('~') {
                    let start = self.implicit_null_offset(offset);
                    self.insert(AnnotatedNode::scalar(start, start, Value::Null), anchor);
                } else if rest.starts_with(value.as_str()) {
                    let node =
                        AnnotatedNode::scalar(offset, offset + value.len(), resolve_plain(&value));
                    self.insert(node, anchor);
                } else {
                    let node = AnnotatedNode::scalar(offset, offset, resolve_plain(&value));
                    self.pending = Some(Pending { node, anchor });
                }
            }
            TScalarStyle::SingleQuoted | TScalarStyle::DoubleQuoted => {
                let end = offset + quoted_len(rest);
                self.insert(AnnotatedNode::scalar(offset, end, Value::String(value)), anchor);
            }
            _ => {
                let node = AnnotatedNode::scalar(offset, offset, Value::String(value));
                self.pending = Some(Pending { node, anchor });
            }
        }
    }

    /// Where a null with no source text sits: just after the `:` or `-` that introduced it.
    fn implicit_null_offset(&self, mark: usize) -> usize {
        let bytes = self.text.as_bytes();
        if bytes.get(mark) == Some(&b':') {
            return mark + 1;
        }
        let mut offset = mark;
        while offset > 0 && matches!(bytes[offset - 1], b' ' | b'\t' | b'\r' | b'\n') {
            offset -= 1;
        }
        offset
    }

    fn end_collection(&mut self, offset: usize) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let closes_flow = matches!(self.text.as_bytes().get(offset), Some(b'}') | Some(b']'));
        let end = if closes_flow {
            offset + 1
        } else {
            frame
                .components
                .last()
                .map_or(frame.start, |last| last.end.max(frame.start))
        };
        let result = match frame.kind {
            NodeKind::Mapping => {
                let mut map = Map::new();
                for pair in frame.components.chunks_exact(2) {
                    map.insert(pair[0].key_text(), pair[1].result.clone());
                }
                Value::Object(map)
            }
            _ => Value::Array(frame.components.iter().map(|c| c.result.clone()).collect()),
        };
        let node = AnnotatedNode {
            start: frame.start,
            end,
            kind: frame.kind,
            result,
            components: frame.components,
        };
        self.insert(node, frame.anchor);
    }

    fn on_alias(&mut self, id: usize, offset: usize) {
        let name_len = self.text[offset..]
            .char_indices()
            .skip(1)
            .find(|(_, c)| c.is_whitespace() || matches!(c, ',' | ']' | '}'))
            .map_or(self.text.len() - offset, |(i, _)| i);
        let result = self
            .anchors
            .get(&id)
            .map_or(Value::Null, |node| node.result.clone());
        let mut node = self
            .anchors
            .get(&id)
            .cloned()
            .unwrap_or_else(|| AnnotatedNode::scalar(offset, offset, Value::Null));
        node.start = offset;
        node.end = offset + name_len;
        node.result = result;
        node.components.clear();
        self.insert(node, 0);
    }
}

impl MarkedEventReceiver for TreeBuilder<'_> {
    fn on_event(&mut self, ev: Event, mark: Marker) {
        let offset = self.offsets.byte(mark.index());
        self.flush_pending(offset);
        match ev {
            Event::Scalar(value, style, anchor, _) => self.on_scalar(value, style, anchor, offset),
            Event::MappingStart(anchor, _) => self.stack.push(Frame {
                kind: NodeKind::Mapping,
                start: offset,
                anchor,
                components: Vec::new(),
            }),
            Event::SequenceStart(anchor, _) => self.stack.push(Frame {
                kind: NodeKind::Sequence,
                start: offset,
                anchor,
                components: Vec::new(),
            }),
            Event::MappingEnd | Event::SequenceEnd => self.end_collection(offset),
            Event::Alias(id) => self.on_alias(id, offset),
            _ => {}
        }
    }
}

/// Byte length of a quoted scalar starting at the opening quote
fn quoted_len(text: &str) -> usize {
    let mut chars = text.char_indices();
    let Some((_, quote)) = chars.next() else {
        return 0;
    };
    while let Some((i, c)) = chars.next() {
        if quote == '"' && c == '\\' {
            chars.next();
        } else if c == quote {
            if quote == '\'' && text[i + 1..].starts_with('\'') {
                chars.next();
            } else {
                return i + 1;
            }
        }
    }
    text.len()
}

static INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-+]?[0-9]+$").unwrap());
static OCT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0o[0-7]+$").unwrap());
static HEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]+$").unwrap());
static FLOAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-+]?(\.[0-9]+|[0-9]+(\.[0-9]*)?)([eE][-+]?[0-9]+)?$").unwrap()
});

/// Resolve a plain scalar with the YAML 1.2 core schema.
pub fn resolve_plain(text: &str) -> Value {
    match text {
        "" | "~" | "null" | "Null" | "NULL" => return Value::Null,
        "true" | "True" | "TRUE" => return Value::Bool(true),
        "false" | "False" | "FALSE" => return Value::Bool(false),
        _ => {}
    }
    if INT_RE.is_match(text) {
        if let Ok(n) = text.parse::<i64>() {
            return Value::Number(n.into());
        }
    }
    if OCT_RE.is_match(text) {
        if let Ok(n) = i64::from_str_radix(&text[2..], 8) {
            return Value::Number(n.into());
        }
    }
    if HEX_RE.is_match(text) {
        if let Ok(n) = i64::from_str_radix(&text[2..], 16) {
            return Value::Number(n.into());
        }
    }
    if FLOAT_RE.is_match(text) {
        if let Some(n) = text.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(text.to_string())
}
