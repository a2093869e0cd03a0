//! Reading YAML that must match a schema
//!
//! Where the editor path degrades quietly, these calls fail loudly: a document that does
//! not validate produces a [`ValidationFailure`] whose message carries a numbered source
//! excerpt for every diagnostic. A top-level `validate-yaml: false` turns validation off
//! for that document.

use crate::dispatcher::YamlIntelligence;
use crate::error::{AutomationError, ReadYamlError, ValidationFailure};
use cellsense_analysis::{validate_annotated, LocalizedDiagnostic, SchemaRef};
use cellsense_parser::text::{format_line_range, Position};
use cellsense_parser::yaml::parse_annotated;
use cellsense_parser::MappedString;
use serde_json::Value;
use std::path::Path;

impl YamlIntelligence {
    /// Parse `yaml`, validate it against `schema` and return the parsed value.
    pub async fn read_and_validate_yaml_from_mapped_string(
        &self,
        yaml: &MappedString,
        schema: &SchemaRef,
        error_message: &str,
    ) -> Result<Value, ReadYamlError> {
        let schemas = self.schemas().await?;
        let annotation = parse_annotated(yaml)?;
        if !validation_enabled(annotation.value()) {
            tracing::debug!(file = yaml.file_name(), "yaml validation disabled by document");
            return Ok(annotation.value().clone());
        }

        let diagnostics = self
            .queue()
            .with_validator(schema, &schemas.registry, |validator| {
                validate_annotated(validator, &annotation)
            })
            .await??;
        if diagnostics.is_empty() {
            return Ok(annotation.value().clone());
        }

        let reports: Vec<String> = diagnostics
            .iter()
            .map(|diagnostic| format_error_report(diagnostic, yaml))
            .collect();
        for report in &reports {
            tracing::warn!(file = yaml.file_name(), "{}", report);
        }
        let message = std::iter::once(error_message.to_string())
            .chain(reports)
            .collect::<Vec<_>>()
            .join("\n\n");
        Err(ValidationFailure {
            message,
            diagnostics,
        }
        .into())
    }

    /// Read `path` and validate it as [`Self::read_and_validate_yaml_from_mapped_string`]
    /// does. Reports name the file relative to the working directory when possible.
    pub async fn read_and_validate_yaml_from_file(
        &self,
        path: &Path,
        schema: &SchemaRef,
        error_message: &str,
    ) -> Result<Value, ReadYamlError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| AutomationError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let yaml = MappedString::with_file_name(text, short_file_name(path));
        self.read_and_validate_yaml_from_mapped_string(&yaml, schema, error_message)
            .await
    }
}

fn validation_enabled(value: &Value) -> bool {
    !matches!(value.get("validate-yaml"), Some(Value::Bool(false)))
}

fn short_file_name(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

/// A diagnostic followed by the offending lines, numbered, with `^` under the node.
///
/// ```text
/// In file _project.yml
/// (line 2, columns 6--11): Expected field /toc to be `true` or `false`
/// 2: toc: maybe
///         ^^^^^
/// ```
pub fn format_error_report(diagnostic: &LocalizedDiagnostic, source: &MappedString) -> String {
    let value = source.value();
    let mut start = diagnostic.violating_object.start.min(value.len());
    let mut end = diagnostic.violating_object.end.clamp(start, value.len());
    if let Some(node) = value.get(start..end) {
        let trimmed = node.trim();
        if !trimmed.is_empty() {
            start += node.len() - node.trim_start().len();
            end = start + trimmed.len();
        }
    }
    let first = source.position_of(start).unwrap_or(diagnostic.start);
    let last = source
        .position_of(end.saturating_sub(1).max(start))
        .unwrap_or(Position::new(
            diagnostic.end.line,
            diagnostic.end.column.saturating_sub(1),
        ));

    let mut out = Vec::new();
    if let Some(file) = source.file_name() {
        out.push(format!("In file {}", file));
    }
    out.push(diagnostic.message.clone());

    let excerpt = format_line_range(source.original(), first.line, last.line);
    for line in &excerpt.lines {
        out.push(line.content.clone());
        let from = if line.line_number == first.line {
            first.column
        } else {
            line.raw_line.len() - line.raw_line.trim_start().len()
        };
        let to = if line.line_number == last.line {
            last.column + 1
        } else {
            line.raw_line.trim_end().len()
        };
        if to > from {
            out.push(format!(
                "{}{}",
                " ".repeat(excerpt.prefix_width + from),
                "^".repeat(to - from)
            ));
        }
    }
    out.join("\n")
}
