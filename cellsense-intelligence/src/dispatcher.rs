//! Request dispatch
//!
//! Every request is reduced to one or more YAML targets: a piece of mapped YAML, the schema
//! it must satisfy, and the cursor expressed in the piece's own rows and columns. A
//! markdown document yields its front matter (against the front matter schema) and the
//! option block of each code cell (against the engine's cell options schema). A script
//! yields its option block. A YAML file is a target as it stands.
//!
//! Completions use the single target under the cursor; lint walks all of them.

use crate::context::{AutomationContext, AutomationKind, FileType};
use crate::error::AutomationError;
use crate::queue::ValidatorQueue;
use crate::resources::{SchemaSet, SchemaSources};
use cellsense_analysis::{
    complete_at_cursor, validate_annotated, CompletionResult, CursorCompletion, LocalizeError,
    LocalizedDiagnostic, SchemaRef,
};
use cellsense_config::CellsenseConfig;
use cellsense_parser::cell_options::{comment_chars, partition_cell_options};
use cellsense_parser::chunk_options::{guess_chunk_options_format, ChunkOptionsFormat};
use cellsense_parser::cursor::{attempt_parses_at_line, yaml_predecessors};
use cellsense_parser::partition::{partition, Cell, CellType};
use cellsense_parser::text::{line_offsets, lines, ranged_lines, Position};
use cellsense_parser::yaml::parse_annotated;
use cellsense_parser::{MappedString, MappedTextError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::OnceCell;

// First line of a script, e.g. "```{python}"
static LANGUAGE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r".*\{([a-z]+)\}").unwrap());

/// A piece of YAML and the schema it is checked against
#[derive(Debug, Clone)]
struct YamlTarget {
    code: MappedString,
    schema: SchemaRef,
    /// Cursor in `code` rows and columns; `None` when the cursor lies outside the target
    cursor: Option<Position>,
    /// Cursor line up to the cursor, comment prefix removed
    line: String,
    comment_prefix: String,
}

/// Completion and lint entry point.
///
/// Schemas are built on first use and kept for the life of the value, as are compiled
/// validators.
pub struct YamlIntelligence {
    config: CellsenseConfig,
    schemas: OnceCell<SchemaSet>,
    queue: ValidatorQueue,
}

impl YamlIntelligence {
    pub fn new(config: CellsenseConfig) -> Self {
        Self {
            config,
            schemas: OnceCell::new(),
            queue: ValidatorQueue::new(),
        }
    }

    /// An instance configured by the built-in defaults
    pub fn with_defaults() -> Result<Self, AutomationError> {
        Ok(Self::new(cellsense_config::load_defaults()?))
    }

    /// Use an already built schema set instead of loading one.
    pub fn with_schemas(config: CellsenseConfig, schemas: SchemaSet) -> Self {
        Self {
            config,
            schemas: OnceCell::new_with(Some(schemas)),
            queue: ValidatorQueue::new(),
        }
    }

    pub fn config(&self) -> &CellsenseConfig {
        &self.config
    }

    pub fn queue(&self) -> &ValidatorQueue {
        &self.queue
    }

    /// The schema set, loaded from the configured directory or the bundled data.
    pub async fn schemas(&self) -> Result<&SchemaSet, AutomationError> {
        self.schemas
            .get_or_try_init(|| async {
                let sources = match &self.config.schemas.directory {
                    Some(dir) => SchemaSources::from_directory(dir).await?,
                    None => SchemaSources::bundled()?,
                };
                let set = SchemaSet::build(&sources, &self.config.schemas)?;
                tracing::info!(schemas = set.registry.len(), "loaded schemas");
                Ok::<_, AutomationError>(set)
            })
            .await
    }

    /// Load the schemas and compile the validators of every top-level schema, so the first
    /// request does not pay for it.
    pub async fn warm_up(&self) -> Result<(), AutomationError> {
        let schemas = self.schemas().await?;
        let mut top_level = vec![
            Arc::clone(&schemas.front_matter),
            Arc::clone(&schemas.project_config),
        ];
        top_level.extend(
            schemas
                .engines()
                .filter_map(|engine| schemas.engine(Some(engine)).cloned()),
        );
        for schema in &top_level {
            self.queue
                .with_validator(schema, &schemas.registry, |_| ())
                .await?;
        }
        tracing::debug!(validators = top_level.len(), "warmed up validators");
        Ok(())
    }

    /// Completions at the cursor. Failures are logged and answered with `None`.
    pub async fn get_completions(&self, context: &AutomationContext) -> Option<CompletionResult> {
        match self.completions(context).await {
            Ok(result) => Some(result),
            Err(err) => {
                log_failure(AutomationKind::Completions, context, &err);
                None
            }
        }
    }

    /// Diagnostics for the whole document. Failures are logged and answered with `None`.
    pub async fn get_lint(&self, context: &AutomationContext) -> Option<Vec<LocalizedDiagnostic>> {
        match self.lint(context).await {
            Ok(diagnostics) => Some(diagnostics),
            Err(err) => {
                log_failure(AutomationKind::Validation, context, &err);
                None
            }
        }
    }

    pub async fn completions(
        &self,
        context: &AutomationContext,
    ) -> Result<CompletionResult, AutomationError> {
        let schemas = self.schemas().await?;
        let document = document_text(context);
        let cursor = Position::new(context.position.row, context.position.column);

        let target = match context.filetype {
            FileType::Yaml => Some(yaml_file_target(schemas, context, document, Some(cursor))),
            FileType::Script => script_target(
                schemas,
                context,
                &document,
                context.language.as_deref(),
                Some(cursor),
            )?,
            FileType::Markdown => {
                let cells = partition(&document)?;
                let Some(cell) = cells.cell_at_line(cursor.line) else {
                    return Ok(CompletionResult::empty());
                };
                let cursor = rebase(Some(cursor), cell.start_line());
                match &cell.cell_type {
                    CellType::Raw => Some(front_matter_target(schemas, context, cell, cursor)),
                    CellType::Markdown => None,
                    CellType::Math => {
                        return Err(AutomationError::UnsupportedCell(cell.cell_type.to_string()))
                    }
                    CellType::Code { language } => {
                        let code = cell_code(&document, cell)?;
                        script_target(schemas, context, &code, Some(language), cursor)?
                    }
                }
            }
        };

        match target {
            Some(target) => self.complete_target(schemas, context, target),
            None => Ok(CompletionResult::empty()),
        }
    }

    pub async fn lint(
        &self,
        context: &AutomationContext,
    ) -> Result<Vec<LocalizedDiagnostic>, AutomationError> {
        let schemas = self.schemas().await?;
        let document = document_text(context);
        let cursor = Some(Position::new(
            context.position.row,
            context.position.column,
        ));

        let targets = match context.filetype {
            FileType::Yaml => vec![yaml_file_target(schemas, context, document, cursor)],
            FileType::Script => {
                script_target(schemas, context, &document, context.language.as_deref(), cursor)?
                    .into_iter()
                    .collect()
            }
            FileType::Markdown => {
                let cells = partition(&document)?;
                let mut targets = Vec::new();
                for cell in &cells.cells {
                    let cursor = rebase(cursor, cell.start_line());
                    match &cell.cell_type {
                        CellType::Raw => {
                            targets.push(front_matter_target(schemas, context, cell, cursor))
                        }
                        CellType::Code { language } => {
                            let code = cell_code(&document, cell)?;
                            targets.extend(script_target(
                                schemas,
                                context,
                                &code,
                                Some(language),
                                cursor,
                            )?);
                        }
                        CellType::Markdown | CellType::Math => {}
                    }
                }
                targets
            }
        };

        let mut diagnostics = Vec::new();
        for target in targets {
            diagnostics.extend(self.validate_target(schemas, context, target).await?);
        }
        tracing::debug!(
            filetype = ?context.filetype,
            diagnostics = diagnostics.len(),
            "linted document"
        );
        Ok(diagnostics)
    }

    fn complete_target(
        &self,
        schemas: &SchemaSet,
        context: &AutomationContext,
        target: YamlTarget,
    ) -> Result<CompletionResult, AutomationError> {
        let Some(cursor) = target.cursor else {
            return Ok(CompletionResult::empty());
        };
        if position_in_ticks(target.code.value(), cursor.line) {
            return Ok(CompletionResult::empty());
        }
        let code = trim_ticks(&target.code)?;
        if guess_chunk_options_format(code.value()) == ChunkOptionsFormat::Knitr {
            return Ok(CompletionResult::empty());
        }
        Ok(complete_at_cursor(&CursorCompletion {
            code: &code,
            line: &target.line,
            position: cursor,
            schema: &target.schema,
            registry: &schemas.registry,
            comment_prefix: &target.comment_prefix,
            formats: &context.formats,
            formats_config: &self.config.formats,
        }))
    }

    async fn validate_target(
        &self,
        schemas: &SchemaSet,
        context: &AutomationContext,
        target: YamlTarget,
    ) -> Result<Vec<LocalizedDiagnostic>, AutomationError> {
        let code = trim_ticks(&target.code)?;
        if code.value().trim().is_empty()
            || guess_chunk_options_format(code.value()) == ChunkOptionsFormat::Knitr
        {
            return Ok(Vec::new());
        }

        let cursor = target.cursor;
        let diagnostics = self
            .queue
            .with_validator(&target.schema, &schemas.registry, |validator| {
                let annotation = match cursor {
                    Some(cursor) => attempt_parses_at_line(&code, cursor.line, cursor.column)
                        .next()
                        .map(|attempt| attempt.yaml),
                    None => parse_annotated(&code).ok(),
                };
                match annotation {
                    Some(annotation) => validate_annotated(validator, &annotation),
                    None => Ok::<_, LocalizeError>(Vec::new()),
                }
            })
            .await??;

        if context.explicit != Some(false) {
            return Ok(diagnostics);
        }
        let Some(cursor) = cursor else {
            return Ok(diagnostics);
        };
        let predecessors = predecessor_lines(&code, cursor.line);
        Ok(diagnostics
            .into_iter()
            .filter(|diagnostic| !predecessors.contains(&diagnostic.start.line))
            .collect())
    }
}

fn log_failure(kind: AutomationKind, context: &AutomationContext, err: &AutomationError) {
    let request = serde_json::to_string(context).unwrap_or_default();
    tracing::error!(%kind, error = %err, %request, "request degraded to no result");
}

fn document_text(context: &AutomationContext) -> MappedString {
    match &context.path {
        Some(path) => MappedString::with_file_name(context.code.clone(), path.clone()),
        None => MappedString::new(context.code.clone()),
    }
}

fn rebase(cursor: Option<Position>, start_line: usize) -> Option<Position> {
    cursor.and_then(|cursor| {
        Some(Position::new(
            cursor.line.checked_sub(start_line)?,
            cursor.column,
        ))
    })
}

/// `.qmd` files given as YAML are front matter; any other YAML is project configuration.
fn yaml_file_target(
    schemas: &SchemaSet,
    context: &AutomationContext,
    code: MappedString,
    cursor: Option<Position>,
) -> YamlTarget {
    let schema = if context.extension() == "qmd" {
        &schemas.front_matter
    } else {
        &schemas.project_config
    };
    YamlTarget {
        code,
        schema: Arc::clone(schema),
        cursor,
        line: context.line.clone(),
        comment_prefix: String::new(),
    }
}

fn front_matter_target(
    schemas: &SchemaSet,
    context: &AutomationContext,
    cell: &Cell,
    cursor: Option<Position>,
) -> YamlTarget {
    YamlTarget {
        code: cell.source.clone(),
        schema: Arc::clone(&schemas.front_matter),
        cursor,
        line: context.line.clone(),
        comment_prefix: String::new(),
    }
}

/// The lines between a code cell's fences, option lines included.
fn cell_code(document: &MappedString, cell: &Cell) -> Result<MappedString, MappedTextError> {
    let lines = ranged_lines(document.value());
    let first = lines.get(cell.line_range.start);
    let last = cell
        .line_range
        .end
        .checked_sub(1)
        .and_then(|index| lines.get(index));
    match (first, last) {
        (Some(first), Some(last)) => document.slice(first.range.start..last.range.end),
        _ => Ok(cell.source.clone()),
    }
}

/// The option block of a script. Without a known language the first line must name one,
/// as in "```{r}".
fn script_target(
    schemas: &SchemaSet,
    context: &AutomationContext,
    code: &MappedString,
    language: Option<&str>,
    cursor: Option<Position>,
) -> Result<Option<YamlTarget>, AutomationError> {
    let code_lines = ranged_lines(code.value());
    let (language, code_start_line) = match language {
        Some(language) => (language.to_string(), 0),
        None => {
            if code_lines.len() < 2 {
                return Ok(None);
            }
            let Some(captures) = LANGUAGE_LINE.captures(code_lines[0].text) else {
                return Ok(None);
            };
            (captures[1].to_string(), 1)
        }
    };
    let (Some(first), Some(last)) = (code_lines.get(code_start_line), code_lines.last()) else {
        return Ok(None);
    };
    let body = code.slice(first.range.start..last.range.end)?;
    let options = partition_cell_options(&language, &body)?;
    let Some(yaml) = options.yaml else {
        return Ok(None);
    };

    let schema = schemas
        .engine(context.engine.as_deref())
        .ok_or_else(|| AutomationError::UnknownSchema(context.engine.clone().unwrap_or_default()))?;
    let comment_prefix = comment_chars(&language).option_prefix();
    let option_count = options.option_lines.len();
    let cursor = cursor.and_then(|cursor| {
        let row = cursor.line.checked_sub(code_start_line)?;
        (row < option_count).then(|| {
            Position::new(row, cursor.column.saturating_sub(comment_prefix.len()))
        })
    });
    let line = context
        .line
        .get(comment_prefix.len()..)
        .unwrap_or_default()
        .to_string();
    tracing::trace!(%language, options = option_count, "extracted cell options");
    Ok(Some(YamlTarget {
        code: yaml,
        schema: Arc::clone(schema),
        cursor,
        line,
        comment_prefix,
    }))
}

/// Whether `row` is an opening or closing `---` line of `code`
fn position_in_ticks(code: &str, row: usize) -> bool {
    let trimmed = code.trim_end();
    (code.starts_with("---") && row == 0)
        || (trimmed.ends_with("---") && row + 1 == lines(trimmed).len())
}

/// Drop `---` delimiters at either end. Line breaks are kept, so rows do not move.
fn trim_ticks(code: &MappedString) -> Result<MappedString, MappedTextError> {
    let mut code = code.clone();
    if code.value().starts_with("---") {
        code = code.slice(3..code.len())?;
    }
    if code.value().trim_end().ends_with("---") {
        if let Some(end) = code.value().rfind("---") {
            code = code.slice(0..end)?;
        }
    }
    Ok(code)
}

/// Original-file lines of the cursor row and its structural ancestors in `code`
fn predecessor_lines(code: &MappedString, row: usize) -> Vec<usize> {
    let offsets = line_offsets(code.value());
    yaml_predecessors(code.value(), row)
        .into_iter()
        .filter_map(|line| offsets.get(line))
        .filter_map(|offset| code.position_of(*offset))
        .map(|position| position.line)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("---\ntitle: x\n---\n", 0, true)]
    #[case("---\ntitle: x\n---\n", 1, false)]
    #[case("---\ntitle: x\n---\n", 2, true)]
    #[case("---\ntitle: x\n---", 2, true)]
    #[case("title: x\n", 0, false)]
    #[case("", 0, false)]
    fn delimiter_rows(#[case] code: &str, #[case] row: usize, #[case] expected: bool) {
        assert_eq!(position_in_ticks(code, row), expected);
    }

    #[test]
    fn trimming_ticks_keeps_rows() {
        let code = MappedString::new("---\ntitle: x\ntoc: true\n---\n");
        let trimmed = trim_ticks(&code).unwrap();
        assert_eq!(trimmed.value(), "\ntitle: x\ntoc: true\n");
        assert_eq!(lines(trimmed.value())[2], "toc: true");

        let bare = MappedString::new("title: x\n");
        assert_eq!(trim_ticks(&bare).unwrap().value(), "title: x\n");
    }

    #[test]
    fn predecessors_map_to_original_lines() {
        let document = MappedString::new("---\na:\n  b:\n    c: 1\n---\n");
        let code = trim_ticks(&document).unwrap();
        let mut found = predecessor_lines(&code, 3);
        found.sort_unstable();
        assert_eq!(found, vec![1, 2, 3]);
    }

    #[test]
    fn cursor_rebase_stops_above_the_cell() {
        assert_eq!(
            rebase(Some(Position::new(5, 2)), 3),
            Some(Position::new(2, 2))
        );
        assert_eq!(rebase(Some(Position::new(1, 0)), 3), None);
        assert_eq!(rebase(None, 0), None);
    }

    #[test]
    fn cell_code_spans_the_fenced_lines() {
        let document = MappedString::new("text\n\n```{ojs}\n//| echo: false\nx = 1\n```\n");
        let cells = partition(&document).unwrap();
        let cell = cells
            .cells
            .iter()
            .find(|cell| cell.cell_type.language() == Some("ojs"))
            .unwrap();
        let code = cell_code(&document, cell).unwrap();
        assert_eq!(code.value(), "//| echo: false\nx = 1");
    }

    #[test]
    fn language_line_names_the_language() {
        let captures = LANGUAGE_LINE.captures("```{python}").unwrap();
        assert_eq!(&captures[1], "python");
        assert!(LANGUAGE_LINE.captures("```python").is_none());
    }
}
