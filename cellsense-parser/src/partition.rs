//! Document partitioning
//!
//! Splits a composite document into cells with a single scan over its lines. The scan keeps
//! four flags (inside front matter, a math block, a code cell, a plain fence) and tests each
//! line against the transitions in a fixed order:
//!
//! 1. `---` outside any block opens front matter, or closes it into a raw cell
//! 2. a fence with a language tag (```` ```{r} ````) opens a code cell
//! 3. a bare closing fence ends the code cell, or toggles a plain fence
//! 4. any other fence opens a plain fence, whose content stays markdown
//! 5. `$$` opens or closes a math cell
//!
//! Everything else is buffered into the current cell. Blank lines at either end of a cell
//! are trimmed and cells with no content left are dropped. Code cells hold the lines
//! between their fences; math and raw cells keep their delimiters.

use crate::cell_options::partition_cell_options;
use crate::error::MappedTextError;
use crate::mapped_text::{MappedString, Piece};
use crate::text::{lines, ranged_lines};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::ops::Range;

static YAML_DELIMITER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^---\s*$").unwrap());
static CODE_CELL_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*```+\s*\{([=A-Za-z]+)( *[ ,].*)?\}\s*$").unwrap());
static FENCE_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```").unwrap());
static FENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```\s*$").unwrap());
static MATH_DELIMITER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$\$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellType {
    Raw,
    Markdown,
    Math,
    Code { language: String },
}

impl CellType {
    pub fn language(&self) -> Option<&str> {
        match self {
            CellType::Code { language } => Some(language),
            _ => None,
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellType::Raw => f.write_str("raw"),
            CellType::Markdown => f.write_str("markdown"),
            CellType::Math => f.write_str("math"),
            CellType::Code { language } => write!(f, "code ({})", language),
        }
    }
}

/// One cell of a partitioned document
#[derive(Debug, Clone)]
pub struct Cell {
    pub cell_type: CellType,
    pub source: MappedString,
    /// Offset of `source` within `source_verbatim`
    pub source_offset: usize,
    /// Number of option lines split off the front of the cell
    pub source_start_line: usize,
    /// The cell as a uniform fenced block (differs from `source` for `ojs` and `dot` cells)
    pub source_verbatim: MappedString,
    pub options: Option<MappedString>,
    /// Lines of the partitioned text the cell content occupies, end exclusive
    pub line_range: Range<usize>,
}

impl Cell {
    /// First line of the cell content in the partitioned text
    pub fn start_line(&self) -> usize {
        self.line_range.start
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.line_range.contains(&line)
    }
}

/// The cells of a document, in document order
#[derive(Debug, Clone, Default)]
pub struct PartitionedDocument {
    pub cells: Vec<Cell>,
}

impl PartitionedDocument {
    /// The cell whose content covers `line`. Fence lines belong to no cell.
    pub fn cell_at_line(&self, line: usize) -> Option<&Cell> {
        self.cells.iter().find(|cell| cell.contains_line(line))
    }
}

struct Partitioner<'a> {
    src: &'a MappedString,
    buffer: Vec<(usize, Range<usize>)>,
    language: String,
    cells: Vec<Cell>,
}

impl Partitioner<'_> {
    fn flush(&mut self, cell_type: CellType) -> Result<(), MappedTextError> {
        let buffer = std::mem::take(&mut self.buffer);
        let text = self.src.value();
        let is_content = |(_, range): &&(usize, Range<usize>)| !text[range.clone()].trim().is_empty();
        let (Some(first), Some(last)) = (
            buffer.iter().find(is_content),
            buffer.iter().rev().find(is_content),
        ) else {
            return Ok(());
        };
        let source = self.src.slice(first.1.start..last.1.end)?;
        let line_range = first.0..last.0 + 1;
        let mut cell = Cell {
            cell_type,
            source_verbatim: source.clone(),
            source,
            source_offset: 0,
            source_start_line: 0,
            options: None,
            line_range,
        };
        if matches!(self.language.as_str(), "ojs" | "dot") && cell.cell_type.language().is_some() {
            self.split_options(&mut cell)?;
        }
        tracing::trace!(cell_type = %cell.cell_type, lines = ?cell.line_range, "flushed cell");
        self.cells.push(cell);
        Ok(())
    }

    fn split_options(&self, cell: &mut Cell) -> Result<(), MappedTextError> {
        let options = partition_cell_options(&self.language, &cell.source)?;
        let open = format!("```{{{}}}\n", self.language);
        let body_len = cell.source.len();
        let skipped = body_len - options.source.len();
        cell.source_verbatim = cell.source.mapped([
            Piece::from(open.as_str()),
            Piece::Range(0..body_len),
            Piece::from("\n```"),
        ])?;
        cell.source_offset = open.len() + skipped;
        cell.source_start_line = options.source_start_line;
        cell.options = options.yaml;
        cell.source = options.source;
        Ok(())
    }
}

/// Split `src` into cells.
pub fn partition(src: &MappedString) -> Result<PartitionedDocument, MappedTextError> {
    let mut state = Partitioner {
        src,
        buffer: Vec::new(),
        language: String::new(),
        cells: Vec::new(),
    };
    let (mut in_yaml, mut in_math, mut in_code_cell, mut in_code) = (false, false, false, false);

    for (number, line) in ranged_lines(src.value()).into_iter().enumerate() {
        let entry = (number, line.range.clone());
        if YAML_DELIMITER.is_match(line.text) && !in_code_cell && !in_code && !in_math {
            if in_yaml {
                state.buffer.push(entry);
                state.flush(CellType::Raw)?;
                in_yaml = false;
            } else {
                state.flush(CellType::Markdown)?;
                state.buffer.push(entry);
                in_yaml = true;
            }
        } else if let Some(captures) = CODE_CELL_START.captures(line.text) {
            state.flush(CellType::Markdown)?;
            state.language = captures[1].to_string();
            in_code_cell = true;
        } else if FENCE_END.is_match(line.text) {
            if in_code_cell {
                in_code_cell = false;
                let language = state.language.clone();
                state.flush(CellType::Code { language })?;
            } else {
                in_code = !in_code;
                state.buffer.push(entry);
            }
        } else if FENCE_START.is_match(line.text) {
            in_code = true;
            state.buffer.push(entry);
        } else if MATH_DELIMITER.is_match(line.text) && !in_code_cell && !in_code && !in_yaml {
            if in_math {
                state.buffer.push(entry);
                state.flush(CellType::Math)?;
            } else {
                state.flush(CellType::Markdown)?;
                state.buffer.push(entry);
            }
            in_math = !in_math;
        } else {
            state.buffer.push(entry);
        }
    }
    state.flush(CellType::Markdown)?;
    tracing::debug!(cells = state.cells.len(), "partitioned document");
    Ok(PartitionedDocument { cells: state.cells })
}

/// Lines of a cell's content with blank lines at both ends removed
pub fn trimmed_lines(text: &str) -> Vec<&str> {
    let all = lines(text);
    let first = all.iter().position(|l| !l.trim().is_empty());
    let last = all.iter().rposition(|l| !l.trim().is_empty());
    match (first, last) {
        (Some(first), Some(last)) => all[first..=last].to_vec(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> PartitionedDocument {
        partition(&MappedString::new(text)).unwrap()
    }

    #[test]
    fn front_matter_becomes_raw_cell() {
        let parts = doc("---\ntitle: x\n---\n\n# Heading\n");
        assert_eq!(parts.cells.len(), 2);
        assert_eq!(parts.cells[0].cell_type, CellType::Raw);
        assert_eq!(parts.cells[0].source.value(), "---\ntitle: x\n---");
        assert_eq!(parts.cells[0].line_range, 0..3);
        assert_eq!(parts.cells[1].cell_type, CellType::Markdown);
        assert_eq!(parts.cells[1].source.value(), "# Heading");
        assert_eq!(parts.cells[1].line_range, 4..5);
    }

    #[test]
    fn code_cell_holds_body_between_fences() {
        let parts = doc("text\n```{r}\n#| echo: false\nplot(1)\n```\nmore\n");
        assert_eq!(parts.cells.len(), 3);
        let code = &parts.cells[1];
        assert_eq!(
            code.cell_type,
            CellType::Code {
                language: "r".into()
            }
        );
        assert_eq!(code.source.value(), "#| echo: false\nplot(1)");
        assert_eq!(code.line_range, 2..4);
        assert!(code.options.is_none());
        assert!(parts.cell_at_line(1).is_none());
        assert_eq!(parts.cell_at_line(3).map(|c| c.start_line()), Some(2));
    }

    #[test]
    fn plain_fences_stay_markdown() {
        let parts = doc("```\n---\n$$\n```\n");
        assert_eq!(parts.cells.len(), 1);
        assert_eq!(parts.cells[0].cell_type, CellType::Markdown);
        assert_eq!(parts.cells[0].source.value(), "```\n---\n$$\n```");
    }

    #[test]
    fn math_block_keeps_delimiters() {
        let parts = doc("a\n$$\nx^2\n$$\nb\n");
        let types: Vec<_> = parts.cells.iter().map(|c| c.cell_type.clone()).collect();
        assert_eq!(types, vec![CellType::Markdown, CellType::Math, CellType::Markdown]);
        assert_eq!(parts.cells[1].source.value(), "$$\nx^2\n$$");
    }

    #[test]
    fn blank_cells_are_dropped() {
        let parts = doc("\n\n```{python}\n\n```\n\n");
        assert!(parts.cells.is_empty());
    }

    #[test]
    fn ojs_cells_split_options_and_rewrap() {
        let parts = doc("```{ojs}\n//| echo: false\nviewof x = 1\n```\n");
        let cell = &parts.cells[0];
        assert_eq!(cell.options.as_ref().unwrap().value(), "echo: false");
        assert_eq!(cell.source.value(), "viewof x = 1");
        assert_eq!(cell.source_start_line, 1);
        assert_eq!(
            cell.source_verbatim.value(),
            "```{ojs}\n//| echo: false\nviewof x = 1\n```"
        );
        assert_eq!(
            &cell.source_verbatim.value()[cell.source_offset..],
            "viewof x = 1\n```"
        );
        assert_eq!(cell.source_verbatim.map(0), None);
        assert_eq!(cell.source_verbatim.map_closest(0), Some(9));
    }

    #[test]
    fn trimmed_lines_drops_blank_edges() {
        assert_eq!(trimmed_lines("\n a\n\nb\n \n"), vec![" a", "", "b"]);
        assert!(trimmed_lines(" \n\n").is_empty());
    }
}
