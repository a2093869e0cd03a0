//! Line-oriented text helpers
//!
//! Everything in this crate reasons about physical lines: the partitioner scans them, the
//! option partitioner peels them off a cell, and diagnostics report line/column pairs. These
//! helpers keep the conventions in one place:
//!
//! - Lines are separated by `\n` or `\r\n`; the separator is never part of a line.
//! - A trailing separator yields a final empty line (the same shape as `str::split`).
//! - Offsets are byte offsets, columns are byte columns within the line.

use serde::Serialize;
use std::fmt;
use std::ops::Range;

/// A zero-based line/column pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One physical line together with its byte range in the text it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangedLine<'a> {
    pub text: &'a str,
    pub range: Range<usize>,
}

/// Split `text` into physical lines and keep the byte range of each one.
pub fn ranged_lines(text: &str) -> Vec<RangedLine<'_>> {
    let mut result = Vec::new();
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        if ch == '\n' {
            let end = if idx > start && text.as_bytes()[idx - 1] == b'\r' {
                idx - 1
            } else {
                idx
            };
            result.push(RangedLine {
                text: &text[start..end],
                range: start..end,
            });
            start = idx + 1;
        }
    }
    result.push(RangedLine {
        text: &text[start..],
        range: start..text.len(),
    });
    result
}

/// Split `text` into physical lines.
pub fn lines(text: &str) -> Vec<&str> {
    ranged_lines(text).into_iter().map(|line| line.text).collect()
}

/// Rejoin lines with `\n`, normalizing any `\r\n` separators.
pub fn normalize_newlines(text: &str) -> String {
    lines(text).join("\n")
}

/// Byte offset at which every line starts.
pub fn line_offsets(text: &str) -> Vec<usize> {
    let mut offsets = vec![0];
    for (idx, ch) in text.char_indices() {
        if ch == '\n' {
            offsets.push(idx + 1);
        }
    }
    offsets
}

/// Number of leading spaces on a line
pub fn indentation(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

/// Fast offset <-> position conversion for one text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        Self {
            line_starts: line_offsets(text),
            len: text.len(),
        }
    }

    /// Convert a byte offset to a line/column position. Offsets past the end clamp to the
    /// end of the text.
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.len);
        let line = self
            .line_starts
            .binary_search(&offset)
            .unwrap_or_else(|i| i - 1);
        Position::new(line, offset - self.line_starts[line])
    }

    /// Convert a line/column position back to a byte offset.
    pub fn offset(&self, position: Position) -> Option<usize> {
        let start = *self.line_starts.get(position.line)?;
        let offset = start + position.column;
        (offset <= self.len).then_some(offset)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line).copied()
    }
}

/// Convert a byte offset of `text` to a line/column position.
pub fn index_to_row_col(text: &str, offset: usize) -> Position {
    LineIndex::new(text).position(offset)
}

/// Convert a line/column position of `text` to a byte offset.
pub fn row_col_to_index(text: &str, position: Position) -> Option<usize> {
    LineIndex::new(text).offset(position)
}

/// A numbered source line as produced by [`format_line_range`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedLine {
    pub line_number: usize,
    pub content: String,
    pub raw_line: String,
}

/// A block of numbered lines plus the width of the number gutter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRangeExcerpt {
    pub prefix_width: usize,
    pub lines: Vec<NumberedLine>,
}

/// Number the lines `first..=last` (zero-based) of `text` for display in error reports.
pub fn format_line_range(text: &str, first: usize, last: usize) -> LineRangeExcerpt {
    let all = lines(text);
    let last = last.min(all.len().saturating_sub(1));
    let width = (first + 1)
        .to_string()
        .len()
        .max((last + 1).to_string().len());
    let numbered = (first..=last)
        .filter_map(|i| all.get(i).map(|raw| (i, *raw)))
        .map(|(i, raw)| NumberedLine {
            line_number: i,
            content: format!("{:>width$}: {}", i + 1, raw, width = width),
            raw_line: raw.to_string(),
        })
        .collect();
    LineRangeExcerpt {
        prefix_width: width + 2,
        lines: numbered,
    }
}
