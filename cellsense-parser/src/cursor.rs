//! Cursor location in YAML being edited
//!
//! YAML under the cursor is usually incomplete. These helpers recover a structural path
//! (keys and sequence indices from the document root) for a cursor position in two ways:
//! from a successful parse of the text ([`locate_cursor`]), or, when no parse places the
//! cursor, from the indentation of the lines above it ([`locate_from_indentation`]).
//! [`attempt_parses_at_line`] produces the parses, deleting characters left of the cursor
//! one at a time until the document parses.

use crate::mapped_text::{MappedString, Piece};
use crate::text::{indentation, lines, ranged_lines};
use crate::yaml::{parse_annotated, AnnotatedNode, AnnotatedYaml, NodeKind, PathSegment};

/// Path to the node containing `offset`, or `None` when the offset falls past the end of a
/// node the parse cannot account for.
///
/// Inside a key the path ends with that key. Inside (or just after) a mapping value the path
/// ends with the value's key. Scalars add nothing to the path.
pub fn locate_cursor(root: &AnnotatedNode, offset: usize) -> Option<Vec<PathSegment>> {
    let mut path = Vec::new();
    let mut node = root;
    loop {
        match node.kind {
            NodeKind::Mapping => {
                let Some((key, value)) = node.pairs().filter(|(key, _)| key.start <= offset).last()
                else {
                    return Some(path);
                };
                path.push(PathSegment::Key(key.key_text()));
                if offset <= key.end || value.is_implicit_null() {
                    return Some(path);
                }
                if offset < value.start || offset > value.end {
                    return None;
                }
                node = value;
            }
            NodeKind::Sequence => {
                let Some((index, item)) = node
                    .components
                    .iter()
                    .enumerate()
                    .filter(|(_, item)| item.start <= offset)
                    .last()
                else {
                    return Some(path);
                };
                if offset > item.end && !item.is_implicit_null() {
                    return None;
                }
                path.push(PathSegment::Index(index));
                node = item;
            }
            NodeKind::Scalar => return Some(path),
        }
    }
}

/// Path of the container the cursor sits in, judged only by indentation.
///
/// `line` is the text of the cursor line up to the cursor. On a whitespace-only line the
/// cursor column is the indentation; otherwise the line's own indentation is used.
pub fn locate_from_indentation(code: &str, row: usize, line: &str) -> Vec<PathSegment> {
    let all = lines(code);
    let mut target = if line.trim().is_empty() {
        line.len()
    } else {
        indentation(line)
    };
    let mut reversed = Vec::new();
    let upper = row.min(all.len());
    for i in (0..upper).rev() {
        if target == 0 {
            break;
        }
        let text = all[i];
        let trimmed = text.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = indentation(text);
        if indent >= target {
            continue;
        }
        if let Some(content) = dash_content(trimmed) {
            let content_indent = indent + (trimmed.len() - content.len());
            if content_indent < target {
                if let Some(key) = key_of(content) {
                    reversed.push(PathSegment::Key(key));
                }
            }
            reversed.push(PathSegment::Index(sibling_index(&all, i, indent)));
            target = indent;
        } else if let Some(key) = key_of(trimmed) {
            reversed.push(PathSegment::Key(key));
            target = indent;
        }
    }
    reversed.reverse();
    reversed
}

/// The cursor line followed by every line above it with strictly smaller indentation.
pub fn yaml_predecessors(code: &str, row: usize) -> Vec<usize> {
    let all = lines(code);
    let Some(current) = all.get(row) else {
        return Vec::new();
    };
    let mut result = vec![row];
    let mut indent = indentation(current);
    for i in (0..row).rev() {
        if indent == 0 {
            break;
        }
        if all[i].trim().is_empty() {
            continue;
        }
        let this = indentation(all[i]);
        if this < indent {
            result.push(i);
            indent = this;
        }
    }
    result
}

fn dash_content(trimmed: &str) -> Option<&str> {
    if trimmed == "-" {
        Some("")
    } else {
        trimmed.strip_prefix("- ").map(str::trim_start)
    }
}

fn key_of(text: &str) -> Option<String> {
    let (key, _) = text.split_once(':')?;
    let key = key.trim();
    let unquoted = key
        .strip_prefix('"')
        .and_then(|k| k.strip_suffix('"'))
        .or_else(|| key.strip_prefix('\'').and_then(|k| k.strip_suffix('\'')))
        .unwrap_or(key);
    (!unquoted.is_empty()).then(|| unquoted.to_string())
}

/// Number of sequence items at `indent` above line `at`, within the same sequence
fn sibling_index(all: &[&str], at: usize, indent: usize) -> usize {
    let mut count = 0;
    for text in all[..at].iter().rev() {
        let trimmed = text.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        let this = indentation(text);
        if this < indent {
            break;
        }
        if this == indent {
            if dash_content(trimmed).is_some() {
                count += 1;
            } else {
                break;
            }
        }
    }
    count
}

/// A successful parse of the code with `deletions` characters removed left of the cursor
#[derive(Debug, Clone)]
pub struct ParseAttempt {
    pub yaml: AnnotatedYaml,
    pub code: MappedString,
    pub deletions: usize,
}

/// Lazily yields the parses of `code` that succeed, first unmodified, then with one, two,
/// and more characters deleted immediately left of the cursor.
pub fn attempt_parses_at_line(code: &MappedString, row: usize, column: usize) -> ParseAttempts<'_> {
    let cursor = ranged_lines(code.value())
        .get(row)
        .map(|line| (line.range.start, column.min(line.range.len())));
    ParseAttempts {
        code,
        cursor,
        deletions: 0,
    }
}

pub struct ParseAttempts<'a> {
    code: &'a MappedString,
    cursor: Option<(usize, usize)>,
    deletions: usize,
}

impl Iterator for ParseAttempts<'_> {
    type Item = ParseAttempt;

    fn next(&mut self) -> Option<ParseAttempt> {
        loop {
            let deletions = self.deletions;
            let candidate = if deletions == 0 {
                self.code.clone()
            } else {
                let (line_start, column) = self.cursor?;
                if deletions > column {
                    return None;
                }
                let end = line_start + column;
                let start = end - deletions;
                self.deletions += 1;
                if !self.code.value().is_char_boundary(start) {
                    continue;
                }
                match self
                    .code
                    .mapped([Piece::Range(0..start), Piece::Range(end..self.code.len())])
                {
                    Ok(code) => code,
                    Err(_) => continue,
                }
            };
            if deletions == 0 {
                self.deletions = 1;
            }
            if let Ok(yaml) = parse_annotated(&candidate) {
                return Some(ParseAttempt {
                    yaml,
                    code: candidate,
                    deletions,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yaml::parse_annotated_str;

    fn keys(path: &[&str]) -> Vec<PathSegment> {
        path.iter().map(|k| PathSegment::from(*k)).collect()
    }

    #[test]
    fn locate_inside_value() {
        let text = "execute:\n  echo: fal";
        let doc = parse_annotated_str(text).unwrap();
        let path = locate_cursor(&doc.root, text.len()).unwrap();
        assert_eq!(path, keys(&["execute", "echo"]));
    }

    #[test]
    fn locate_inside_key() {
        let text = "title: x\nauthor: y";
        let doc = parse_annotated_str(text).unwrap();
        assert_eq!(locate_cursor(&doc.root, 11).unwrap(), keys(&["author"]));
    }

    #[test]
    fn locate_after_empty_value() {
        let text = "echo: ";
        let doc = parse_annotated_str(text).unwrap();
        assert_eq!(locate_cursor(&doc.root, 6).unwrap(), keys(&["echo"]));
    }

    #[test]
    fn locate_in_sequence_item() {
        let text = "items:\n  - a: 1\n  - b: 2";
        let doc = parse_annotated_str(text).unwrap();
        let path = locate_cursor(&doc.root, text.len()).unwrap();
        assert_eq!(
            path,
            vec!["items".into(), PathSegment::Index(1), "b".into()]
        );
    }

    #[test]
    fn indentation_walks_up_keys() {
        let code = "format:\n  html:\n    \n";
        assert_eq!(
            locate_from_indentation(code, 2, "    "),
            keys(&["format", "html"])
        );
    }

    #[test]
    fn indentation_counts_sequence_items() {
        let code = "left:\n  - text: a\n    href: b\n  - text: c\n    \n";
        assert_eq!(
            locate_from_indentation(code, 4, "    "),
            vec!["left".into(), PathSegment::Index(1)]
        );
    }

    #[test]
    fn indentation_enters_key_of_dash_item() {
        let code = "- key:\n    \n";
        assert_eq!(
            locate_from_indentation(code, 1, "    "),
            vec![PathSegment::Index(0), "key".into()]
        );
    }

    #[test]
    fn predecessors_follow_indentation() {
        let code = "a:\n  b:\n    c: 1\n  d: 2\n    e: 3";
        assert_eq!(yaml_predecessors(code, 4), vec![4, 3, 0]);
        assert_eq!(yaml_predecessors(code, 2), vec![2, 1, 0]);
        assert!(yaml_predecessors(code, 10).is_empty());
    }

    #[test]
    fn parse_attempts_delete_left_of_cursor() {
        let code = MappedString::new("a: 1\nb: [\n");
        let first = attempt_parses_at_line(&code, 1, 4).next().unwrap();
        assert_eq!(first.deletions, 1);
        assert_eq!(first.code.value(), "a: 1\nb: \n");
    }

    #[test]
    fn parse_attempts_start_unmodified() {
        let code = MappedString::new("a: 1\n");
        let first = attempt_parses_at_line(&code, 0, 4).next().unwrap();
        assert_eq!(first.deletions, 0);
    }
}
