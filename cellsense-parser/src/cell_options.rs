//! Cell option blocks
//!
//! A code cell may open with option lines written as comments in the cell's language,
//! `#| echo: false` for R or Python, `//| echo: false` for JavaScript, `/*| echo: false */`
//! for C. The content after the `<comment>| ` prefix of the leading run of such lines is
//! YAML.

use crate::error::MappedTextError;
use crate::mapped_text::{MappedString, Piece};
use crate::text::ranged_lines;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Line comment prefix and, for block-comment languages, the closing suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentChars {
    pub prefix: &'static str,
    pub suffix: Option<&'static str>,
}

impl CommentChars {
    const fn line(prefix: &'static str) -> Self {
        Self {
            prefix,
            suffix: None,
        }
    }

    const fn block(prefix: &'static str, suffix: &'static str) -> Self {
        Self {
            prefix,
            suffix: Some(suffix),
        }
    }

    /// The prefix an option line starts with, e.g. `#| `
    pub fn option_prefix(&self) -> String {
        format!("{}| ", self.prefix)
    }
}

static COMMENT_CHARS: Lazy<HashMap<&'static str, CommentChars>> = Lazy::new(|| {
    let hash = CommentChars::line("#");
    let slashes = CommentChars::line("//");
    let dashes = CommentChars::line("--");
    let percent = CommentChars::line("%");
    let bang = CommentChars::line("!");
    let c_block = CommentChars::block("/*", "*/");
    [
        ("r", hash),
        ("python", hash),
        ("julia", hash),
        ("scala", slashes),
        ("matlab", percent),
        ("csharp", slashes),
        ("fsharp", slashes),
        ("c", c_block),
        ("css", c_block),
        ("sas", CommentChars::block("*", ";")),
        ("powershell", hash),
        ("bash", hash),
        ("sql", dashes),
        ("mysql", dashes),
        ("psql", dashes),
        ("lua", dashes),
        ("cpp", slashes),
        ("cc", slashes),
        ("stan", hash),
        ("octave", hash),
        ("fortran", bang),
        ("fortran95", bang),
        ("awk", hash),
        ("gawk", hash),
        ("stata", CommentChars::line("*")),
        ("java", slashes),
        ("groovy", slashes),
        ("sed", hash),
        ("perl", hash),
        ("ruby", hash),
        ("tikz", percent),
        ("js", slashes),
        ("d3", slashes),
        ("node", slashes),
        ("sass", slashes),
        ("coffee", hash),
        ("go", slashes),
        ("asy", slashes),
        ("haskell", dashes),
        ("dot", slashes),
        ("ojs", slashes),
    ]
    .into_iter()
    .collect()
});

/// Comment characters for `language`; unknown languages use `#`.
pub fn comment_chars(language: &str) -> CommentChars {
    COMMENT_CHARS
        .get(language)
        .copied()
        .unwrap_or(CommentChars::line("#"))
}

/// Whether `language` has an entry in the comment table
pub fn is_known_language(language: &str) -> bool {
    COMMENT_CHARS.contains_key(language)
}

/// A code cell split into its option block and the remaining code
#[derive(Debug, Clone)]
pub struct CellOptions {
    /// The YAML content of the option lines, one line per option line
    pub yaml: Option<MappedString>,
    /// The option lines as written, prefix included
    pub option_lines: Vec<MappedString>,
    /// The code after the option block
    pub source: MappedString,
    /// Number of option lines
    pub source_start_line: usize,
}

/// Split the leading option lines off a code cell.
pub fn partition_cell_options(
    language: &str,
    source: &MappedString,
) -> Result<CellOptions, MappedTextError> {
    let chars = comment_chars(language);
    let prefix = chars.option_prefix();
    let text = source.value();

    let mut yaml_pieces: Vec<Piece> = Vec::new();
    let mut option_lines = Vec::new();
    let mut rest_start = 0;
    for line in ranged_lines(text) {
        let Some(content) = option_content(line.text, &prefix, chars.suffix) else {
            break;
        };
        if !yaml_pieces.is_empty() {
            yaml_pieces.push(Piece::from("\n"));
        }
        let start = line.range.start + prefix.len();
        yaml_pieces.push(Piece::Range(start..start + content.len()));
        option_lines.push(source.slice(line.range.clone())?);
        rest_start = (line.range.end + 1).min(text.len());
        if text[line.range.end..].starts_with("\r\n") {
            rest_start = (line.range.end + 2).min(text.len());
        }
    }

    if option_lines.is_empty() {
        return Ok(CellOptions {
            yaml: None,
            option_lines,
            source: source.clone(),
            source_start_line: 0,
        });
    }
    tracing::trace!(language, lines = option_lines.len(), "partitioned cell options");
    Ok(CellOptions {
        yaml: Some(source.mapped(yaml_pieces)?),
        source_start_line: option_lines.len(),
        option_lines,
        source: source.slice(rest_start..text.len())?,
    })
}

fn option_content<'a>(line: &'a str, prefix: &str, suffix: Option<&str>) -> Option<&'a str> {
    let after = line.strip_prefix(prefix)?;
    match suffix {
        None => Some(after),
        Some(suffix) => after.trim_end().strip_suffix(suffix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("r", "#", None)]
    #[case("python", "#", None)]
    #[case("ojs", "//", None)]
    #[case("sql", "--", None)]
    #[case("matlab", "%", None)]
    #[case("fortran", "!", None)]
    #[case("stata", "*", None)]
    #[case("c", "/*", Some("*/"))]
    #[case("sas", "*", Some(";"))]
    #[case("brainfuck", "#", None)]
    fn comment_table(
        #[case] language: &str,
        #[case] prefix: &str,
        #[case] suffix: Option<&str>,
    ) {
        let chars = comment_chars(language);
        assert_eq!(chars.prefix, prefix);
        assert_eq!(chars.suffix, suffix);
    }

    #[test]
    fn splits_leading_option_lines() {
        let cell = MappedString::new("#| echo: false\n#| label: fig-a\nplot(1)\n");
        let result = partition_cell_options("r", &cell).unwrap();
        let yaml = result.yaml.unwrap();
        assert_eq!(yaml.value(), "echo: false\nlabel: fig-a");
        assert_eq!(yaml.map(0), Some(3));
        assert_eq!(yaml.map(11), None);
        assert_eq!(yaml.map(12), Some(18));
        assert_eq!(result.source.value(), "plot(1)\n");
        assert_eq!(result.source_start_line, 2);
        assert_eq!(result.option_lines.len(), 2);
    }

    #[test]
    fn block_comment_suffix_is_stripped() {
        let cell = MappedString::new("/*| echo: true */\nint x;\n");
        let result = partition_cell_options("c", &cell).unwrap();
        assert_eq!(result.yaml.unwrap().value(), "echo: true ");
    }

    #[test]
    fn stops_at_first_plain_line() {
        let cell = MappedString::new("x <- 1\n#| echo: false\n");
        let result = partition_cell_options("r", &cell).unwrap();
        assert!(result.yaml.is_none());
        assert_eq!(result.source.value(), cell.value());
        assert_eq!(result.source_start_line, 0);
    }

    #[test]
    fn options_only_cell_has_empty_remainder() {
        let cell = MappedString::new("//| echo: false");
        let result = partition_cell_options("ojs", &cell).unwrap();
        assert_eq!(result.yaml.unwrap().value(), "echo: false");
        assert_eq!(result.source.value(), "");
    }
}
