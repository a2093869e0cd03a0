//! Chunk option dialects
//!
//! Option blocks are normally YAML. Older knitr documents write them as `label, echo=FALSE`
//! style argument lists, which must not be fed to a YAML validator.

use crate::text::lines;
use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOptionsFormat {
    Yaml,
    Knitr,
}

// Unindented, at least two characters, no colon anywhere.
static NO_INDENT_OR_COLON: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^:\s]+[^:]+$").unwrap());

/// Guess the dialect of an option block's content (comment prefixes already stripped).
///
/// A block is knitr style when some unindented line carries no colon at all, which YAML
/// mappings never do, and every line reads as part of an argument list (it assigns with `=`
/// or continues with a trailing comma). A bare word being typed is still YAML. Sequence
/// items and comments are ignored.
pub fn guess_chunk_options_format(options: &str) -> ChunkOptionsFormat {
    let all = lines(options);
    let colonless = all.iter().any(|line| {
        NO_INDENT_OR_COLON.is_match(line) && !line.starts_with('-') && !line.starts_with('#')
    });
    let argument_list = all
        .iter()
        .filter(|line| !line.trim().is_empty())
        .all(|line| line.contains('=') || line.trim_end().ends_with(','));
    if colonless && argument_list {
        ChunkOptionsFormat::Knitr
    } else {
        ChunkOptionsFormat::Yaml
    }
}
