//! # cellsense-parser
//!
//! Source-level building blocks for editor intelligence on composite documents: markdown with
//! a YAML front matter block, fenced code chunks whose leading comment lines carry YAML
//! options, and plain YAML configuration files.
//!
//! Layout
//!
//!   ├── text           line/offset helpers shared by everything below
//!   ├── mapped_text    strings that remember where each byte came from
//!   ├── partition      split a document into raw/markdown/math/code cells
//!   ├── cell_options   peel `#| key: value` option lines off a code cell
//!   ├── chunk_options  guess whether a chunk uses YAML or knitr style options
//!   ├── yaml           parse YAML into a tree annotated with source offsets
//!   └── cursor         recover a structural path for a cursor in YAML being edited
//!
//! Every piece of text handed to the analysis layer is a [`mapped_text::MappedString`], so a
//! diagnostic computed on a fragment (the body of an option block, say) can always be reported
//! against the file the user is editing.

pub mod cell_options;
pub mod chunk_options;
pub mod cursor;
pub mod error;
pub mod mapped_text;
pub mod partition;
pub mod text;
pub mod yaml;

pub use error::{MappedTextError, YamlParseError};
pub use mapped_text::{MappedString, Piece};
