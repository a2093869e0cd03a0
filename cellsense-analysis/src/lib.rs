//! # cellsense-analysis
//!
//! The schema side of cellsense: a schema IR built from declarative YAML descriptions, a
//! registry of named schemas, and the two consumers of a schema, validation with
//! located diagnostics and completion at a cursor.
//!
//!   ├── schema        the IR and its editor metadata (ids, phrases, tags)
//!   ├── description   parse a declarative description into constructor inputs
//!   ├── builder       turn descriptions into IR, resolving names through a registry
//!   ├── registry      named schemas, raw definitions first and built schemas second
//!   ├── fields        field-definition files (`- name: echo / schema: boolean`)
//!   ├── json          IR to plain JSON Schema, with a `$defs` table
//!   ├── navigation    walk the IR by instance path or by validator schema path
//!   ├── validator     compile and run JSON Schema, expanding union failures
//!   ├── localize      prune validator errors and anchor them in the source
//!   └── completion    completions for a path, or for a cursor in YAML being typed
//!
//! Nothing here is async or holds global state; callers own the registry and hand it in.

pub mod builder;
pub mod completion;
pub mod description;
pub mod error;
pub mod fields;
pub mod json;
pub mod localize;
pub mod navigation;
pub mod registry;
pub mod schema;
pub mod validator;

pub use completion::{
    complete_at_cursor, completions, CompletionCandidate, CompletionContext, CompletionKind,
    CompletionResult, CursorCompletion,
};
pub use error::{LocalizeError, SchemaError};
pub use localize::{validate_annotated, LocalizedDiagnostic};
pub use registry::SchemaRegistry;
pub use schema::{Schema, SchemaKind, SchemaRef};
pub use validator::{SchemaValidator, ValidatorError};
