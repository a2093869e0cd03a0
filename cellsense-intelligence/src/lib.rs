//! # cellsense-intelligence
//!
//! The request layer: an editor sends an [`AutomationContext`] (document kind, text,
//! cursor) and gets back completions or diagnostics for the YAML inside it.
//!
//!   ├── context         the request as sent by an editor bridge
//!   ├── dispatcher      route a request to front matter, cell options or a YAML file
//!   ├── resources       bundled schema data and the schema set built from it
//!   ├── queue           compiled validators, one per schema, used one request at a time
//!   ├── validated_yaml  read YAML that must validate, with source excerpts on failure
//!   ├── lsp             conversions into `lsp-types`
//!   └── logging         tracing subscriber setup
//!
//! ```ignore
//! let intelligence = YamlIntelligence::with_defaults()?;
//! let context = AutomationContext::new(FileType::Markdown, text, CursorPosition::new(1, 3))
//!     .with_line("tit");
//! if let Some(result) = intelligence.get_completions(&context).await {
//!     // ...
//! }
//! ```

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod lsp;
pub mod queue;
pub mod resources;
pub mod validated_yaml;

pub use context::{AutomationContext, AutomationKind, CursorPosition, FileType};
pub use dispatcher::YamlIntelligence;
pub use error::{AutomationError, ReadYamlError, ValidationFailure};
pub use logging::init_tracing;
pub use queue::ValidatorQueue;
pub use resources::{SchemaSet, SchemaSources};
pub use validated_yaml::format_error_report;
