//! End-to-end validation: descriptions in, located diagnostics out

use cellsense_analysis::builder::SchemaBuilder;
use cellsense_analysis::description::SchemaDescription;
use cellsense_analysis::localize::validate_annotated;
use cellsense_analysis::{SchemaRegistry, SchemaValidator};
use cellsense_parser::text::Position;
use cellsense_parser::yaml::parse_annotated_str;
use std::sync::Arc;

const NAVIGATION_DEFINITIONS: &[(&str, &str)] = &[
    (
        "navigation-item",
        r#"
anyOf:
  - path
  - object:
      closed: true
      properties:
        href: path
        url: path
        file: path
        text: string
        icon: string
        aria-label: string
        menu:
          arrayOf:
            ref: navigation-item
"#,
    ),
    (
        "chapter-item",
        r#"
anyOf:
  - ref: navigation-item
  - record:
      part: path
      chapters:
        arrayOf:
          ref: navigation-item
"#,
    ),
    (
        "chapter-list",
        r#"
arrayOf:
  ref: chapter-item
"#,
    ),
];

fn navigation_registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    for (name, text) in NAVIGATION_DEFINITIONS {
        let description = SchemaDescription::parse_str(text).unwrap();
        registry.register_definition(*name, description).unwrap();
    }
    registry.build_all().unwrap();
    registry.verify_refs().unwrap();
    registry
}

#[test]
fn missing_record_field_reports_one_required_error() {
    let registry = SchemaRegistry::new();
    let description = SchemaDescription::parse_str("record:\n  baz: number\n  bar: string\n").unwrap();
    let schema = Arc::new(SchemaBuilder::new(&registry).build(&description).unwrap());
    let mut validator = SchemaValidator::new(schema, Arc::new(registry)).unwrap();

    let yaml = parse_annotated_str("baz: 3\n").unwrap();
    let diagnostics = validate_annotated(&mut validator, &yaml).unwrap();

    assert_eq!(diagnostics.len(), 1);
    let diagnostic = &diagnostics[0];
    assert_eq!(diagnostic.keyword(), "required");
    assert!(diagnostic.error.schema_path.ends_with("required"));
    assert_eq!(diagnostic.error.param("missingProperty"), Some("bar"));
}

#[test]
fn chapter_list_reports_only_the_missing_chapters() {
    let registry = navigation_registry();
    let schema = registry.get("chapter-list").unwrap();
    let mut validator = SchemaValidator::new(schema, Arc::new(registry)).unwrap();

    let text = r#"- part: "Getting started"
  chapters:
    - intro.qmd
    - text: Basics
      href: basics.qmd
- part: "-----"
"#;
    let yaml = parse_annotated_str(text).unwrap();
    let diagnostics = validate_annotated(&mut validator, &yaml).unwrap();

    assert_eq!(diagnostics.len(), 1, "{:#?}", diagnostics);
    let diagnostic = &diagnostics[0];
    assert_eq!(diagnostic.keyword(), "required");
    assert!(diagnostic.error.schema_path.ends_with("required"));
    assert_eq!(diagnostic.instance_path, "/1");
    assert_eq!(diagnostic.start.line, 5);
}

#[test]
fn valid_chapter_list_has_no_diagnostics() {
    let registry = navigation_registry();
    let schema = registry.get("chapter-list").unwrap();
    let mut validator = SchemaValidator::new(schema, Arc::new(registry)).unwrap();

    let text = "- index.qmd\n- part: Intro\n  chapters:\n    - a.qmd\n    - menu:\n        - b.qmd\n";
    let yaml = parse_annotated_str(text).unwrap();
    assert!(validate_annotated(&mut validator, &yaml).unwrap().is_empty());
}

#[test]
fn unknown_key_in_closed_object_points_at_the_key() {
    let registry = SchemaRegistry::new();
    let description = SchemaDescription::parse_str(
        "object:\n  closed: true\n  properties:\n    title: string\n    toc: boolean\n",
    )
    .unwrap();
    let schema = Arc::new(SchemaBuilder::new(&registry).build(&description).unwrap());
    let mut validator = SchemaValidator::new(schema, Arc::new(registry)).unwrap();

    let yaml = parse_annotated_str("title: Hello\ntocc: true\n").unwrap();
    let diagnostics = validate_annotated(&mut validator, &yaml).unwrap();

    assert_eq!(diagnostics.len(), 1);
    let diagnostic = &diagnostics[0];
    assert_eq!(diagnostic.message_no_location, "property tocc not allowed in object");
    assert_eq!(diagnostic.start, Position::new(1, 0));
    assert_eq!(diagnostic.end, Position::new(1, 4));
}

#[test]
fn wrong_type_uses_schema_phrase() {
    let registry = SchemaRegistry::new();
    let description =
        SchemaDescription::parse_str("object:\n  properties:\n    toc: boolean\n").unwrap();
    let schema = Arc::new(SchemaBuilder::new(&registry).build(&description).unwrap());
    let mut validator = SchemaValidator::new(schema, Arc::new(registry)).unwrap();

    let yaml = parse_annotated_str("toc: maybe\n").unwrap();
    let diagnostics = validate_annotated(&mut validator, &yaml).unwrap();

    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
        diagnostics[0].message,
        "(line 1, columns 6--11): Expected field /toc to be `true` or `false`"
    );
}

#[test]
fn root_type_error_names_the_empty_path() {
    let registry = SchemaRegistry::new();
    let description =
        SchemaDescription::parse_str("object:\n  properties:\n    toc: boolean\n").unwrap();
    let schema = Arc::new(SchemaBuilder::new(&registry).build(&description).unwrap());
    let mut validator = SchemaValidator::new(schema, Arc::new(registry)).unwrap();

    let yaml = parse_annotated_str("- a\n").unwrap();
    let diagnostics = validate_annotated(&mut validator, &yaml).unwrap();

    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].instance_path, "");
    assert!(
        diagnostics[0].message_no_location.starts_with("Expected field  to "),
        "{}",
        diagnostics[0].message_no_location
    );
    assert_eq!(diagnostics[0].start, Position::new(0, 0));
}

#[test]
fn end_is_one_past_the_node() {
    let registry = SchemaRegistry::new();
    let description =
        SchemaDescription::parse_str("object:\n  properties:\n    toc: boolean\n").unwrap();
    let schema = Arc::new(SchemaBuilder::new(&registry).build(&description).unwrap());
    let mut validator = SchemaValidator::new(schema, Arc::new(registry)).unwrap();

    let yaml = parse_annotated_str("title: x\ntoc: maybe\n").unwrap();
    let diagnostics = validate_annotated(&mut validator, &yaml).unwrap();

    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].start, Position::new(1, 5));
    assert_eq!(diagnostics[0].end, Position::new(1, 10));
    assert!(diagnostics[0].message.starts_with("(line 2, columns 6--11)"));
}
