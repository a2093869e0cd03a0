//! Whole requests through `YamlIntelligence`, using the bundled schemas

use cellsense_analysis::{CompletionKind, CompletionResult};
use cellsense_intelligence::{
    AutomationContext, AutomationError, CursorPosition, FileType, ReadYamlError,
    YamlIntelligence,
};
use cellsense_parser::text::Position;
use cellsense_parser::MappedString;
use rstest::rstest;

fn intelligence() -> YamlIntelligence {
    YamlIntelligence::with_defaults().unwrap()
}

fn context(filetype: FileType, code: &str, row: usize, column: usize) -> AutomationContext {
    let line = code
        .split('\n')
        .nth(row)
        .map(|line| &line[..column.min(line.len())])
        .unwrap_or_default();
    AutomationContext::new(filetype, code, CursorPosition::new(row, column)).with_line(line)
}

fn values(result: &CompletionResult) -> Vec<&str> {
    result.completions.iter().map(|c| c.value.as_str()).collect()
}

const FRONT_MATTER_ERROR: &str = "---\ntitle: Hello\ntoc: maybe\n---\n\nSome text.\n";

#[tokio::test]
async fn front_matter_lint_reports_in_document_coordinates() {
    let intelligence = intelligence();
    let request = context(FileType::Markdown, FRONT_MATTER_ERROR, 5, 0);
    let diagnostics = intelligence.get_lint(&request).await.unwrap();

    assert_eq!(diagnostics.len(), 1, "{:#?}", diagnostics);
    assert_eq!(diagnostics[0].keyword(), "type");
    assert_eq!(diagnostics[0].start, Position::new(2, 5));
    assert_eq!(diagnostics[0].end, Position::new(2, 10));
}

#[rstest]
#[case(None, 1)]
#[case(Some(true), 1)]
#[case(Some(false), 0)]
#[tokio::test]
async fn diagnostics_on_the_cursor_line_wait_unless_explicit(
    #[case] explicit: Option<bool>,
    #[case] expected: usize,
) {
    let intelligence = intelligence();
    let mut request = context(FileType::Markdown, FRONT_MATTER_ERROR, 2, 10);
    request.explicit = explicit;
    let diagnostics = intelligence.get_lint(&request).await.unwrap();
    assert_eq!(diagnostics.len(), expected);
}

#[tokio::test]
async fn diagnostics_elsewhere_survive_implicit_lint() {
    let intelligence = intelligence();
    let request = context(FileType::Markdown, FRONT_MATTER_ERROR, 1, 3).with_explicit(false);
    let diagnostics = intelligence.get_lint(&request).await.unwrap();
    assert_eq!(diagnostics.len(), 1);
}

#[tokio::test]
async fn front_matter_key_completion() {
    let intelligence = intelligence();
    let request = context(FileType::Markdown, "---\ntitle: x\nto\n---\n", 2, 2);
    let result = intelligence.get_completions(&request).await.unwrap();

    assert_eq!(result.token, "to");
    assert!(values(&result).contains(&"toc: "));
    assert!(values(&result).contains(&"toc-depth: "));
    assert!(result.completions.iter().all(|c| c.kind == CompletionKind::Key));
    assert!(result.cacheable);
}

#[tokio::test]
async fn execute_fields_complete_only_under_execute() {
    let intelligence = intelligence();

    let top = context(FileType::Markdown, "---\nec\n---\n", 1, 2);
    let result = intelligence.get_completions(&top).await.unwrap();
    assert!(!values(&result).contains(&"echo: "));

    let nested = context(FileType::Markdown, "---\nexecute:\n  ec\n---\n", 2, 4);
    let result = intelligence.get_completions(&nested).await.unwrap();
    assert!(values(&result).contains(&"echo: "), "{:?}", values(&result));
}

#[rstest]
#[case(&["pdf"], true)]
#[case(&["html"], false)]
#[case(&[], true)]
#[tokio::test]
async fn completions_follow_target_formats(#[case] formats: &[&str], #[case] offered: bool) {
    let intelligence = intelligence();
    let request =
        context(FileType::Markdown, "---\ngeo\n---\n", 1, 3).with_formats(formats.iter().copied());
    let result = intelligence.get_completions(&request).await.unwrap();
    assert_eq!(values(&result).contains(&"geometry: "), offered);
}

#[rstest]
#[case(0)]
#[case(2)]
#[tokio::test]
async fn no_completions_on_delimiter_lines(#[case] row: usize) {
    let intelligence = intelligence();
    let request = context(FileType::Markdown, "---\ntitle: x\n---\n", row, 3);
    let result = intelligence.get_completions(&request).await.unwrap();
    assert!(result.completions.is_empty());
    assert!(!result.cacheable);
}

#[tokio::test]
async fn prose_offers_nothing() {
    let intelligence = intelligence();
    let request = context(FileType::Markdown, "---\ntitle: x\n---\n\nSome prose\n", 4, 4);
    let result = intelligence.get_completions(&request).await.unwrap();
    assert!(result.completions.is_empty());
}

#[tokio::test]
async fn math_cells_degrade_to_none() {
    let intelligence = intelligence();
    let request = context(FileType::Markdown, "text\n\n$$\nx^2\n$$\n", 3, 1);

    assert!(intelligence.get_completions(&request).await.is_none());
    let err = intelligence.completions(&request).await.unwrap_err();
    assert!(matches!(err, AutomationError::UnsupportedCell(_)));
}

const PYTHON_CELL: &str = "---\ntitle: x\n---\n\n```{python}\n#| ec\nprint(1)\n```\n";

#[tokio::test]
async fn code_cell_options_complete_against_engine_schema() {
    let intelligence = intelligence();
    let request = context(FileType::Markdown, PYTHON_CELL, 5, 5);
    let result = intelligence.get_completions(&request).await.unwrap();
    assert_eq!(result.token, "ec");
    assert!(values(&result).contains(&"echo: "), "{:?}", values(&result));
}

#[tokio::test]
async fn cursor_in_cell_body_offers_nothing() {
    let intelligence = intelligence();
    let request = context(FileType::Markdown, PYTHON_CELL, 6, 3);
    let result = intelligence.get_completions(&request).await.unwrap();
    assert!(result.completions.is_empty());
}

#[rstest]
#[case(None, false)]
#[case(Some("knitr"), true)]
#[case(Some("jupyter"), false)]
#[tokio::test]
async fn engine_specific_options(#[case] engine: Option<&str>, #[case] offered: bool) {
    let intelligence = intelligence();
    let code = "```{r}\n#| pu\nplot(1)\n```\n";
    let mut request = context(FileType::Markdown, code, 1, 5);
    request.engine = engine.map(str::to_string);
    let result = intelligence.get_completions(&request).await.unwrap();
    assert_eq!(values(&result).contains(&"purl: "), offered);
}

#[tokio::test]
async fn code_cell_option_lint() {
    let intelligence = intelligence();
    let code = "Intro\n\n```{python}\n#| label: fig-a\n#| fig-width: wide\nplot()\n```\n";
    let request = context(FileType::Markdown, code, 0, 0);
    let diagnostics = intelligence.get_lint(&request).await.unwrap();

    assert_eq!(diagnostics.len(), 1, "{:#?}", diagnostics);
    assert_eq!(diagnostics[0].start, Position::new(4, 14));
    assert_eq!(diagnostics[0].keyword(), "type");
}

#[tokio::test]
async fn union_valued_option_failing_every_branch_is_not_reported() {
    let intelligence = intelligence();
    let code = "```{python}\n#| echo: 3\nx = 1\n```\n";
    let request = context(FileType::Markdown, code, 0, 0);
    let diagnostics = intelligence.get_lint(&request).await.unwrap();
    assert!(diagnostics.is_empty());
}

#[tokio::test]
async fn knitr_style_options_are_skipped() {
    let intelligence = intelligence();
    let code = "```{r}\n#| label, echo=FALSE\nx <- 1\n```\n";

    let lint = intelligence
        .get_lint(&context(FileType::Markdown, code, 0, 0))
        .await
        .unwrap();
    assert!(lint.is_empty());

    let completions = intelligence
        .get_completions(&context(FileType::Markdown, code, 1, 8))
        .await
        .unwrap();
    assert!(completions.completions.is_empty());
}

#[tokio::test]
async fn script_names_its_language_on_the_first_line() {
    let intelligence = intelligence();
    let code = "```{r}\n#| fig-width: wide\nplot(1)\n";
    let diagnostics = intelligence
        .get_lint(&context(FileType::Script, code, 0, 0))
        .await
        .unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].start, Position::new(1, 14));

    let unnamed = "plot(1)\n#| fig-width: wide\n";
    let diagnostics = intelligence
        .get_lint(&context(FileType::Script, unnamed, 0, 0))
        .await
        .unwrap();
    assert!(diagnostics.is_empty());
}

#[tokio::test]
async fn script_with_explicit_language() {
    let intelligence = intelligence();
    let code = "//| ec\nconsole.log(1)\n";
    let request = context(FileType::Script, code, 0, 6).with_language("js");
    let result = intelligence.get_completions(&request).await.unwrap();
    assert!(values(&result).contains(&"echo: "));
}

#[tokio::test]
async fn yaml_files_use_project_config_unless_qmd() {
    let intelligence = intelligence();
    let project = "project:\n  type: website\n  output-dr: _site\n";
    let request = context(FileType::Yaml, project, 0, 0).with_path("_quarto.yml");
    let diagnostics = intelligence.get_lint(&request).await.unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
        diagnostics[0].message_no_location,
        "property output-dr not allowed in object"
    );
    assert_eq!(diagnostics[0].start, Position::new(2, 2));

    let front_matter = "---\ntitle: x\ntoc: maybe\n---\n";
    let request = context(FileType::Yaml, front_matter, 0, 0).with_path("index.qmd");
    let diagnostics = intelligence.get_lint(&request).await.unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].start, Position::new(2, 5));
}

#[tokio::test]
async fn book_chapters_report_only_the_missing_field() {
    let intelligence = intelligence();
    let config = "book:\n  chapters:\n    - index.qmd\n    - part: Intro\n";
    let request = context(FileType::Yaml, config, 0, 0).with_path("_quarto.yml");
    let diagnostics = intelligence.get_lint(&request).await.unwrap();

    assert_eq!(diagnostics.len(), 1, "{:#?}", diagnostics);
    assert_eq!(diagnostics[0].keyword(), "required");
    assert_eq!(diagnostics[0].instance_path, "/book/chapters/1");
    assert_eq!(diagnostics[0].start.line, 3);
}

#[tokio::test]
async fn warm_up_compiles_top_level_validators() {
    let intelligence = intelligence();
    intelligence.warm_up().await.unwrap();
    assert_eq!(intelligence.queue().compiled().await, 5);
}

#[tokio::test]
async fn validated_read_returns_value() {
    let intelligence = intelligence();
    let schema = intelligence.schemas().await.unwrap().project_config.clone();
    let yaml = MappedString::new("project:\n  type: book\n");
    let value = intelligence
        .read_and_validate_yaml_from_mapped_string(&yaml, &schema, "Invalid project")
        .await
        .unwrap();
    assert_eq!(value["project"]["type"], "book");
}

#[tokio::test]
async fn validated_read_reports_with_excerpt() {
    let intelligence = intelligence();
    let schema = intelligence.schemas().await.unwrap().project_config.clone();
    let yaml = MappedString::with_file_name(
        "project:\n  type: website\n  output-dr: _site\n",
        "_quarto.yml",
    );
    let err = intelligence
        .read_and_validate_yaml_from_mapped_string(&yaml, &schema, "Invalid project configuration")
        .await
        .unwrap_err();
    let failure = match err {
        ReadYamlError::Invalid(failure) => failure,
        other => panic!("expected a validation failure, got {other:?}"),
    };
    assert_eq!(failure.diagnostics.len(), 1);
    let lines: Vec<&str> = failure.message.lines().collect();
    assert_eq!(lines[0], "Invalid project configuration");
    assert!(lines.contains(&"In file _quarto.yml"));
    assert!(lines.contains(&"3:   output-dr: _site"));
    assert_eq!(*lines.last().unwrap(), "     ^^^^^^^^^");
}

#[tokio::test]
async fn validate_yaml_false_skips_validation() {
    let intelligence = intelligence();
    let schema = intelligence.schemas().await.unwrap().front_matter.clone();
    let yaml = MappedString::new("validate-yaml: false\ntoc: maybe\n");
    let value = intelligence
        .read_and_validate_yaml_from_mapped_string(&yaml, &schema, "Invalid metadata")
        .await
        .unwrap();
    assert_eq!(value["toc"], "maybe");
}

#[tokio::test]
async fn validated_read_from_file() {
    let intelligence = intelligence();
    let schema = intelligence.schemas().await.unwrap().front_matter.clone();

    let path = std::env::temp_dir().join(format!("cellsense-{}-meta.yml", std::process::id()));
    tokio::fs::write(&path, "title: Hello\ntoc: true\n").await.unwrap();
    let value = intelligence
        .read_and_validate_yaml_from_file(&path, &schema, "Invalid metadata")
        .await
        .unwrap();
    assert_eq!(value["title"], "Hello");
    tokio::fs::remove_file(&path).await.unwrap();

    let missing = intelligence
        .read_and_validate_yaml_from_file(&path, &schema, "Invalid metadata")
        .await
        .unwrap_err();
    assert!(matches!(
        missing,
        ReadYamlError::Automation(AutomationError::Io { .. })
    ));
}
