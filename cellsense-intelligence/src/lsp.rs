//! Conversions into `lsp-types`, for bridges that speak the language server protocol

use cellsense_analysis::{
    CompletionCandidate, CompletionKind, CompletionResult, LocalizedDiagnostic,
};
use cellsense_parser::text::Position as TextPosition;
use lsp_types::{
    Command, CompletionItem, CompletionItemKind, CompletionList, Diagnostic, DiagnosticSeverity,
    Documentation, MarkupContent, MarkupKind, NumberOrString, Position, Range,
};

pub const DIAGNOSTIC_SOURCE: &str = "cellsense";

/// Client command that reopens the completion menu
pub const TRIGGER_SUGGEST: &str = "editor.action.triggerSuggest";

fn to_lsp_position(position: TextPosition) -> Position {
    Position::new(
        u32::try_from(position.line).unwrap_or(u32::MAX),
        u32::try_from(position.column).unwrap_or(u32::MAX),
    )
}

pub fn to_lsp_completion_item(candidate: &CompletionCandidate) -> CompletionItem {
    let kind = match candidate.kind {
        CompletionKind::Key => CompletionItemKind::PROPERTY,
        CompletionKind::Value => CompletionItemKind::VALUE,
    };
    let command = candidate.suggest_on_accept.then(|| Command {
        title: "Suggest".into(),
        command: TRIGGER_SUGGEST.into(),
        arguments: None,
    });
    CompletionItem {
        label: candidate.display.clone(),
        kind: Some(kind),
        detail: (!candidate.description.is_empty()).then(|| candidate.description.clone()),
        documentation: candidate.documentation.as_ref().map(|text| {
            Documentation::MarkupContent(MarkupContent {
                kind: MarkupKind::Markdown,
                value: text.clone(),
            })
        }),
        insert_text: Some(candidate.value.clone()),
        filter_text: Some(candidate.value.clone()),
        command,
        ..Default::default()
    }
}

/// `is_incomplete` is set when the client may not re-filter the result locally.
pub fn to_lsp_completion_list(result: &CompletionResult) -> CompletionList {
    CompletionList {
        is_incomplete: !result.cacheable,
        items: result.completions.iter().map(to_lsp_completion_item).collect(),
    }
}

pub fn to_lsp_diagnostic(diagnostic: &LocalizedDiagnostic) -> Diagnostic {
    Diagnostic {
        range: Range::new(
            to_lsp_position(diagnostic.start),
            to_lsp_position(diagnostic.end),
        ),
        severity: Some(DiagnosticSeverity::ERROR),
        code: Some(NumberOrString::String(diagnostic.keyword().to_string())),
        source: Some(DIAGNOSTIC_SOURCE.into()),
        message: diagnostic.message_no_location.clone(),
        ..Default::default()
    }
}
