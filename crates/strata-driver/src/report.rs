//! Diagnostic rendering

use std::fs;

use ariadne::{Color, Label, Report, ReportKind, Source};
use strata_project::Diagnostic;

/// Print a diagnostic to stderr with its source line. Falls back to a plain
/// `file:line:col` line when the source cannot be read.
pub fn report_diagnostic(diagnostic: &Diagnostic) {
    let source = match fs::read_to_string(&diagnostic.file) {
        Ok(source) if !source.is_empty() => source,
        _ => {
            eprintln!("{}", diagnostic);
            return;
        }
    };

    let filename = diagnostic.file.to_string_lossy().to_string();
    let start = char_offset(&source, diagnostic.line, diagnostic.column);
    let end = (start + 1).min(source.chars().count()).max(start);

    let (kind, color) = if diagnostic.kind.is_error() {
        (ReportKind::Error, Color::Red)
    } else {
        (ReportKind::Warning, Color::Yellow)
    };

    let span = (filename.as_str(), start..end);
    let printed = Report::build(kind, span.clone())
        .with_message(diagnostic.kind)
        .with_label(
            Label::new(span)
                .with_message(&diagnostic.message)
                .with_color(color),
        )
        .finish()
        .eprint((filename.as_str(), Source::from(source)));
    if printed.is_err() {
        eprintln!("{}", diagnostic);
    }
}

/// Character offset of a 1-based line and column, clamped to the source
pub fn char_offset(source: &str, line: usize, column: usize) -> usize {
    let mut offset = 0;
    for (i, text) in source.split_inclusive('\n').enumerate() {
        if i + 1 == line {
            let line_len = text.trim_end_matches('\n').chars().count();
            return offset + column.saturating_sub(1).min(line_len);
        }
        offset += text.chars().count();
    }
    offset
}
