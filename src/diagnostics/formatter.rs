use serde::Serialize;

use super::{Diagnostic, DiagnosticCode, FileCache, Label, LineCol, Severity, Span};

pub const JSON_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorFormat {
    Human,
    Json,
    Short,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatOptions {
    pub format: ErrorFormat,
    pub color: ColorMode,
    pub is_terminal: bool,
}

impl FormatOptions {
    #[must_use]
    pub fn use_color(self) -> bool {
        match self.color {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => self.is_terminal,
        }
    }
}

/// Render a collection of diagnostics to a single string.
#[must_use]
pub fn format_diagnostics(
    diagnostics: &[Diagnostic],
    files: &FileCache,
    options: FormatOptions,
) -> String {
    let mut rendered = String::new();
    let use_color = options.use_color();
    for (index, diagnostic) in diagnostics.iter().enumerate() {
        if index > 0 {
            rendered.push('\n');
        }
        let chunk = match options.format {
            ErrorFormat::Human => render_human(diagnostic, files, use_color),
            ErrorFormat::Short => render_short(diagnostic, files),
            ErrorFormat::Json => render_json(diagnostic, files),
        };
        rendered.push_str(&chunk);
    }
    rendered
}

fn render_human(diagnostic: &Diagnostic, files: &FileCache, color: bool) -> String {
    let mut out = String::new();
    let (path, location) = locate_primary(diagnostic, files);
    out.push_str(&format_header(diagnostic, color));
    out.push('\n');
    out.push_str(&format_location_arrow(&path, location.as_ref()));
    if let Some(label) = diagnostic.primary_label.as_ref() {
        out.push_str(&render_snippet(label, files));
    }
    for label in &diagnostic.secondary_labels {
        out.push_str(&render_snippet(label, files));
    }
    for note in &diagnostic.notes {
        out.push_str(&format!("\nnote: {note}"));
    }
    out
}

fn render_short(diagnostic: &Diagnostic, files: &FileCache) -> String {
    let (path, location) = locate_primary(diagnostic, files);
    let severity = diagnostic.severity.as_str();
    let code = diagnostic
        .code
        .as_ref()
        .map_or("UNKNOWN", |c| c.code.as_str());
    let (line, column) = location.map_or_else(
        || ("?".into(), "?".into()),
        |loc| (loc.line.to_string(), loc.column.to_string()),
    );
    let mut out = format!(
        "{}:{}:{}: {}[{code}]: {}",
        path, line, column, severity, diagnostic.message
    );
    if !diagnostic.notes.is_empty() {
        out.push_str(&format!(" (notes: {})", diagnostic.notes.len()));
    }
    out
}

#[derive(Serialize)]
struct JsonSpan {
    path: String,
    line: usize,
    column: usize,
    start: usize,
    end: usize,
}

impl JsonSpan {
    fn from_span(span: Span, files: &FileCache) -> Option<Self> {
        let path = files.path(span.file_id)?.display().to_string();
        let loc = files.line_col(span.file_id, span.start)?;
        Some(Self {
            path,
            line: loc.line,
            column: loc.column,
            start: span.start,
            end: span.end,
        })
    }
}

#[derive(Serialize)]
struct JsonLabel {
    message: String,
    primary: bool,
    span: Option<JsonSpan>,
}

impl JsonLabel {
    fn from_label(label: &Label, files: &FileCache) -> Self {
        Self {
            message: label.message.clone(),
            primary: label.is_primary,
            span: JsonSpan::from_span(label.span, files),
        }
    }
}

#[derive(Serialize)]
struct JsonDiagnostic {
    version: String,
    severity: String,
    code: Option<DiagnosticCode>,
    message: String,
    primary_span: Option<JsonSpan>,
    labels: Vec<JsonLabel>,
    notes: Vec<String>,
}

fn render_json(diagnostic: &Diagnostic, files: &FileCache) -> String {
    let primary_span = diagnostic
        .primary_label
        .as_ref()
        .and_then(|label| JsonSpan::from_span(label.span, files));
    let mut labels = Vec::new();
    if let Some(label) = diagnostic.primary_label.as_ref() {
        labels.push(JsonLabel::from_label(label, files));
    }
    for label in &diagnostic.secondary_labels {
        labels.push(JsonLabel::from_label(label, files));
    }
    let payload = JsonDiagnostic {
        version: JSON_SCHEMA_VERSION.to_string(),
        severity: diagnostic.severity.as_str().to_string(),
        code: diagnostic.code.clone(),
        message: diagnostic.message.clone(),
        primary_span,
        labels,
        notes: diagnostic.notes.clone(),
    };
    serde_json::to_string(&payload).unwrap_or_else(|_| "{}".into())
}

fn format_header(diagnostic: &Diagnostic, color: bool) -> String {
    let severity = diagnostic.severity.as_str();
    let code = diagnostic
        .code
        .as_ref()
        .map_or("UNKNOWN", |c| c.code.as_str());
    let prefix = if color {
        colorize(severity, severity_color(diagnostic.severity))
    } else {
        severity.to_string()
    };
    format!("{prefix}[{code}]: {}", diagnostic.message)
}

fn format_location_arrow(path: &str, loc: Option<&LineCol>) -> String {
    match loc {
        Some(loc) => format!("  --> {path}:{}:{}\n", loc.line, loc.column),
        None => format!("  --> {path}\n"),
    }
}

fn render_snippet(label: &Label, files: &FileCache) -> String {
    let mut out = String::new();
    let Some(file) = files.get(label.span.file_id) else {
        return out;
    };
    let Some(loc) = file.line_col(label.span.start) else {
        return out;
    };
    if let Some(line) = file.line(loc.line) {
        let display_line = line.trim_end_matches('\n');
        let caret_count = label
            .span
            .end
            .saturating_sub(label.span.start)
            .clamp(1, display_line.len().max(1));
        out.push_str(&format!("{:>4} | {display_line}\n", loc.line));
        out.push_str(&format!(
            "{:>4} | {}{} {}\n",
            "",
            " ".repeat(loc.column.saturating_sub(1)),
            "^".repeat(caret_count),
            label.message
        ));
    }
    out
}

fn locate_primary(diagnostic: &Diagnostic, files: &FileCache) -> (String, Option<LineCol>) {
    if let Some(label) = diagnostic.primary_label.as_ref() {
        if let Some(path) = files.path(label.span.file_id) {
            let loc = files.line_col(label.span.file_id, label.span.start);
            return (path.display().to_string(), loc);
        }
    }
    ("<unknown>".to_string(), None)
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Error | Severity::InternalError => "\x1b[31m",
        Severity::Warning => "\x1b[33m",
        Severity::Note => "\x1b[36m",
    }
}

fn colorize(text: &str, color: &str) -> String {
    format!("{color}{text}\x1b[0m")
}
