//! Source locations and diagnostic collection.
//!
//! A single [`Diagnostics`] collector is threaded by reference through every
//! pipeline stage (lexer, parser, semantic analyzer, IR generator, IR
//! optimizer). It never fails a stage outright: it just accumulates, and
//! stops accumulating new errors past a configurable cap so a single
//! pathological input can't blow up memory while the stage still runs to
//! completion for better recovery downstream.

use std::fmt;
use std::path::PathBuf;

/// A 1-based `(filename, line, column)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: usize, column: usize) -> Self {
        SourceLocation {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        write!(f, "{s}")
    }
}

/// A single diagnostic message attached to a source location.
///
/// `notes` are diagnostics of severity [`Severity::Note`] rendered
/// immediately after this one (e.g. "previous declaration was here").
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: SourceLocation,
    pub notes: Vec<Diagnostic>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, location: SourceLocation) -> Self {
        Diagnostic {
            severity,
            message: message.into(),
            location,
            notes: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>, location: SourceLocation) -> Self {
        Self::new(Severity::Error, message, location)
    }

    pub fn warning(message: impl Into<String>, location: SourceLocation) -> Self {
        Self::new(Severity::Warning, message, location)
    }

    pub fn with_note(mut self, message: impl Into<String>, location: SourceLocation) -> Self {
        self.notes.push(Diagnostic::new(Severity::Note, message, location));
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {}: {}",
            self.location, self.severity, self.message
        )?;
        for note in &self.notes {
            write!(f, "{note}")?;
        }
        Ok(())
    }
}

/// Default cap on the number of errors a collector will accept before it
/// starts silently dropping new ones (warnings and notes are never capped).
pub const DEFAULT_ERROR_CAP: usize = 100;

/// Append-only diagnostic collector shared across pipeline stages.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    error_count: usize,
    error_cap: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_CAP)
    }
}

impl Diagnostics {
    pub fn new(error_cap: usize) -> Self {
        Diagnostics {
            items: Vec::new(),
            error_count: 0,
            error_cap,
        }
    }

    /// Push a diagnostic. Errors past the cap are dropped; warnings and
    /// notes are always recorded.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Error {
            if self.error_count >= self.error_cap {
                return;
            }
            self.error_count += 1;
        }
        self.items.push(diagnostic);
    }

    pub fn error(&mut self, message: impl Into<String>, location: SourceLocation) {
        self.push(Diagnostic::error(message, location));
    }

    pub fn warning(&mut self, message: impl Into<String>, location: SourceLocation) {
        self.push(Diagnostic::warning(message, location));
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn is_capped(&self) -> bool {
        self.error_count >= self.error_cap
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Render diagnostics as `<file>:<line>:<col>: <severity>: <message>` lines,
/// optionally with a source-line excerpt and a caret indicator.
pub fn format_diagnostics(diagnostics: &Diagnostics, source: Option<&str>, color: bool) -> String {
    let mut out = String::new();
    for d in diagnostics.iter() {
        render_one(&mut out, d, source, color);
    }
    out
}

fn render_one(out: &mut String, d: &Diagnostic, source: Option<&str>, color: bool) {
    use std::fmt::Write as _;

    let (sev_color, reset) = if color {
        let c = match d.severity {
            Severity::Error => "\x1b[1;31m",
            Severity::Warning => "\x1b[1;33m",
            Severity::Note => "\x1b[1;36m",
        };
        (c, "\x1b[0m")
    } else {
        ("", "")
    };

    let _ = writeln!(
        out,
        "{}:{}:{}: {sev_color}{}{reset}: {}",
        d.location.file.display(),
        d.location.line,
        d.location.column,
        d.severity,
        d.message
    );

    if let Some(source) = source {
        if let Some(line) = source.lines().nth(d.location.line.saturating_sub(1)) {
            let _ = writeln!(out, "    {line}");
            let caret_col = d.location.column.saturating_sub(1);
            let _ = writeln!(out, "    {}^", " ".repeat(caret_col));
        }
    }

    for note in &d.notes {
        render_one(out, note, source, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: usize, col: usize) -> SourceLocation {
        SourceLocation::new("test.c", line, col)
    }

    #[test]
    fn collector_counts_only_errors() {
        let mut d = Diagnostics::default();
        d.error("bad thing", loc(1, 1));
        d.warning("meh", loc(2, 1));
        assert_eq!(d.error_count(), 1);
        assert_eq!(d.len(), 2);
        assert!(d.has_errors());
    }

    #[test]
    fn collector_caps_errors_but_keeps_running() {
        let mut d = Diagnostics::new(2);
        for i in 0..5 {
            d.error(format!("err {i}"), loc(i, 1));
        }
        assert_eq!(d.error_count(), 2);
        assert_eq!(d.len(), 2);
        assert!(d.is_capped());
    }

    #[test]
    fn warnings_never_capped() {
        let mut d = Diagnostics::new(1);
        d.error("e", loc(1, 1));
        for i in 0..10 {
            d.warning(format!("w{i}"), loc(i, 1));
        }
        assert_eq!(d.error_count(), 1);
        assert_eq!(d.len(), 11);
    }

    #[test]
    fn display_format_matches_spec() {
        let diag = Diagnostic::error("undeclared identifier x", loc(3, 12));
        let rendered = diag.to_string();
        assert_eq!(rendered, "test.c:3:12: error: undeclared identifier x\n");
    }

    #[test]
    fn note_renders_after_parent() {
        let diag = Diagnostic::error("redeclaration of x", loc(5, 1))
            .with_note("previous declaration here", loc(2, 1));
        let rendered = diag.to_string();
        assert!(rendered.contains("error: redeclaration of x"));
        assert!(rendered.contains("note: previous declaration here"));
    }
}
