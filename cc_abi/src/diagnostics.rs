//! Diagnostics sink (SPEC_FULL §4.10, §7 Error Handling Design).
//!
//! Each pass reports through one `Diagnostics` instance, threaded
//! explicitly via `PassCtx` rather than any global logger. Fatal kinds
//! (everything but `SpanResolutionFailure`) should make the driver abort
//! the pipeline before the Emitter runs; `SpanResolutionFailure` is
//! recorded but lets the owning pass continue with the rest of its work.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    ParseUnsupported,
    UseAfterMove,
    CopyOfMoveOnly,
    UnknownCapture,
    SpanResolutionFailure,
    InternalAllocFailure,
}

impl DiagnosticKind {
    /// Per §7, every kind but span-resolution failure aborts the pipeline.
    pub fn is_fatal(self) -> bool {
        !matches!(self, DiagnosticKind::SpanResolutionFailure)
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub file: String,
    pub line: u32,
    pub col: Option<u32>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match self.col {
            Some(col) => write!(f, "{}:{}:{}: {}: {}", self.file, self.line, col, level, self.message),
            None => write!(f, "{}:{}: {}: {}", self.file, self.line, level, self.message),
        }
    }
}

#[derive(Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn emit(&mut self, d: Diagnostic) {
        self.entries.push(d);
    }

    pub fn error(&mut self, kind: DiagnosticKind, file: &str, line: u32, col: Option<u32>, message: impl Into<String>) {
        self.emit(Diagnostic {
            severity: Severity::Error,
            kind,
            file: file.to_string(),
            line,
            col,
            message: message.into(),
        });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn has_fatal(&self) -> bool {
        self.entries.iter().any(|d| d.kind.is_fatal())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_with_column_when_known() {
        let d = Diagnostic {
            severity: Severity::Error,
            kind: DiagnosticKind::UseAfterMove,
            file: "a.cc".into(),
            line: 4,
            col: Some(9),
            message: "use after move of slice 's'".into(),
        };
        assert_eq!(d.to_string(), "a.cc:4:9: error: use after move of slice 's'");
    }

    #[test]
    fn renders_without_column_when_unknown() {
        let d = Diagnostic {
            severity: Severity::Error,
            kind: DiagnosticKind::UseAfterMove,
            file: "a.cc".into(),
            line: 4,
            col: None,
            message: "use after move of slice 's'".into(),
        };
        assert_eq!(d.to_string(), "a.cc:4: error: use after move of slice 's'");
    }

    #[test]
    fn span_resolution_failure_is_not_fatal() {
        let mut diags = Diagnostics::new();
        diags.error(DiagnosticKind::SpanResolutionFailure, "a.cc", 1, None, "skip");
        assert!(!diags.has_fatal());
        diags.error(DiagnosticKind::UseAfterMove, "a.cc", 2, None, "boom");
        assert!(diags.has_fatal());
    }
}
