//! Diagnostic infrastructure
//!
//! Every failure routes through one handler with a severity, a location,
//! and a message; related information is appended in order. Diagnostics
//! accumulate across a pass and are rendered through codespan-reporting.

use codespan_reporting::diagnostic::{Diagnostic as CsDiagnostic, Label, Severity as CsSeverity};
use codespan_reporting::files::SimpleFile;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tsir_ast::Span;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
    Remark,
}

/// Related information attached to a diagnostic, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedInfo {
    pub span: Span,
    pub message: String,
}

/// One diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub span: Span,
    pub message: String,
    pub related: Vec<RelatedInfo>,
}

impl Diagnostic {
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            span,
            message: message.into(),
            related: Vec::new(),
        }
    }

    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            span,
            message: message.into(),
            related: Vec::new(),
        }
    }

    pub fn with_related(mut self, span: Span, message: impl Into<String>) -> Self {
        self.related.push(RelatedInfo {
            span,
            message: message.into(),
        });
        self
    }
}

/// Accumulating diagnostic handler. At most one pass may finalize:
/// `take_pending` promotes the current pass's diagnostics, `clear_pending`
/// drops them (dummy passes probe and retry).
#[derive(Debug, Default)]
pub struct DiagnosticHandler {
    emitted: Vec<Diagnostic>,
    pending: Vec<Diagnostic>,
    finalized: bool,
}

impl DiagnosticHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic for the current pass.
    pub fn report(&mut self, diag: Diagnostic) {
        self.pending.push(diag);
    }

    /// Drop the current pass's diagnostics (the pass is being retried).
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Promote the current pass's diagnostics to the emitted set.
    pub fn finalize_pass(&mut self) {
        debug_assert!(!self.finalized, "diagnostics finalized twice");
        self.emitted.append(&mut self.pending);
        self.finalized = true;
    }

    pub fn emitted(&self) -> &[Diagnostic] {
        &self.emitted
    }

    pub fn pending_errors(&self) -> usize {
        self.pending
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.emitted.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.emitted
    }

    /// Render all emitted diagnostics against the source text to stderr.
    pub fn print(&self, file_name: &str, source: &str) {
        let file = SimpleFile::new(file_name, source);
        let writer = StandardStream::stderr(ColorChoice::Auto);
        let config = term::Config::default();
        for diag in &self.emitted {
            let severity = match diag.severity {
                Severity::Error => CsSeverity::Error,
                Severity::Warning => CsSeverity::Warning,
                Severity::Note => CsSeverity::Note,
                Severity::Remark => CsSeverity::Help,
            };
            let mut labels = vec![Label::primary(
                (),
                diag.span.start as usize..diag.span.end as usize,
            )];
            for related in &diag.related {
                labels.push(
                    Label::secondary((), related.span.start as usize..related.span.end as usize)
                        .with_message(related.message.clone()),
                );
            }
            let cs = CsDiagnostic::new(severity)
                .with_message(diag.message.clone())
                .with_labels(labels);
            let _ = term::emit(&mut writer.lock(), &config, &file, &cs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_cleared_by_retry() {
        let mut handler = DiagnosticHandler::new();
        handler.report(Diagnostic::error(Span::synthetic(), "unresolved: x"));
        assert_eq!(handler.pending_errors(), 1);
        handler.clear_pending();
        assert_eq!(handler.pending_errors(), 0);
        assert!(!handler.has_errors());
    }

    #[test]
    fn finalize_promotes_pending() {
        let mut handler = DiagnosticHandler::new();
        handler.report(Diagnostic::error(Span::new(1, 2), "bad"));
        handler.finalize_pass();
        assert!(handler.has_errors());
        assert_eq!(handler.emitted().len(), 1);
    }
}
