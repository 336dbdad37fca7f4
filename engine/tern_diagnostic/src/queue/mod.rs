//! Per-request diagnostic queue.
//!
//! Every pushed diagnostic is mirrored to `tracing` (notice as `info`,
//! warning as `warn`, fatal as `error`). Only diagnostics whose level is
//! in the reporting mask are retained; fatal diagnostics are always kept.

use crate::{Diagnostic, ErrorLevel, Severity};

/// Ordered collection of the diagnostics raised during one request.
#[derive(Clone, Debug)]
pub struct DiagnosticQueue {
    diagnostics: Vec<Diagnostic>,
    reporting: ErrorLevel,
}

impl Default for DiagnosticQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticQueue {
    /// Queue that retains every level.
    pub fn new() -> Self {
        Self::with_reporting(ErrorLevel::ALL)
    }

    pub fn with_reporting(reporting: ErrorLevel) -> Self {
        DiagnosticQueue {
            diagnostics: Vec::new(),
            reporting,
        }
    }

    pub fn reporting(&self) -> ErrorLevel {
        self.reporting
    }

    pub fn set_reporting(&mut self, reporting: ErrorLevel) {
        self.reporting = reporting;
    }

    /// Record a diagnostic.
    pub fn push(&mut self, diag: Diagnostic) {
        match diag.severity {
            Severity::Notice => tracing::info!(message = %diag.message, "notice"),
            Severity::Warning => tracing::warn!(message = %diag.message, "warning"),
            Severity::Fatal => tracing::error!(message = %diag.message, "fatal error"),
        }
        if diag.is_fatal() || self.reporting.contains(diag.severity.level()) {
            self.diagnostics.push(diag);
        }
    }

    pub fn notice(&mut self, message: impl Into<String>) {
        self.push(Diagnostic::notice(message));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(Diagnostic::warning(message));
    }

    pub fn fatal(&mut self, message: impl Into<String>) {
        self.push(Diagnostic::fatal(message));
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn has_fatal(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_fatal)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Number of retained diagnostics of the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// Take all retained diagnostics, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests;
