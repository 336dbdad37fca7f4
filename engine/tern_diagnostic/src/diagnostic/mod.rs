//! Core diagnostic types.

use std::fmt;

use crate::ErrorLevel;

/// Severity of a runtime diagnostic.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Severity {
    Notice,
    Warning,
    Fatal,
}

impl Severity {
    /// The numeric level this severity is reported under.
    pub fn level(self) -> ErrorLevel {
        match self {
            Severity::Notice => ErrorLevel::NOTICE,
            Severity::Warning => ErrorLevel::WARNING,
            Severity::Fatal => ErrorLevel::ERROR,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Notice => write!(f, "notice"),
            Severity::Warning => write!(f, "warning"),
            Severity::Fatal => write!(f, "fatal error"),
        }
    }
}

/// A single notice, warning or fatal error raised while running a request.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            message: message.into(),
        }
    }

    pub fn notice(message: impl Into<String>) -> Self {
        Self::new(Severity::Notice, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, message)
    }

    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}
