//! Structured diagnostic messages with severity, codes, and notes.

use crate::code::DiagnosticCode;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};

/// A structured diagnostic message emitted by a placement phase.
///
/// Diagnostics are the primary mechanism for reporting progress, warnings,
/// and errors while the pipeline runs. Each diagnostic carries a severity, a
/// phase-scoped code, a primary message, and optional explanatory notes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity level of this diagnostic.
    pub severity: Severity,
    /// The code identifying the type of diagnostic.
    pub code: DiagnosticCode,
    /// The main diagnostic message.
    pub message: String,
    /// Explanatory footnotes (e.g., "note: ...").
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Creates a new error diagnostic with the given code and message.
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            notes: Vec::new(),
        }
    }

    /// Creates a new warning diagnostic with the given code and message.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            notes: Vec::new(),
        }
    }

    /// Creates a new informational note with the given code and message.
    pub fn note(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Note,
            code,
            message: message.into(),
            notes: Vec::new(),
        }
    }

    /// Adds a footnote to this diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}
