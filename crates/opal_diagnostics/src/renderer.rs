//! Diagnostic rendering for human-readable terminal output.

use crate::diagnostic::Diagnostic;
use crate::severity::Severity;

/// Trait for rendering diagnostics into formatted output strings.
pub trait DiagnosticRenderer {
    /// Renders a single diagnostic into a formatted string.
    fn render(&self, diag: &Diagnostic) -> String;
}

/// Renders diagnostics in a rustc-style terminal format.
///
/// Produces output like:
/// ```text
/// error[L010]: legalization: problem is infeasible
///    = note: horizontal constraint graph
/// ```
pub struct TerminalRenderer {
    /// Whether to use ANSI color codes in output.
    pub color: bool,
}

impl TerminalRenderer {
    /// Creates a new terminal renderer.
    pub fn new(color: bool) -> Self {
        Self { color }
    }
}

impl DiagnosticRenderer for TerminalRenderer {
    fn render(&self, diag: &Diagnostic) -> String {
        let mut out = String::new();

        // Header line: severity[CODE]: message
        if self.color {
            let color_code = match diag.severity {
                Severity::Error => "\x1b[31m",
                Severity::Warning => "\x1b[33m",
                Severity::Note => "\x1b[36m",
            };
            out.push_str(&format!(
                "{color_code}{}\x1b[0m[{}]: {}\n",
                diag.severity, diag.code, diag.message
            ));
        } else {
            out.push_str(&format!(
                "{}[{}]: {}\n",
                diag.severity, diag.code, diag.message
            ));
        }

        for note in &diag.notes {
            out.push_str(&format!("   = note: {note}\n"));
        }

        out
    }
}
