//! Diagnostic codes scoped to the pipeline phase that emitted them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The pipeline phase a diagnostic originates from, determining its prefix.
///
/// Each phase maps to a single-character prefix used in diagnostic code
/// display (e.g., `G101` for a global-placement diagnostic).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Phase {
    /// Database construction and validation, prefixed with `D`.
    Database,
    /// Nonlinear global placement, prefixed with `G`.
    GlobalPlace,
    /// Constraint-graph legalization, prefixed with `L`.
    Legalize,
    /// Virtual-pin assignment, prefixed with `P`.
    PinAssign,
    /// Grid alignment, prefixed with `A`.
    Align,
}

impl Phase {
    /// Returns the single-character prefix for this phase.
    pub fn prefix(self) -> char {
        match self {
            Phase::Database => 'D',
            Phase::GlobalPlace => 'G',
            Phase::Legalize => 'L',
            Phase::PinAssign => 'P',
            Phase::Align => 'A',
        }
    }
}

/// A structured diagnostic code combining a phase prefix and a numeric identifier.
///
/// Displayed as the phase prefix followed by a zero-padded 3-digit number,
/// e.g., `D001`, `G102`, `P301`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct DiagnosticCode {
    /// The originating pipeline phase.
    pub phase: Phase,
    /// The numeric identifier within the phase.
    pub number: u16,
}

impl DiagnosticCode {
    /// Creates a new diagnostic code.
    pub fn new(phase: Phase, number: u16) -> Self {
        Self { phase, number }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.phase.prefix(), self.number)
    }
}
