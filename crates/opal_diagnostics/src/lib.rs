//! Diagnostic creation, severity management, and rendering for the Opal placer.
//!
//! This crate provides structured [`Diagnostic`] messages with severity levels
//! and phase-scoped codes. The thread-safe [`DiagnosticSink`] accumulates
//! diagnostics while the placement pipeline runs, and [`TerminalRenderer`]
//! formats them for terminal output.

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod renderer;
pub mod severity;
pub mod sink;

pub use code::{DiagnosticCode, Phase};
pub use diagnostic::Diagnostic;
pub use renderer::{DiagnosticRenderer, TerminalRenderer};
pub use severity::Severity;
pub use sink::DiagnosticSink;
