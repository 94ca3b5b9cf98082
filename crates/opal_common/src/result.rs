//! Common result and error types for the Opal placer.

/// The standard result type for fallible placement operations.
pub type PlaceResult<T> = Result<T, PlaceError>;

/// Errors that can occur while running the placement pipeline.
///
/// [`Infeasible`](PlaceError::Infeasible) is the retry signal: the driver may
/// re-run global placement in tough mode and attempt the failing phase once
/// more. The remaining variants abort the whole placement.
#[derive(Debug, thiserror::Error)]
pub enum PlaceError {
    /// The placement database is malformed (dangling reference, empty net).
    #[error("invalid placement database: {0}")]
    InvalidInput(String),

    /// A phase produced an infeasible model; the caller may retry in tough mode.
    #[error("{phase}: problem is infeasible")]
    Infeasible {
        /// The pipeline phase that detected the infeasibility.
        phase: &'static str,
    },

    /// The pin-assignment program returned a fractional decision variable.
    #[error("pin assignment returned a non-integral solution ({value}) for net {net}")]
    NonIntegralSolution {
        /// The index of the affected net.
        net: usize,
        /// The offending fractional value.
        value: f64,
    },

    /// An internal invariant was violated; this indicates a bug in Opal.
    #[error("internal placer error: {0}")]
    Internal(String),
}

impl PlaceError {
    /// Creates an [`Internal`](PlaceError::Internal) error with the given message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns `true` if the caller may retry the placement in tough mode.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlaceError::Infeasible { .. })
    }
}
