//! Thin wrapper around the linear-programming backend.
//!
//! The legalizer and the exact pin-assignment path both talk to the solver
//! through this module, so the backend stays a replaceable capability: add
//! variables, add linear constraints, solve, read the solution. The current
//! backend is the pure-Rust `minilp` simplex; it is single-threaded, so the
//! configured thread count is accepted and ignored.

use minilp::{ComparisonOp, OptimizationDirection, Problem, Variable};
use opal_common::{PlaceError, PlaceResult};

/// Comparison operator of a linear constraint.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum LpOp {
    /// Left-hand side less than or equal to the right-hand side.
    Le,
    /// Left-hand side equal to the right-hand side.
    Eq,
    /// Left-hand side greater than or equal to the right-hand side.
    Ge,
}

/// Handle to a variable of an [`LpProblem`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct LpVar(Variable);

/// A minimization problem under construction.
pub(crate) struct LpProblem {
    inner: Problem,
    phase: &'static str,
}

impl LpProblem {
    /// Creates an empty minimization problem.
    ///
    /// `phase` names the pipeline phase for error reporting; an infeasible
    /// model surfaces as [`PlaceError::Infeasible`] carrying this phase.
    pub fn minimize(phase: &'static str) -> Self {
        Self {
            inner: Problem::new(OptimizationDirection::Minimize),
            phase,
        }
    }

    /// Adds a real variable with the given objective coefficient and bounds.
    pub fn add_var(&mut self, obj_coeff: f64, lo: f64, hi: f64) -> LpVar {
        LpVar(self.inner.add_var(obj_coeff, (lo, hi)))
    }

    /// Adds a free real variable with the given objective coefficient.
    pub fn add_free_var(&mut self, obj_coeff: f64) -> LpVar {
        self.add_var(obj_coeff, f64::NEG_INFINITY, f64::INFINITY)
    }

    /// Adds a relaxed binary decision variable bounded to `[0, 1]`.
    ///
    /// The backend has no integer support; callers that need integrality must
    /// verify it on the solution values.
    pub fn add_unit_var(&mut self, obj_coeff: f64) -> LpVar {
        self.add_var(obj_coeff, 0.0, 1.0)
    }

    /// Adds the linear constraint `sum(coeff * var) op rhs`.
    pub fn add_constraint(&mut self, terms: &[(LpVar, f64)], op: LpOp, rhs: f64) {
        let expr: Vec<(Variable, f64)> = terms.iter().map(|&(v, c)| (v.0, c)).collect();
        let op = match op {
            LpOp::Le => ComparisonOp::Le,
            LpOp::Eq => ComparisonOp::Eq,
            LpOp::Ge => ComparisonOp::Ge,
        };
        self.inner.add_constraint(&expr[..], op, rhs);
    }

    /// Sets the solver thread count. The pure-Rust backend ignores this.
    pub fn set_num_threads(&mut self, _num_threads: usize) {}

    /// Solves the problem and returns the optimal solution.
    pub fn solve(self) -> PlaceResult<LpSolution> {
        match self.inner.solve() {
            Ok(solution) => Ok(LpSolution { inner: solution }),
            Err(minilp::Error::Infeasible) => Err(PlaceError::Infeasible { phase: self.phase }),
            Err(err) => Err(PlaceError::internal(format!(
                "{}: LP solver error: {err}",
                self.phase
            ))),
        }
    }
}

/// An optimal solution returned by [`LpProblem::solve`].
pub(crate) struct LpSolution {
    inner: minilp::Solution,
}

impl LpSolution {
    /// Reads the value of a variable in the optimal solution.
    pub fn value(&self, var: LpVar) -> f64 {
        self.inner[var.0]
    }

    /// The optimal objective value.
    pub fn objective(&self) -> f64 {
        self.inner.objective()
    }
}
