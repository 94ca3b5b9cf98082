//! First-order optimization kernels for the inner global-placement solve.
//!
//! Two variants consume the problem's objective and gradient: naive gradient
//! descent with a fixed step, and Adam with bias-corrected moment estimates.
//! The inner loop stops when any member of a composable list of convergence
//! criteria says so.

use crate::global::NlpProblem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Default step size for naive gradient descent, in placement-span units.
const GRADIENT_DESCENT_STEP: f64 = 0.001;

/// Adam step size, in placement-span units.
const ADAM_ALPHA: f64 = 0.001;

/// Adam first-moment decay rate.
const ADAM_BETA1: f64 = 0.9;

/// Adam second-moment decay rate.
const ADAM_BETA2: f64 = 0.999;

/// Adam denominator fuzz.
const ADAM_EPSILON: f64 = 1e-8;

/// A single convergence test for the inner solve.
///
/// Criteria are held by value in a list; any member asserting "stop" stops
/// the inner loop. Each criterion is reset at the start of a solve.
pub(crate) enum ConvergeCriterion {
    /// Stop after a fixed number of iterations.
    MaxIterations {
        /// The iteration budget.
        max: usize,
        /// Iterations consumed so far.
        cur: usize,
    },
    /// Stop once the relative objective improvement drops below a threshold.
    RelativeImprovement {
        /// The relative-improvement floor.
        threshold: f64,
        /// The previous objective value, if any.
        last: Option<f64>,
    },
    /// Stop when an external party raises the flag (cooperative cancellation).
    ExternalStop {
        /// The shared stop flag.
        flag: Arc<AtomicBool>,
    },
}

impl ConvergeCriterion {
    /// Resets per-solve state.
    pub fn reset(&mut self) {
        match self {
            ConvergeCriterion::MaxIterations { cur, .. } => *cur = 0,
            ConvergeCriterion::RelativeImprovement { last, .. } => *last = None,
            ConvergeCriterion::ExternalStop { .. } => {}
        }
    }

    /// Advances the criterion with the latest objective and reports whether to stop.
    pub fn should_stop(&mut self, obj: f64) -> bool {
        match self {
            ConvergeCriterion::MaxIterations { max, cur } => {
                *cur += 1;
                *cur >= *max
            }
            ConvergeCriterion::RelativeImprovement { threshold, last } => {
                let stop = match *last {
                    Some(prev) => {
                        let denom = prev.abs().max(f64::EPSILON);
                        (prev - obj) / denom < *threshold
                    }
                    None => false,
                };
                *last = Some(obj);
                stop
            }
            ConvergeCriterion::ExternalStop { flag } => flag.load(Ordering::Relaxed),
        }
    }
}

/// Checks every criterion; returns `true` if any of them stops the solve.
fn converged(criteria: &mut [ConvergeCriterion], obj: f64) -> bool {
    let mut stop = false;
    for criterion in criteria.iter_mut() {
        if criterion.should_stop(obj) {
            stop = true;
        }
    }
    stop
}

/// A first-order optimization kernel.
pub(crate) enum Optimizer {
    /// `p <- p - step * grad` with a fixed step.
    NaiveGradientDescent {
        /// The fixed step size.
        step: f64,
    },
    /// Adam with bias-corrected first and second moments.
    Adam {
        /// Step size.
        alpha: f64,
        /// First-moment decay rate.
        beta1: f64,
        /// Second-moment decay rate.
        beta2: f64,
        /// Denominator fuzz.
        epsilon: f64,
    },
}

impl Optimizer {
    /// The default gradient-descent kernel.
    pub fn gradient_descent() -> Self {
        Optimizer::NaiveGradientDescent {
            step: GRADIENT_DESCENT_STEP,
        }
    }

    /// The default Adam kernel.
    pub fn adam() -> Self {
        Optimizer::Adam {
            alpha: ADAM_ALPHA,
            beta1: ADAM_BETA1,
            beta2: ADAM_BETA2,
            epsilon: ADAM_EPSILON,
        }
    }

    /// Runs the inner solve on `problem` until the criteria stop it.
    pub fn optimize(&self, problem: &mut NlpProblem, criteria: &mut [ConvergeCriterion]) {
        for criterion in criteria.iter_mut() {
            criterion.reset();
        }
        let scale = problem.step_scale;
        match *self {
            Optimizer::NaiveGradientDescent { step } => loop {
                problem.calc_grad();
                for (pi, gi) in problem.p.iter_mut().zip(problem.grad.iter()) {
                    *pi -= step * scale * gi;
                }
                problem.calc_obj();
                if converged(criteria, problem.obj) {
                    break;
                }
            },
            Optimizer::Adam {
                alpha,
                beta1,
                beta2,
                epsilon,
            } => {
                let n = problem.p.len();
                let mut m = vec![0.0; n];
                let mut v = vec![0.0; n];
                let mut iter = 0;
                loop {
                    iter += 1;
                    problem.calc_grad();
                    let bias1 = 1.0 - beta1.powi(iter);
                    let bias2 = 1.0 - beta2.powi(iter);
                    for k in 0..n {
                        let g = problem.grad[k];
                        m[k] = beta1 * m[k] + (1.0 - beta1) * g;
                        v[k] = beta2 * v[k] + (1.0 - beta2) * g * g;
                        let mt = m[k] / bias1;
                        let vt = v[k] / bias2;
                        problem.p[k] -= alpha * scale * mt / (vt.sqrt() + epsilon);
                    }
                    problem.calc_obj();
                    if converged(criteria, problem.obj) {
                        break;
                    }
                }
            }
        }
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer::adam()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_iterations_counts_down() {
        let mut c = ConvergeCriterion::MaxIterations { max: 3, cur: 0 };
        assert!(!c.should_stop(1.0));
        assert!(!c.should_stop(1.0));
        assert!(c.should_stop(1.0));
        c.reset();
        assert!(!c.should_stop(1.0));
    }

    #[test]
    fn relative_improvement_stops_on_stall() {
        let mut c = ConvergeCriterion::RelativeImprovement {
            threshold: 0.05,
            last: None,
        };
        // First call only records
        assert!(!c.should_stop(100.0));
        // 50% improvement keeps going
        assert!(!c.should_stop(50.0));
        // 1% improvement stalls
        assert!(c.should_stop(49.5));
    }

    #[test]
    fn relative_improvement_stops_on_regression() {
        let mut c = ConvergeCriterion::RelativeImprovement {
            threshold: 0.05,
            last: None,
        };
        assert!(!c.should_stop(10.0));
        assert!(c.should_stop(11.0));
    }

    #[test]
    fn external_stop_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut c = ConvergeCriterion::ExternalStop {
            flag: Arc::clone(&flag),
        };
        assert!(!c.should_stop(1.0));
        flag.store(true, Ordering::Relaxed);
        assert!(c.should_stop(1.0));
    }

    #[test]
    fn any_member_stops_the_list() {
        let mut criteria = vec![
            ConvergeCriterion::MaxIterations { max: 100, cur: 0 },
            ConvergeCriterion::MaxIterations { max: 1, cur: 0 },
        ];
        assert!(converged(&mut criteria, 1.0));
    }

    #[test]
    fn default_is_adam() {
        match Optimizer::default() {
            Optimizer::Adam {
                alpha,
                beta1,
                beta2,
                epsilon,
            } => {
                assert_eq!(alpha, 0.001);
                assert_eq!(beta1, 0.9);
                assert_eq!(beta2, 0.999);
                assert_eq!(epsilon, 1e-8);
            }
            Optimizer::NaiveGradientDescent { .. } => panic!("default should be Adam"),
        }
    }
}
