//! Outer-loop policies for global placement.
//!
//! The outer loop encloses the first-order solve and adjusts the penalty
//! multipliers and the smoothing parameters between inner solves. Policies
//! are tagged variants held by value: multiplier initialization, multiplier
//! update, smoothing-parameter update, and the outer stop conditions.

use crate::global::{FamilyNorms, Violations};
use opal_db::PlacerParams;

/// Penalty-to-objective ratio targeted when matching gradient norms.
const PENALTY_RATIO_TO_OBJ: f64 = 1.0;

/// Relative gradient norm below which a term counts as negligible.
const SMALL_NORM_RATIO: f64 = 0.01;

/// Step size of the normalized subgradient multiplier update.
const SUBGRADIENT_STEP: f64 = 10.0;

/// Largest smoothing parameter of the decay schedule.
const ALPHA_MAX: f64 = 1.5;

/// Smallest smoothing parameter of the decay schedule.
const ALPHA_MIN: f64 = 0.4;

/// Overlap-area stop threshold as a ratio of total cell area.
const OVERLAP_STOP_RATIO: f64 = 0.01;

/// Out-of-boundary stop threshold as a ratio of boundary area.
const OOB_STOP_RATIO: f64 = 0.05;

/// Asymmetry stop threshold as a ratio of the square root of total cell area.
const ASYM_STOP_RATIO: f64 = 0.05;

/// Numerical floor below which a value counts as zero.
const TOL: f64 = 1e-9;

/// The penalty multipliers of the global-placement objective.
///
/// The wirelength and alignment multipliers stay constant across the outer
/// loop; the overlap, boundary, and asymmetry multipliers are varied.
#[derive(Debug, Clone)]
pub(crate) struct MultiplierSet {
    /// Constant wirelength multiplier.
    pub hpwl: f64,
    /// Constant signal-alignment multiplier.
    pub cos: f64,
    /// Varied overlap multiplier.
    pub ovl: f64,
    /// Varied out-of-boundary multiplier.
    pub oob: f64,
    /// Varied asymmetry multiplier.
    pub asym: f64,
    /// Per-term normalization factors recorded at the first iteration.
    normalize: [f64; 3],
}

/// How the multipliers are initialized before the first inner solve.
pub(crate) enum MultiplierInit {
    /// Take the configured initial values as they are.
    HardCoded,
    /// Match each penalty's gradient norm against the wirelength gradient.
    MatchGradientNorm,
}

impl MultiplierInit {
    /// Builds the initial multiplier set.
    ///
    /// Tough mode doubles every varied multiplier. With gradient-norm
    /// matching, a term whose norm is negligible relative to the wirelength
    /// norm falls back to the largest penalty norm.
    pub fn init(&self, norms: &FamilyNorms, params: &PlacerParams, tough: bool) -> MultiplierSet {
        let mut mult = match self {
            MultiplierInit::HardCoded => MultiplierSet {
                hpwl: params.lambda_hpwl_init,
                cos: params.lambda_hpwl_init,
                ovl: params.lambda_ovl_init,
                oob: params.lambda_oob_init,
                asym: params.lambda_asym_init,
                normalize: [1.0; 3],
            },
            MultiplierInit::MatchGradientNorm => {
                let hpwl = 1.0;
                let hpwl_norm = norms.hpwl;
                if hpwl_norm < TOL {
                    // Degenerate placement; fall back to unit multipliers.
                    MultiplierSet {
                        hpwl: 1.0,
                        cos: 1.0,
                        ovl: 1.0,
                        oob: 1.0,
                        asym: 1.0,
                        normalize: [1.0; 3],
                    }
                } else {
                    let target = hpwl * hpwl_norm * PENALTY_RATIO_TO_OBJ;
                    let small = SMALL_NORM_RATIO * hpwl_norm;
                    let max_penalty_norm = norms.ovl.max(small);
                    let pick = |norm: f64| {
                        if norm > small {
                            target / norm
                        } else {
                            target / max_penalty_norm
                        }
                    };
                    MultiplierSet {
                        hpwl,
                        cos: if norms.cos > small {
                            hpwl * hpwl_norm / norms.cos
                        } else {
                            hpwl
                        },
                        ovl: pick(norms.ovl),
                        oob: pick(norms.oob),
                        asym: pick(norms.asym),
                        normalize: [1.0; 3],
                    }
                }
            }
        };
        if tough {
            mult.ovl *= 2.0;
            mult.oob *= 2.0;
            mult.asym *= 2.0;
        }
        mult
    }
}

impl MultiplierSet {
    /// A unit multiplier set, used as the placeholder before initialization.
    pub fn unit() -> Self {
        Self {
            hpwl: 1.0,
            cos: 1.0,
            ovl: 1.0,
            oob: 1.0,
            asym: 1.0,
            normalize: [1.0; 3],
        }
    }

    /// Records the first-iteration normalization factors for the update rule.
    ///
    /// The overlap and asymmetry subgradients are normalized by the inverse
    /// of their raw first-iteration values so the three penalty terms
    /// contribute comparably; the boundary term keeps a unit factor because
    /// it is usually near zero at the start.
    pub fn init_normalization(&mut self, raw_ovl: f64, raw_asym: f64) {
        self.normalize = [
            if raw_ovl > TOL { self.ovl / raw_ovl } else { 1.0 },
            1.0,
            if raw_asym > TOL { self.asym / raw_asym } else { 1.0 },
        ];
    }

    /// Subgradient multiplier update, normalized by first-iteration values.
    ///
    /// A term's multiplier only grows while its exact violation still exceeds
    /// its configured threshold; the overlap multiplier clamps to the
    /// overlap-specific ceiling and the others to the generic ceiling.
    pub fn update(
        &mut self,
        raw_ovl: f64,
        raw_oob: f64,
        raw_asym: f64,
        violations: &Violations,
        params: &PlacerParams,
    ) {
        if violations.ovl_area > params.ovl_threshold * violations.total_cell_area {
            self.ovl = (self.ovl + SUBGRADIENT_STEP * raw_ovl * self.normalize[0])
                .min(params.lambda_maxovl);
        }
        if violations.oob_area > params.oob_threshold * violations.boundary_area {
            self.oob =
                (self.oob + SUBGRADIENT_STEP * raw_oob * self.normalize[1]).min(params.lambda_max);
        }
        if violations.asym_dist > params.asym_threshold * violations.total_cell_area.sqrt() {
            self.asym = (self.asym + SUBGRADIENT_STEP * raw_asym * self.normalize[2])
                .min(params.lambda_max);
        }
    }
}

/// The smoothing parameters of the wirelength, overlap, and boundary terms.
///
/// Each parameter is mapped from its term's raw objective by
/// `alpha(f) = exp(C * f) + alpha_min - 1` with
/// `C = ln(alpha_max - alpha_min + 1) / f0`, so the smoothing starts at
/// `alpha_max` and sharpens toward `alpha_min` as the objective shrinks.
#[derive(Debug, Clone)]
pub(crate) struct AlphaSet {
    /// Wirelength smoothing.
    pub hpwl: f64,
    /// Overlap smoothing.
    pub ovl: f64,
    /// Boundary smoothing.
    pub oob: f64,
    consts: [f64; 3],
}

impl AlphaSet {
    /// Builds the schedule from the raw objectives at iteration zero.
    pub fn init(raw_objs: [f64; 3]) -> Self {
        let scale = (ALPHA_MAX - ALPHA_MIN + 1.0).ln();
        let mut consts = [0.0; 3];
        for (c, &f0) in consts.iter_mut().zip(raw_objs.iter()) {
            *c = if f0 < TOL { -1.0 } else { scale / f0 };
        }
        Self {
            hpwl: ALPHA_MAX,
            ovl: ALPHA_MAX,
            oob: ALPHA_MAX,
            consts,
        }
    }

    /// Re-maps each smoothing parameter from its term's current raw objective.
    pub fn update(&mut self, raw_objs: [f64; 3]) {
        let alphas = [&mut self.hpwl, &mut self.ovl, &mut self.oob];
        for ((alpha, &c), &f) in alphas.into_iter().zip(self.consts.iter()).zip(raw_objs.iter()) {
            if c < TOL {
                continue;
            }
            *alpha = if f < TOL {
                ALPHA_MAX
            } else {
                ((c * f).exp() + ALPHA_MIN - 1.0).min(ALPHA_MAX)
            };
        }
    }
}

/// A stop test for the outer loop; any member stopping stops the loop.
pub(crate) enum OuterStop {
    /// Stop after a fixed number of outer iterations.
    MaxIterations {
        /// The iteration budget.
        max: usize,
        /// Iterations consumed so far.
        cur: usize,
    },
    /// Stop once all three exact violations are small.
    ViolationsSmall,
}

impl OuterStop {
    /// Advances this condition with the latest violations and reports whether to stop.
    pub fn should_stop(&mut self, violations: &Violations) -> bool {
        match self {
            OuterStop::MaxIterations { max, cur } => {
                *cur += 1;
                *cur >= *max
            }
            OuterStop::ViolationsSmall => {
                violations.ovl_area <= OVERLAP_STOP_RATIO * violations.total_cell_area
                    && violations.oob_area <= OOB_STOP_RATIO * violations.boundary_area
                    && violations.asym_dist
                        <= ASYM_STOP_RATIO * violations.total_cell_area.sqrt()
            }
        }
    }
}

/// Checks every stop condition; returns `true` if any of them fires.
pub(crate) fn outer_stopped(stops: &mut [OuterStop], violations: &Violations) -> bool {
    let mut stop = false;
    for s in stops.iter_mut() {
        if s.should_stop(violations) {
            stop = true;
        }
    }
    stop
}
