//! Nonlinear global placement.
//!
//! Formulates placement as a differentiable objective (wirelength + smoothed
//! overlap + out-of-boundary + asymmetry penalties) over a flat coordinate
//! vector and minimizes it with a first-order kernel inside an outer
//! multiplier loop. The result is a fractional placement with small
//! violations, handed to the legalizer.

mod operators;
mod optimizer;
mod outer;

pub(crate) use optimizer::{ConvergeCriterion, Optimizer};

use operators::{build_operators, OperatorSet, VarLayout};
use outer::{outer_stopped, AlphaSet, MultiplierInit, MultiplierSet, OuterStop};

use opal_common::{PlaceResult, Rect};
use opal_db::{PlaceDb, PlacerParams};
use opal_diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink, Phase};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Extra outer iterations granted in tough mode.
const TOUGH_EXTRA_OUTER_ITER: usize = 10;

/// L2 norms of each penalty family's raw (unit multiplier) gradient.
pub(crate) struct FamilyNorms {
    /// Wirelength gradient norm.
    pub hpwl: f64,
    /// Signal-alignment gradient norm.
    pub cos: f64,
    /// Overlap gradient norm.
    pub ovl: f64,
    /// Out-of-boundary gradient norm.
    pub oob: f64,
    /// Asymmetry gradient norm.
    pub asym: f64,
}

/// Exact violation measures used by the outer stop test and threshold gating.
pub(crate) struct Violations {
    /// Summed exact pairwise overlap area.
    pub ovl_area: f64,
    /// Summed exact cell area outside the boundary.
    pub oob_area: f64,
    /// Summed exact asymmetry distance.
    pub asym_dist: f64,
    /// Total cell area of the design.
    pub total_cell_area: f64,
    /// Area of the placement boundary.
    pub boundary_area: f64,
}

impl Violations {
    /// The combined weighted violation, for monotonicity checks.
    pub fn total(&self) -> f64 {
        self.ovl_area + self.oob_area + self.asym_dist
    }
}

/// The nonlinear problem: coordinate vector, operators, multipliers, and
/// smoothing parameters, with cached objective components.
///
/// Operators and the vector live in one owning struct and communicate
/// through indices, so no reference cycles arise; everything is dropped when
/// the global-placement call returns.
pub(crate) struct NlpProblem {
    layout: VarLayout,
    /// The flat coordinate vector: x block, y block, group axis variables.
    pub p: Vec<f64>,
    /// The gradient of the weighted objective at `p`.
    pub grad: Vec<f64>,
    fixed: Vec<bool>,
    ops: OperatorSet,
    mults: MultiplierSet,
    alphas: AlphaSet,
    /// The optimizer step unit: kernels express their step sizes as
    /// fractions of the placement span, keeping convergence scale-free.
    pub step_scale: f64,
    /// The weighted objective at `p`.
    pub obj: f64,
    obj_hpwl: f64,
    obj_cos: f64,
    obj_ovl: f64,
    obj_oob: f64,
    obj_asym: f64,
    total_cell_area: f64,
    boundary_area: f64,
}

impl NlpProblem {
    /// Builds the problem from the database over the given boundary.
    ///
    /// The vector starts at the database coordinates; each group's axis
    /// variable starts at the mean of its members' current mirror centers.
    fn from_db(db: &PlaceDb, boundary: Rect) -> Self {
        let layout = VarLayout {
            num_cells: db.cells.len(),
            num_groups: db.sym_groups.len(),
        };
        let mut p = vec![0.0; layout.len()];
        for (i, cell) in db.cells.iter().enumerate() {
            p[layout.x(i)] = cell.x as f64;
            p[layout.y(i)] = cell.y as f64;
        }
        for (g, group) in db.sym_groups.iter().enumerate() {
            let mut sum = 0.0;
            let mut count = 0.0;
            for &(a, b) in &group.pairs {
                sum += (db.cell(a).center_x() + db.cell(b).center_x()) as f64 / 2.0;
                count += 1.0;
            }
            for &c in &group.self_cells {
                sum += db.cell(c).center_x() as f64;
                count += 1.0;
            }
            p[layout.axis(g)] = if count > 0.0 {
                sum / count
            } else {
                boundary.center().x as f64
            };
        }

        let bounds = (
            boundary.xlo as f64,
            boundary.ylo as f64,
            boundary.xhi as f64,
            boundary.yhi as f64,
        );
        let ops = build_operators(db, bounds);

        Self {
            layout,
            grad: vec![0.0; p.len()],
            p,
            fixed: db.cells.iter().map(|c| c.is_fixed).collect(),
            ops,
            mults: MultiplierSet::unit(),
            alphas: AlphaSet::init([1.0, 1.0, 1.0]),
            step_scale: (boundary.width().max(boundary.height()) as f64).max(1.0),
            obj: 0.0,
            obj_hpwl: 0.0,
            obj_cos: 0.0,
            obj_ovl: 0.0,
            obj_oob: 0.0,
            obj_asym: 0.0,
            total_cell_area: db.total_cell_area() as f64,
            boundary_area: boundary.area() as f64,
        }
    }

    /// Recomputes the weighted objective and its per-family components.
    pub fn calc_obj(&mut self) {
        let p = &self.p;
        let layout = &self.layout;
        self.obj_hpwl = self.mults.hpwl
            * self
                .ops
                .hpwl
                .iter()
                .map(|op| op.value(p, layout, self.alphas.hpwl))
                .sum::<f64>();
        self.obj_cos = self.mults.cos
            * self
                .ops
                .cos
                .iter()
                .map(|op| op.value(p, layout))
                .sum::<f64>();
        self.obj_ovl = self.mults.ovl
            * self
                .ops
                .ovl
                .iter()
                .map(|op| op.value(p, layout, self.alphas.ovl))
                .sum::<f64>();
        self.obj_oob = self.mults.oob
            * self
                .ops
                .oob
                .iter()
                .map(|op| op.value(p, layout, self.alphas.oob))
                .sum::<f64>();
        self.obj_asym = self.mults.asym
            * self
                .ops
                .asym
                .iter()
                .map(|op| op.value(p, layout))
                .sum::<f64>();
        self.obj = self.obj_hpwl + self.obj_cos + self.obj_ovl + self.obj_oob + self.obj_asym;
    }

    /// Recomputes the gradient of the weighted objective at `p`.
    ///
    /// Every operator scatter-adds its contribution; entries belonging to
    /// fixed cells are zeroed afterwards so fixed cells never move.
    pub fn calc_grad(&mut self) {
        self.grad.fill(0.0);
        let p = &self.p;
        let layout = &self.layout;
        for op in &self.ops.hpwl {
            op.add_gradient(p, layout, self.alphas.hpwl, self.mults.hpwl, &mut self.grad);
        }
        for op in &self.ops.cos {
            op.add_gradient(p, layout, self.mults.cos, &mut self.grad);
        }
        for op in &self.ops.ovl {
            op.add_gradient(p, layout, self.alphas.ovl, self.mults.ovl, &mut self.grad);
        }
        for op in &self.ops.oob {
            op.add_gradient(p, layout, self.alphas.oob, self.mults.oob, &mut self.grad);
        }
        for op in &self.ops.asym {
            op.add_gradient(p, layout, self.mults.asym, &mut self.grad);
        }
        for (i, &fixed) in self.fixed.iter().enumerate() {
            if fixed {
                self.grad[self.layout.x(i)] = 0.0;
                self.grad[self.layout.y(i)] = 0.0;
            }
        }
    }

    /// Computes each family's raw gradient norm with unit multipliers.
    fn family_norms(&self) -> FamilyNorms {
        let p = &self.p;
        let layout = &self.layout;
        let norm_of = |fill: &dyn Fn(&mut Vec<f64>)| {
            let mut buf = vec![0.0; layout.len()];
            fill(&mut buf);
            buf.iter().map(|g| g * g).sum::<f64>().sqrt()
        };
        FamilyNorms {
            hpwl: norm_of(&|buf| {
                for op in &self.ops.hpwl {
                    op.add_gradient(p, layout, self.alphas.hpwl, 1.0, buf);
                }
            }),
            cos: norm_of(&|buf| {
                for op in &self.ops.cos {
                    op.add_gradient(p, layout, 1.0, buf);
                }
            }),
            ovl: norm_of(&|buf| {
                for op in &self.ops.ovl {
                    op.add_gradient(p, layout, self.alphas.ovl, 1.0, buf);
                }
            }),
            oob: norm_of(&|buf| {
                for op in &self.ops.oob {
                    op.add_gradient(p, layout, self.alphas.oob, 1.0, buf);
                }
            }),
            asym: norm_of(&|buf| {
                for op in &self.ops.asym {
                    op.add_gradient(p, layout, 1.0, buf);
                }
            }),
        }
    }

    /// Raw (multiplier-free) objectives of the smoothed families, in the
    /// order consumed by the smoothing schedule: wirelength, overlap,
    /// boundary.
    fn raw_objs(&self) -> [f64; 3] {
        [
            self.obj_hpwl / self.mults.hpwl,
            self.obj_ovl / self.mults.ovl,
            self.obj_oob / self.mults.oob,
        ]
    }

    /// Exact violation measures at the current coordinates.
    pub fn violations(&self) -> Violations {
        let p = &self.p;
        let layout = &self.layout;
        Violations {
            ovl_area: self.ops.ovl.iter().map(|op| op.exact_area(p, layout)).sum(),
            oob_area: self.ops.oob.iter().map(|op| op.exact_area(p, layout)).sum(),
            asym_dist: self
                .ops
                .asym
                .iter()
                .map(|op| op.exact_distance(p, layout))
                .sum(),
            total_cell_area: self.total_cell_area,
            boundary_area: self.boundary_area,
        }
    }

    /// Writes the optimized coordinates back to the database, rounding to
    /// integers. Global placement is fractional by nature; the rounding here
    /// needs no tolerance check.
    fn export(&self, db: &mut PlaceDb) {
        for i in 0..db.cells.len() {
            if self.fixed[i] {
                continue;
            }
            db.cells[i].x = self.p[self.layout.x(i)].round() as i64;
            db.cells[i].y = self.p[self.layout.y(i)].round() as i64;
        }
    }
}

/// Computes the placement boundary: a square sized from the total cell area
/// plus whitespace, centered on the current cell bounding box and grown to
/// contain every fixed cell.
fn compute_boundary(db: &PlaceDb, params: &PlacerParams) -> Rect {
    let area = db.total_cell_area() as f64 * (1.0 + params.whitespace_ratio);
    let side = area.sqrt().ceil() as i64;
    let bbox = db.bounding_box();
    let center = if bbox.is_empty() {
        opal_common::Point::new(side / 2, side / 2)
    } else {
        bbox.center()
    };
    let mut boundary = Rect::new(
        center.x - side / 2,
        center.y - side / 2,
        center.x - side / 2 + side,
        center.y - side / 2 + side,
    );
    for cell in &db.cells {
        if cell.is_fixed {
            boundary = boundary.union(&cell.rect());
        }
    }
    boundary
}

/// Spreads every movable cell uniformly at random inside the boundary.
fn spread_cells(db: &mut PlaceDb, boundary: Rect, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for cell in &mut db.cells {
        if cell.is_fixed {
            continue;
        }
        let x_hi = (boundary.xhi - cell.width).max(boundary.xlo + 1);
        let y_hi = (boundary.yhi - cell.height).max(boundary.ylo + 1);
        cell.x = rng.gen_range(boundary.xlo..x_hi);
        cell.y = rng.gen_range(boundary.ylo..y_hi);
    }
}

/// Runs nonlinear global placement and writes the result back to the database.
///
/// `tough` doubles the initial penalty multipliers and raises the outer
/// iteration cap; the driver uses it when a first legalization attempt
/// reports infeasibility.
pub(crate) fn global_place(
    db: &mut PlaceDb,
    params: &PlacerParams,
    sink: &DiagnosticSink,
    tough: bool,
) -> PlaceResult<()> {
    if db.cells.is_empty() {
        return Ok(());
    }

    let boundary = compute_boundary(db, params);
    spread_cells(db, boundary, params.seed);

    let mut problem = NlpProblem::from_db(db, boundary);
    problem.calc_obj();

    // Balance the penalties against the wirelength gradient, then freeze the
    // normalization of the subgradient update at the first-iteration values.
    let norms = problem.family_norms();
    problem.mults = MultiplierInit::MatchGradientNorm.init(&norms, params, tough);
    problem.calc_obj();
    let raw = problem.raw_objs();
    let raw_asym = problem.obj_asym / problem.mults.asym;
    problem.mults.init_normalization(raw[1], raw_asym);
    problem.alphas = AlphaSet::init(raw);

    let max_outer = params.max_outer_iter + if tough { TOUGH_EXTRA_OUTER_ITER } else { 0 };
    let mut stops = vec![
        OuterStop::MaxIterations {
            max: max_outer,
            cur: 0,
        },
        OuterStop::ViolationsSmall,
    ];
    let optimizer = Optimizer::default();
    let mut criteria = vec![
        ConvergeCriterion::MaxIterations {
            max: params.max_inner_iter,
            cur: 0,
        },
        ConvergeCriterion::RelativeImprovement {
            threshold: params.alpha_decay_target,
            last: None,
        },
    ];

    let mut outer_iters = 0;
    loop {
        outer_iters += 1;
        optimizer.optimize(&mut problem, &mut criteria);

        let violations = problem.violations();
        if outer_stopped(&mut stops, &violations) {
            break;
        }

        let raw = problem.raw_objs();
        let raw_oob = raw[2];
        let raw_asym = problem.obj_asym / problem.mults.asym;
        problem
            .mults
            .update(raw[1], raw_oob, raw_asym, &violations, params);
        problem.alphas.update(raw);
        problem.calc_obj();
    }

    problem.export(db);
    let violations = problem.violations();
    sink.emit(Diagnostic::note(
        DiagnosticCode::new(Phase::GlobalPlace, 100),
        format!(
            "global placement finished after {outer_iters} outer iterations \
             (overlap {:.1}, out-of-boundary {:.1}, asymmetry {:.1})",
            violations.ovl_area, violations.oob_area, violations.asym_dist
        ),
    ));
    Ok(())
}
