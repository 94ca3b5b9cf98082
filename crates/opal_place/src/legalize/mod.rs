//! Constraint-graph legalization.
//!
//! Converts the fractional global placement into a legal, overlap-free
//! placement. Each axis independently gets a constraint DAG (sweep
//! generation, transitive reduction) and two linear programs: the first
//! minimizes the placement span, the second minimizes weighted wirelength
//! with the span capped at the just-found optimum scaled by the whitespace
//! ratio. Symmetry groups contribute axis variables and equalities; an
//! infeasible program surfaces as the retry signal.

mod constraints;
mod graph;

use crate::lp::{LpOp, LpProblem, LpVar};
use constraints::{generate_constraints, ConstraintEdge};
use graph::reduce_constraints;
use opal_common::{PlaceError, PlaceResult};
use opal_db::{PlaceDb, PlacerParams};
use opal_diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink, Phase};

/// Tolerance for rounding LP coordinates to database integers.
const EXPORT_TOLERANCE: f64 = 0.01;

/// Which axis a legalization pass solves.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Axis {
    Horizontal,
    Vertical,
}

impl Axis {
    fn loc(self, db: &PlaceDb, cell: usize) -> i64 {
        match self {
            Axis::Horizontal => db.cells[cell].x,
            Axis::Vertical => db.cells[cell].y,
        }
    }

    fn extent(self, db: &PlaceDb, cell: usize) -> i64 {
        match self {
            Axis::Horizontal => db.cells[cell].width,
            Axis::Vertical => db.cells[cell].height,
        }
    }

    fn pin_offset(self, db: &PlaceDb, pin: opal_db::PinId) -> i64 {
        let off = db.pin(pin).offset_center();
        match self {
            Axis::Horizontal => off.x,
            Axis::Vertical => off.y,
        }
    }
}

/// Adds one location variable per cell; fixed cells are pinned by equality.
fn add_loc_vars(lp: &mut LpProblem, db: &PlaceDb, axis: Axis) -> Vec<LpVar> {
    let mut locs = Vec::with_capacity(db.cells.len());
    for i in 0..db.cells.len() {
        if db.cells[i].is_fixed {
            let var = lp.add_free_var(0.0);
            lp.add_constraint(&[(var, 1.0)], LpOp::Eq, axis.loc(db, i) as f64);
            locs.push(var);
        } else {
            locs.push(lp.add_var(0.0, 0.0, f64::INFINITY));
        }
    }
    locs
}

/// Adds the symmetry equalities for one axis.
///
/// Horizontally each group gets a variable `t = 2 * axis`; every pair
/// satisfies `x_a + x_b = t - (w_a + w_b) / 2` and every self-symmetric cell
/// `x_c = t/2 - w_c / 2`. Vertically the pairs' y coordinates are simply
/// equal.
fn add_sym_constraints(
    lp: &mut LpProblem,
    db: &PlaceDb,
    axis: Axis,
    locs: &[LpVar],
) -> Vec<Option<LpVar>> {
    let mut group_axes = Vec::with_capacity(db.sym_groups.len());
    for group in &db.sym_groups {
        match axis {
            Axis::Horizontal => {
                let t = lp.add_free_var(0.0);
                for &(a, b) in &group.pairs {
                    let (a, b) = (a.index(), b.index());
                    let half_widths =
                        (db.cells[a].width as f64 + db.cells[b].width as f64) / 2.0;
                    lp.add_constraint(
                        &[(locs[a], 1.0), (locs[b], 1.0), (t, -1.0)],
                        LpOp::Eq,
                        -half_widths,
                    );
                }
                for &c in &group.self_cells {
                    let c = c.index();
                    lp.add_constraint(
                        &[(locs[c], 1.0), (t, -0.5)],
                        LpOp::Eq,
                        -(db.cells[c].width as f64) / 2.0,
                    );
                }
                group_axes.push(Some(t));
            }
            Axis::Vertical => {
                for &(a, b) in &group.pairs {
                    let (a, b) = (a.index(), b.index());
                    lp.add_constraint(&[(locs[a], 1.0), (locs[b], -1.0)], LpOp::Eq, 0.0);
                }
                group_axes.push(None);
            }
        }
    }
    group_axes
}

/// Adds the separation constraints `loc[target] - loc[source] >= weight`.
fn add_edge_constraints(lp: &mut LpProblem, edges: &[ConstraintEdge], locs: &[LpVar]) {
    for edge in edges {
        lp.add_constraint(
            &[(locs[edge.target], 1.0), (locs[edge.source], -1.0)],
            LpOp::Ge,
            edge.weight as f64,
        );
    }
}

/// First program: minimize the placement span along one axis.
fn solve_area(
    db: &PlaceDb,
    edges: &[ConstraintEdge],
    axis: Axis,
    params: &PlacerParams,
) -> PlaceResult<f64> {
    let mut lp = LpProblem::minimize("legalization");
    lp.set_num_threads(params.num_threads);
    let locs = add_loc_vars(&mut lp, db, axis);
    add_sym_constraints(&mut lp, db, axis, &locs);
    add_edge_constraints(&mut lp, edges, &locs);
    let dim = lp.add_var(1.0, 0.0, f64::INFINITY);
    for (i, &loc) in locs.iter().enumerate() {
        lp.add_constraint(
            &[(loc, 1.0), (dim, -1.0)],
            LpOp::Le,
            -(axis.extent(db, i) as f64),
        );
    }
    let solution = lp.solve()?;
    Ok(solution.objective())
}

/// Second program: minimize weighted wirelength with the span capped.
///
/// Writes the solved coordinates back into the database; horizontally it also
/// records each symmetry group's resolved axis.
fn solve_wirelength(
    db: &mut PlaceDb,
    edges: &[ConstraintEdge],
    axis: Axis,
    span_cap: f64,
    params: &PlacerParams,
) -> PlaceResult<()> {
    let mut lp = LpProblem::minimize("legalization");
    lp.set_num_threads(params.num_threads);
    let locs = add_loc_vars(&mut lp, db, axis);
    let group_axes = add_sym_constraints(&mut lp, db, axis, &locs);
    add_edge_constraints(&mut lp, edges, &locs);
    for (i, &loc) in locs.iter().enumerate() {
        if db.cells[i].is_fixed {
            continue;
        }
        lp.add_constraint(
            &[(loc, 1.0)],
            LpOp::Le,
            span_cap - axis.extent(db, i) as f64,
        );
    }

    // One (lo, hi) extent pair per net; the objective is the weighted sum of
    // extents, which equals the per-axis HPWL at the optimum.
    for net in &db.nets {
        if net.pins.len() < 2 {
            continue;
        }
        let lo = lp.add_free_var(-net.weight);
        let hi = lp.add_free_var(net.weight);
        for &pin in &net.pins {
            let cell = db.pin(pin).cell.index();
            let off = axis.pin_offset(db, pin) as f64;
            lp.add_constraint(&[(lo, 1.0), (locs[cell], -1.0)], LpOp::Le, off);
            lp.add_constraint(&[(locs[cell], 1.0), (hi, -1.0)], LpOp::Le, -off);
        }
    }

    let solution = lp.solve()?;

    for i in 0..db.cells.len() {
        if db.cells[i].is_fixed {
            continue;
        }
        let value = solution.value(locs[i]);
        let rounded = value.round();
        if (value - rounded).abs() > EXPORT_TOLERANCE {
            return Err(PlaceError::internal(format!(
                "legalization produced a non-integral coordinate {value} for cell '{}'",
                db.cells[i].name
            )));
        }
        match axis {
            Axis::Horizontal => db.cells[i].x = rounded as i64,
            Axis::Vertical => db.cells[i].y = rounded as i64,
        }
    }
    if axis == Axis::Horizontal {
        for (g, var) in group_axes.iter().enumerate() {
            if let Some(t) = var {
                db.sym_groups[g].axis = Some(solution.value(*t) / 2.0);
            }
        }
    }
    Ok(())
}

/// Legalizes one axis: reduce the constraint set, fix the span, then
/// optimize wirelength within it.
fn legalize_axis(
    db: &mut PlaceDb,
    edges: &[ConstraintEdge],
    axis: Axis,
    params: &PlacerParams,
) -> PlaceResult<()> {
    let span = solve_area(db, edges, axis, params)?;
    let cap = (span * (1.0 + params.whitespace_ratio)).floor().max(span.ceil());
    solve_wirelength(db, edges, axis, cap, params)
}

/// Runs constraint-graph legalization on the whole placement.
///
/// Returns [`PlaceError::Infeasible`] when a program has no solution; the
/// driver may re-run global placement in tough mode and retry once.
pub(crate) fn legalize(
    db: &mut PlaceDb,
    params: &PlacerParams,
    sink: &DiagnosticSink,
) -> PlaceResult<()> {
    if db.cells.is_empty() {
        return Ok(());
    }
    let (h_constraints, v_constraints) = generate_constraints(db);
    let widths: Vec<i64> = db.cells.iter().map(|c| c.width).collect();
    let heights: Vec<i64> = db.cells.iter().map(|c| c.height).collect();
    let h_edges = reduce_constraints(db.cells.len(), &h_constraints, &widths);
    let v_edges = reduce_constraints(db.cells.len(), &v_constraints, &heights);

    legalize_axis(db, &h_edges, Axis::Horizontal, params)?;
    legalize_axis(db, &v_edges, Axis::Vertical, params)?;

    sink.emit(Diagnostic::note(
        DiagnosticCode::new(Phase::Legalize, 100),
        format!(
            "legalization finished: {} horizontal and {} vertical constraints, HPWL {}",
            h_edges.len(),
            v_edges.len(),
            db.hpwl()
        ),
    ));
    Ok(())
}
