//! Grid alignment post-pass.
//!
//! Snaps the legalized placement onto the user grid while preserving the
//! symmetry axes: each group's axis moves to the nearest half-grid column,
//! the group translates rigidly, then every lower-left corner snaps to the
//! grid. Free movable cells snap individually; fixed cells never move.

use opal_db::{PlaceDb, SymGroupId};
use opal_diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink, Phase};

/// Rounds `value` to the nearest multiple of `grid_step`.
fn snap(value: f64, grid_step: i64) -> i64 {
    let g = grid_step as f64;
    (value / g).round() as i64 * grid_step
}

/// The nearest axis position satisfying `axis mod grid = grid / 2`.
fn half_grid(axis: f64, grid_step: i64) -> f64 {
    let g = grid_step as f64;
    let k = ((axis - g / 2.0) / g).round();
    k * g + g / 2.0
}

/// The current axis of a symmetry group: the value recorded by legalization,
/// or the mirror-center mean of the group's current geometry.
fn current_axis(db: &PlaceDb, group: SymGroupId) -> Option<f64> {
    let group = &db.sym_groups[group.index()];
    if let Some(axis) = group.axis {
        return Some(axis);
    }
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
    if count > 0.0 {
        Some(sum / count)
    } else {
        None
    }
}

/// Snaps the placement to the grid and returns the final symmetry axis.
///
/// Symmetry groups translate as rigid bodies so their axes land on half-grid
/// columns before the individual corners snap; running the aligner twice with
/// the same step leaves the placement unchanged. The returned axis is the
/// first group's (rounded), or 0 when the design has no symmetry groups.
pub(crate) fn align_to_grid(db: &mut PlaceDb, grid_step: i64, sink: &DiagnosticSink) -> i64 {
    if grid_step <= 0 {
        return find_current_sym_axis(db);
    }

    for g in 0..db.sym_groups.len() {
        let id = SymGroupId::from_raw(g as u32);
        let Some(axis) = current_axis(db, id) else {
            continue;
        };
        let target = half_grid(axis, grid_step);
        let shift = target - axis;

        let pairs = db.sym_groups[g].pairs.clone();
        let selfs = db.sym_groups[g].self_cells.clone();
        for (a, b) in pairs {
            if !db.cell(a).is_fixed {
                let cell = db.cell_mut(a);
                cell.x = snap(cell.x as f64 + shift, grid_step);
                cell.y = snap(cell.y as f64, grid_step);
            }
            if !db.cell(b).is_fixed {
                // Derive the mirror position from the snapped axis so the
                // pair stays mirrored after snapping.
                let mirrored_center = 2.0 * target - db.cell(a).center_x() as f64;
                let partner_y = db.cell(a).y;
                let cell = db.cell_mut(b);
                cell.x = snap(mirrored_center - cell.width as f64 / 2.0, grid_step);
                cell.y = partner_y;
            }
        }
        for c in selfs {
            if !db.cell(c).is_fixed {
                let cell = db.cell_mut(c);
                cell.x = snap(target - cell.width as f64 / 2.0, grid_step);
                cell.y = snap(cell.y as f64, grid_step);
            }
        }
        db.sym_groups[g].axis = Some(target);
    }

    for cell in &mut db.cells {
        if cell.is_fixed || cell.sym_group.is_some() {
            continue;
        }
        cell.x = snap(cell.x as f64, grid_step);
        cell.y = snap(cell.y as f64, grid_step);
    }

    let axis = find_current_sym_axis(db);
    sink.emit(Diagnostic::note(
        DiagnosticCode::new(Phase::Align, 100),
        format!("grid alignment finished with step {grid_step}, symmetry axis {axis}"),
    ));
    axis
}

/// The design's symmetry axis: the first group's recorded or geometric axis,
/// rounded to an integer; 0 without symmetry groups.
pub(crate) fn find_current_sym_axis(db: &PlaceDb) -> i64 {
    db.sym_groups
        .first()
        .and_then(|g| current_axis(db, g.id))
        .map(|a| a.round() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_db::{Cell, CellId};

    fn add_cell(db: &mut PlaceDb, name: &str, x: i64, y: i64, w: i64, h: i64) -> CellId {
        db.add_cell(Cell {
            id: CellId::from_raw(0),
            name: name.to_string(),
            width: w,
            height: h,
            x,
            y,
            is_fixed: false,
            pins: Vec::new(),
            sym_group: None,
        })
    }

    #[test]
    fn snap_rounds_to_grid() {
        assert_eq!(snap(7.0, 4), 8);
        assert_eq!(snap(5.9, 4), 4);
        assert_eq!(snap(-3.0, 4), -4);
        assert_eq!(snap(0.0, 4), 0);
    }

    #[test]
    fn half_grid_lands_between_columns() {
        assert_eq!(half_grid(10.0, 2), 11.0);
        assert_eq!(half_grid(11.0, 2), 11.0);
        assert_eq!(half_grid(12.4, 2), 13.0);
        assert_eq!(half_grid(-0.7, 2), -1.0);
    }

    #[test]
    fn free_cells_snap_to_grid() {
        let mut db = PlaceDb::new();
        add_cell(&mut db, "a", 7, 9, 10, 10);
        let sink = DiagnosticSink::new();
        align_to_grid(&mut db, 4, &sink);
        assert_eq!(db.cells[0].x % 4, 0);
        assert_eq!(db.cells[0].y % 4, 0);
    }

    #[test]
    fn sym_pair_stays_mirrored_after_alignment() {
        let mut db = PlaceDb::new();
        let a = add_cell(&mut db, "a", 1, 3, 10, 10);
        let b = add_cell(&mut db, "b", 21, 3, 10, 10);
        db.add_sym_group(vec![(a, b)], vec![]);
        let sink = DiagnosticSink::new();
        let axis = align_to_grid(&mut db, 2, &sink);

        let ca = db.cell(a);
        let cb = db.cell(b);
        assert_eq!(ca.y, cb.y);
        assert_eq!(ca.x % 2, 0);
        assert_eq!(cb.x % 2, 0);
        // Mirror centers average to the axis, which sits on a half-grid
        assert_eq!(ca.center_x() + cb.center_x(), 2 * axis);
        assert_eq!(axis.rem_euclid(2), 1);
    }

    #[test]
    fn self_symmetric_cell_recenters_on_axis() {
        let mut db = PlaceDb::new();
        let a = add_cell(&mut db, "a", 0, 0, 10, 10);
        let b = add_cell(&mut db, "b", 20, 0, 10, 10);
        let c = add_cell(&mut db, "c", 11, 20, 6, 6);
        db.add_sym_group(vec![(a, b)], vec![c]);
        let sink = DiagnosticSink::new();
        let axis = align_to_grid(&mut db, 2, &sink);
        assert_eq!(db.cell(c).center_x(), axis);
        assert_eq!(db.cell(c).x % 2, 0);
    }

    #[test]
    fn alignment_is_idempotent() {
        let mut db = PlaceDb::new();
        let a = add_cell(&mut db, "a", 1, 3, 10, 10);
        let b = add_cell(&mut db, "b", 21, 3, 10, 10);
        add_cell(&mut db, "free", 7, 13, 6, 6);
        db.add_sym_group(vec![(a, b)], vec![]);
        let sink = DiagnosticSink::new();

        let axis1 = align_to_grid(&mut db, 2, &sink);
        let coords1: Vec<(i64, i64)> = db.cells.iter().map(|c| (c.x, c.y)).collect();
        let axis2 = align_to_grid(&mut db, 2, &sink);
        let coords2: Vec<(i64, i64)> = db.cells.iter().map(|c| (c.x, c.y)).collect();

        assert_eq!(axis1, axis2);
        assert_eq!(coords1, coords2);
    }

    #[test]
    fn fixed_cells_never_move() {
        let mut db = PlaceDb::new();
        let f = add_cell(&mut db, "f", 7, 9, 10, 10);
        db.cell_mut(f).is_fixed = true;
        let sink = DiagnosticSink::new();
        align_to_grid(&mut db, 4, &sink);
        assert_eq!(db.cell(f).x, 7);
        assert_eq!(db.cell(f).y, 9);
    }

    #[test]
    fn no_groups_returns_zero_axis() {
        let mut db = PlaceDb::new();
        add_cell(&mut db, "a", 3, 3, 10, 10);
        let sink = DiagnosticSink::new();
        assert_eq!(align_to_grid(&mut db, 2, &sink), 0);
    }

    #[test]
    fn legalized_axis_is_preferred_over_geometry() {
        let mut db = PlaceDb::new();
        let a = add_cell(&mut db, "a", 0, 0, 10, 10);
        let b = add_cell(&mut db, "b", 20, 0, 10, 10);
        db.add_sym_group(vec![(a, b)], vec![]);
        db.sym_groups[0].axis = Some(15.0);
        let axis = find_current_sym_axis(&db);
        assert_eq!(axis, 15);
    }
}
