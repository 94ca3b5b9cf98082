//! Analog placement pipeline for the Opal engine.
//!
//! This crate takes a populated [`PlaceDb`] and computes legal,
//! symmetry-honoring cell coordinates plus ring terminals for the IO nets.
//!
//! # Pipeline
//!
//! 1. **Global placement** — differentiable wirelength/overlap/boundary/
//!    asymmetry objective minimized by a first-order kernel inside an outer
//!    multiplier loop
//! 2. **Legalization** — per-axis constraint graphs and two linear programs
//!    remove the remaining overlaps without destroying symmetry
//! 3. **Pin assignment** — min-cost matching of IO nets onto ring sites
//! 4. **Grid alignment** — snap to the user grid, keeping axes on half-grid
//!    columns
//!
//! Proximity groups turn into temporary high-weight nets around stages 1–2.
//! When legalization or pin assignment reports infeasibility the pipeline
//! re-runs global placement once in tough mode (doubled penalties, raised
//! iteration cap) before giving up.
//!
//! # Usage
//!
//! ```ignore
//! use opal_place::place;
//!
//! let axis = place(&mut db, &params, &sink)?;
//! ```

#![warn(missing_docs)]

mod align;
mod global;
mod legalize;
mod lp;
mod pinassign;
mod proximity;

pub use opal_db::{PlaceDb, PlacerParams};

use opal_common::PlaceResult;
use opal_diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink, Phase};
use proximity::ProximityMgr;

/// Runs the whole placement pipeline on the database.
///
/// On success the database carries legal integer cell coordinates, one
/// virtual pin per IO net, and the resolved symmetry axes; the returned
/// value is the final symmetry axis (0 when the design has no symmetry
/// groups). An empty database succeeds trivially.
///
/// Infeasible legalization or pin assignment triggers one tough-mode retry;
/// a second failure, or any non-retryable error, aborts the placement.
pub fn place(db: &mut PlaceDb, params: &PlacerParams, sink: &DiagnosticSink) -> PlaceResult<i64> {
    db.validate()?;
    if db.cells.is_empty() {
        return Ok(0);
    }
    if params.has_grid_step() {
        db.expand_to_grid(params.grid_step);
    }

    let mut proximity = ProximityMgr::new();
    proximity.apply(db, params.proximity_net_weight);
    let core = place_core(db, params, sink);
    proximity.restore(db);
    core?;

    let axis = if params.has_grid_step() {
        align::align_to_grid(db, params.grid_step, sink)
    } else {
        align::find_current_sym_axis(db)
    };
    sink.emit(Diagnostic::note(
        DiagnosticCode::new(Phase::Database, 100),
        format!("placement finished, HPWL {}", db.hpwl()),
    ));
    Ok(axis)
}

/// Global placement, legalization, and pin assignment with the tough-mode
/// retry. Proximity nets are present throughout.
fn place_core(db: &mut PlaceDb, params: &PlacerParams, sink: &DiagnosticSink) -> PlaceResult<()> {
    global::global_place(db, params, sink, params.tough_mode)?;
    let first = legalize::legalize(db, params, sink)
        .and_then(|()| pinassign::assign_virtual_pins(db, params, sink));
    match first {
        Ok(()) => Ok(()),
        Err(err) if err.is_retryable() && !params.tough_mode => {
            sink.emit(Diagnostic::warning(
                DiagnosticCode::new(Phase::Legalize, 200),
                format!("{err}; retrying with tough-mode global placement"),
            ));
            global::global_place(db, params, sink, true)?;
            legalize::legalize(db, params, sink)?;
            pinassign::assign_virtual_pins(db, params, sink)
        }
        Err(err) => Err(err),
    }
}
