//! Sweep-based constraint generation for the legalizer.
//!
//! Every unordered cell pair receives exactly one directed separation edge,
//! placed in the horizontal or vertical constraint set. The axis is chosen
//! from the pair's projection overlaps at the global-placement coordinates;
//! the direction follows the current center order. Pairs bound together by a
//! symmetry group always separate horizontally, because the vertical program
//! pins their y coordinates equal.

use opal_db::PlaceDb;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// A directed separation constraint between two cells.
///
/// An edge in the horizontal set means `x[source] + weight <= x[target]`;
/// vertical edges read the same way on y.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConstraintEdge {
    /// The index of the source cell.
    pub source: usize,
    /// The index of the target cell.
    pub target: usize,
    /// The required separation (the source extent along the axis).
    pub weight: i64,
}

/// An ordered collection of constraint edges for one axis.
#[derive(Debug, Default)]
pub(crate) struct Constraints {
    /// The constraint edges.
    pub edges: Vec<ConstraintEdge>,
}

impl Constraints {
    /// Adds a constraint edge.
    pub fn add_edge(&mut self, source: usize, target: usize, weight: i64) {
        self.edges.push(ConstraintEdge {
            source,
            target,
            weight,
        });
    }
}

/// A sweep event: a cell's low or high edge along the sweep axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BoxEdge {
    coord: i64,
    cell: usize,
    is_high: bool,
}

impl Ord for BoxEdge {
    fn cmp(&self, other: &Self) -> Ordering {
        // High edges sort before low edges at equal coordinates so abutting
        // intervals do not count as overlapping.
        self.coord
            .cmp(&other.coord)
            .then_with(|| other.is_high.cmp(&self.is_high))
            .then_with(|| self.cell.cmp(&other.cell))
    }
}

impl PartialOrd for BoxEdge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sweeps the given intervals and collects every strictly overlapping pair.
fn overlapping_pairs(intervals: &[(i64, i64)]) -> BTreeSet<(usize, usize)> {
    let mut events = Vec::with_capacity(intervals.len() * 2);
    for (cell, &(lo, hi)) in intervals.iter().enumerate() {
        events.push(BoxEdge {
            coord: lo,
            cell,
            is_high: false,
        });
        events.push(BoxEdge {
            coord: hi,
            cell,
            is_high: true,
        });
    }
    events.sort();

    let mut active: BTreeSet<usize> = BTreeSet::new();
    let mut pairs = BTreeSet::new();
    for event in events {
        if event.is_high {
            active.remove(&event.cell);
        } else {
            for &other in &active {
                pairs.insert((event.cell.min(other), event.cell.max(other)));
            }
            active.insert(event.cell);
        }
    }
    pairs
}

/// Generates the horizontal and vertical constraint sets from the current
/// (global-placement) cell coordinates.
pub(crate) fn generate_constraints(db: &PlaceDb) -> (Constraints, Constraints) {
    let n = db.cells.len();
    let x_intervals: Vec<(i64, i64)> = db
        .cells
        .iter()
        .map(|c| (c.x, c.x + c.width))
        .collect();
    let y_intervals: Vec<(i64, i64)> = db
        .cells
        .iter()
        .map(|c| (c.y, c.y + c.height))
        .collect();
    let x_overlaps = overlapping_pairs(&x_intervals);
    let y_overlaps = overlapping_pairs(&y_intervals);

    let mut sym_pairs: BTreeSet<(usize, usize)> = BTreeSet::new();
    for group in &db.sym_groups {
        for &(a, b) in &group.pairs {
            let (a, b) = (a.index(), b.index());
            sym_pairs.insert((a.min(b), a.max(b)));
        }
    }

    let mut horizontal = Constraints::default();
    let mut vertical = Constraints::default();
    for i in 0..n {
        for j in (i + 1)..n {
            let pair = (i, j);
            let in_x = x_overlaps.contains(&pair);
            let in_y = y_overlaps.contains(&pair);

            let use_horizontal = if sym_pairs.contains(&pair) {
                // The vertical program pins paired ys equal; a vertical
                // separation edge would contradict it.
                true
            } else if in_y && !in_x {
                true
            } else if in_x && !in_y {
                false
            } else {
                // Overlapping in both projections or in neither: separate
                // along the axis where the centers already sit further apart.
                let ci = db.cells[i].rect().center();
                let cj = db.cells[j].rect().center();
                (ci.x - cj.x).abs() >= (ci.y - cj.y).abs()
            };

            if use_horizontal {
                let ci = db.cells[i].center_x();
                let cj = db.cells[j].center_x();
                let (src, tgt) = if ci < cj || (ci == cj && i < j) {
                    (i, j)
                } else {
                    (j, i)
                };
                horizontal.add_edge(src, tgt, db.cells[src].width);
            } else {
                let ci = db.cells[i].y + db.cells[i].height / 2;
                let cj = db.cells[j].y + db.cells[j].height / 2;
                let (src, tgt) = if ci < cj || (ci == cj && i < j) {
                    (i, j)
                } else {
                    (j, i)
                };
                vertical.add_edge(src, tgt, db.cells[src].height);
            }
        }
    }
    (horizontal, vertical)
}
