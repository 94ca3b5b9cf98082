//! Virtual-pin assignment for IO nets.
//!
//! Generates candidate terminal sites on a ring around the placed core and
//! assigns every IO net to one site, minimizing the total HPWL increase.
//! Symmetric net pairs consume a left-side site and its mirrored right-side
//! site together. The fast path solves two sequential min-cost bipartite
//! matchings; the exact path solves a single relaxed assignment program and
//! verifies that its solution is integral.

use crate::lp::{LpOp, LpProblem, LpVar};
use opal_common::{PlaceError, PlaceResult, Point, Rect};
use opal_db::{Direction, NetId, PlaceDb, PlacerParams, VirtualPin, VirtualPinId};
use opal_diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink, Phase};
use pathfinding::kuhn_munkres::kuhn_munkres_min;
use pathfinding::matrix::Matrix;
use std::collections::{BTreeMap, HashSet};

/// Penalty cost steering restricted nets away from forbidden sites.
const FORBIDDEN_SITE_COST: i64 = 1 << 40;

/// Integrality bands of the exact path: a decision variable must fall below
/// the lower band or above the upper band.
const INTEGRALITY_LO: f64 = 0.001;
const INTEGRALITY_HI: f64 = 0.99;

fn gcd(mut a: i64, mut b: i64) -> i64 {
    loop {
        if a == 0 {
            return b;
        }
        b %= a;
        if b == 0 {
            return a;
        }
        a %= b;
    }
}

fn lcm(a: i64, b: i64) -> i64 {
    let g = gcd(a, b);
    if g == 0 {
        0
    } else {
        a / g * b
    }
}

/// Ring geometry and candidate sites for one assignment run.
///
/// The sites become the database's ring-site list once assignment succeeds.
struct PinRing {
    sites: Vec<VirtualPin>,
    /// Left-side site index to its mirrored right-side index.
    mirror: BTreeMap<usize, usize>,
}

/// Appends an unassigned site, numbering it by its position in the list.
fn push_site(sites: &mut Vec<VirtualPin>, location: Point, direction: Direction) {
    let id = VirtualPinId::from_raw(sites.len() as u32);
    sites.push(VirtualPin {
        id,
        location,
        direction,
        net: None,
    });
}

impl PinRing {
    /// Expands the cell bounding box into the ring boundary and generates
    /// the candidate sites.
    ///
    /// With a grid step configured, the boundary is re-centered on a
    /// half-grid column and padded to grid multiples, and the pin interval
    /// becomes the least common multiple of the configured interval and the
    /// grid step.
    fn generate(db: &PlaceDb, params: &PlacerParams) -> PlaceResult<Self> {
        if params.virtual_pin_interval <= 0 {
            return Err(PlaceError::InvalidInput(format!(
                "virtual pin interval must be positive, got {}",
                params.virtual_pin_interval
            )));
        }
        let mut boundary = db.bounding_box().expand(params.virtual_boundary_extension);
        let mut interval = params.virtual_pin_interval;
        if params.has_grid_step() {
            let g = params.grid_step;
            let center = boundary.center().x;
            let target_center = center.div_euclid(g) * g + g / 2;
            let mut target_width = (boundary.xhi - target_center).max(target_center - boundary.xlo);
            target_width += g - target_width.rem_euclid(g);
            boundary.xlo = target_center - target_width;
            boundary.xhi = target_center + target_width;
            boundary.ylo -= boundary.ylo.rem_euclid(g);
            boundary.yhi += g - boundary.yhi.rem_euclid(g);
            interval = lcm(interval, g);
        }

        let mut sites = Vec::new();
        let mut mirror = BTreeMap::new();

        if params.ring_top_bottom_sites {
            let center_x = boundary.center().x;
            let mut x = boundary.xlo + interval;
            while x < center_x - interval / 2 {
                let right_x = 2 * center_x - x;
                if right_x <= x {
                    return Err(PlaceError::internal(format!(
                        "ring site generation produced a bad mirror column {right_x} for {x}"
                    )));
                }
                push_site(&mut sites, Point::new(x, boundary.ylo), Direction::South);
                push_site(&mut sites, Point::new(right_x, boundary.ylo), Direction::South);
                mirror.insert(sites.len() - 2, sites.len() - 1);
                push_site(&mut sites, Point::new(x, boundary.yhi), Direction::North);
                push_site(&mut sites, Point::new(right_x, boundary.yhi), Direction::North);
                mirror.insert(sites.len() - 2, sites.len() - 1);
                x += interval;
            }
        }

        let mut y = boundary.ylo + interval;
        while y < boundary.yhi - interval {
            push_site(&mut sites, Point::new(boundary.xlo, y), Direction::West);
            push_site(&mut sites, Point::new(boundary.xhi, y), Direction::East);
            mirror.insert(sites.len() - 2, sites.len() - 1);
            y += interval;
        }

        let mut seen = HashSet::new();
        for site in &sites {
            if !seen.insert((site.location.x, site.location.y)) {
                return Err(PlaceError::internal(format!(
                    "duplicate ring site at ({}, {})",
                    site.location.x, site.location.y
                )));
            }
        }
        Ok(Self { sites, mirror })
    }

    /// Indices of unassigned left-side sites (those with a mirror partner).
    fn free_left_sites(&self) -> Vec<usize> {
        self.mirror
            .keys()
            .cloned()
            .filter(|&i| !self.sites[i].assigned())
            .collect()
    }

    /// Indices of all unassigned sites.
    fn free_sites(&self) -> Vec<usize> {
        (0..self.sites.len())
            .filter(|&i| !self.sites[i].assigned())
            .collect()
    }

    fn assign(&mut self, db: &mut PlaceDb, site: usize, net: NetId) -> PlaceResult<()> {
        if let Some(prev) = self.sites[site].net {
            return Err(PlaceError::internal(format!(
                "ring site {site} already carries net {prev}"
            )));
        }
        self.sites[site].net = Some(net);
        db.net_mut(net).virtual_pin = Some(self.sites[site]);
        Ok(())
    }
}

/// The HPWL increase of anchoring `net` at `site`: how far the site lies
/// outside the net's current pin bounding box.
fn hpwl_increase(bbox: &Rect, site: Point) -> i64 {
    let dx = (site.x - bbox.xhi).max(bbox.xlo - site.x).max(0);
    let dy = (site.y - bbox.yhi).max(bbox.ylo - site.y).max(0);
    dx + dy
}

/// Assigns a ring terminal to every IO net.
///
/// Returns [`PlaceError::Infeasible`] when there are fewer candidate sites
/// than nets; the driver may retry after a tough-mode global placement.
pub(crate) fn assign_virtual_pins(
    db: &mut PlaceDb,
    params: &PlacerParams,
    sink: &DiagnosticSink,
) -> PlaceResult<()> {
    let io_nets: Vec<NetId> = db
        .nets
        .iter()
        .filter(|n| n.is_io)
        .map(|n| n.id)
        .collect();
    if io_nets.is_empty() || db.cells.is_empty() {
        return Ok(());
    }

    let mut ring = PinRing::generate(db, params)?;
    // A fresh ring invalidates any previously recorded sites.
    db.virtual_pins.clear();

    // Net bounding boxes at the legalized coordinates, one per net.
    let net_bboxes: Vec<Rect> = (0..db.net_count())
        .map(|i| db.net_bbox(NetId::from_raw(i as u32), false))
        .collect();

    // Sym-pair nets enter the matching through their primary member; nets
    // without a partner (including self-symmetric ones) are free.
    let sym_nets: Vec<(NetId, NetId)> = io_nets
        .iter()
        .cloned()
        .filter(|&n| db.net(n).sym_primary)
        .filter_map(|n| db.net(n).sym_partner.map(|p| (n, p)))
        .collect();
    let free_nets: Vec<NetId> = io_nets
        .iter()
        .cloned()
        .filter(|&n| db.net(n).sym_partner.is_none())
        .collect();

    let has_axis_sites = ring
        .sites
        .iter()
        .any(|s| matches!(s.direction, Direction::North | Direction::South));
    for &net in &free_nets {
        if db.net(net).is_self_sym && !has_axis_sites {
            sink.emit(Diagnostic::warning(
                DiagnosticCode::new(Phase::PinAssign, 201),
                format!(
                    "no axis-adjacent ring sites for self-symmetric net '{}'; assigning it freely",
                    db.net(net).name
                ),
            ));
        }
    }

    if params.exact_pin_assign {
        exact_assignment(
            db,
            params,
            sink,
            &mut ring,
            &net_bboxes,
            &sym_nets,
            &free_nets,
            has_axis_sites,
        )?;
    } else {
        fast_assignment(db, sink, &mut ring, &net_bboxes, &sym_nets, &free_nets, has_axis_sites)?;
    }

    for &net in &io_nets {
        if db.net(net).virtual_pin.is_none() {
            return Err(PlaceError::internal(format!(
                "IO net '{}' left without a virtual pin",
                db.net(net).name
            )));
        }
    }
    db.virtual_pins = ring.sites;
    sink.emit(Diagnostic::note(
        DiagnosticCode::new(Phase::PinAssign, 100),
        format!(
            "assigned {} IO nets to ring sites, HPWL with terminals {}",
            io_nets.len(),
            db.hpwl_with_virtual_pins()
        ),
    ));
    Ok(())
}

/// Cost of placing a sym pair with its primary on the given left site,
/// taking the cheaper of the two pair orientations.
fn sym_pair_cost(bboxes: &[Rect], ring: &PinRing, net: NetId, partner: NetId, left: usize) -> i64 {
    let right = ring.mirror[&left];
    let cost0 = hpwl_increase(&bboxes[net.index()], ring.sites[left].location)
        + hpwl_increase(&bboxes[partner.index()], ring.sites[right].location);
    let cost1 = hpwl_increase(&bboxes[partner.index()], ring.sites[left].location)
        + hpwl_increase(&bboxes[net.index()], ring.sites[right].location);
    cost0.min(cost1)
}

/// Assigns a sym pair to a left site and its mirror, picking the cheaper
/// orientation.
fn assign_sym_pair(
    db: &mut PlaceDb,
    bboxes: &[Rect],
    ring: &mut PinRing,
    net: NetId,
    partner: NetId,
    left: usize,
) -> PlaceResult<()> {
    let right = ring.mirror[&left];
    let cost0 = hpwl_increase(&bboxes[net.index()], ring.sites[left].location)
        + hpwl_increase(&bboxes[partner.index()], ring.sites[right].location);
    let cost1 = hpwl_increase(&bboxes[partner.index()], ring.sites[left].location)
        + hpwl_increase(&bboxes[net.index()], ring.sites[right].location);
    if cost0 <= cost1 {
        ring.assign(db, left, net)?;
        ring.assign(db, right, partner)?;
    } else {
        ring.assign(db, left, partner)?;
        ring.assign(db, right, net)?;
    }
    Ok(())
}

/// Cost of a free net on a site, steering restricted self-symmetric nets
/// toward axis-adjacent (north/south) sites when any exist.
fn free_net_cost(
    db: &PlaceDb,
    bboxes: &[Rect],
    ring: &PinRing,
    net: NetId,
    site: usize,
    has_axis_sites: bool,
) -> i64 {
    let base = hpwl_increase(&bboxes[net.index()], ring.sites[site].location);
    if db.net(net).is_self_sym
        && has_axis_sites
        && matches!(ring.sites[site].direction, Direction::East | Direction::West)
    {
        base + FORBIDDEN_SITE_COST
    } else {
        base
    }
}

/// Fast path: two sequential min-cost bipartite matchings.
fn fast_assignment(
    db: &mut PlaceDb,
    _sink: &DiagnosticSink,
    ring: &mut PinRing,
    bboxes: &[Rect],
    sym_nets: &[(NetId, NetId)],
    free_nets: &[NetId],
    has_axis_sites: bool,
) -> PlaceResult<()> {
    // Sym pairs first, over mirror-paired left sites.
    if !sym_nets.is_empty() {
        let left_sites = ring.free_left_sites();
        if sym_nets.len() > left_sites.len() {
            return Err(PlaceError::Infeasible {
                phase: "pin assignment",
            });
        }
        let rows: Vec<Vec<i64>> = sym_nets
            .iter()
            .map(|&(net, partner)| {
                left_sites
                    .iter()
                    .map(|&site| sym_pair_cost(bboxes, ring, net, partner, site))
                    .collect()
            })
            .collect();
        let matrix = Matrix::from_rows(rows)
            .map_err(|e| PlaceError::internal(format!("pin cost matrix: {e}")))?;
        let (_, assignment) = kuhn_munkres_min(&matrix);
        for (row, &col) in assignment.iter().enumerate() {
            let (net, partner) = sym_nets[row];
            assign_sym_pair(db, bboxes, ring, net, partner, left_sites[col])?;
        }
    }

    // Free nets over whatever is left.
    if !free_nets.is_empty() {
        let sites = ring.free_sites();
        if free_nets.len() > sites.len() {
            return Err(PlaceError::Infeasible {
                phase: "pin assignment",
            });
        }
        let rows: Vec<Vec<i64>> = free_nets
            .iter()
            .map(|&net| {
                sites
                    .iter()
                    .map(|&site| free_net_cost(db, bboxes, ring, net, site, has_axis_sites))
                    .collect()
            })
            .collect();
        let matrix = Matrix::from_rows(rows)
            .map_err(|e| PlaceError::internal(format!("pin cost matrix: {e}")))?;
        let (_, assignment) = kuhn_munkres_min(&matrix);
        for (row, &col) in assignment.iter().enumerate() {
            ring.assign(db, sites[col], free_nets[row])?;
        }
    }
    Ok(())
}

/// Exact path: one relaxed assignment program with conflict constraints.
///
/// Decision variables pick a left site per sym pair and a site per free net;
/// a site and its mirror cannot serve a pair and a free net at once. Free
/// nets carry the same steering costs as the fast path. Any fractional
/// component in the solution is fatal.
#[allow(clippy::too_many_arguments)]
fn exact_assignment(
    db: &mut PlaceDb,
    params: &PlacerParams,
    sink: &DiagnosticSink,
    ring: &mut PinRing,
    bboxes: &[Rect],
    sym_nets: &[(NetId, NetId)],
    free_nets: &[NetId],
    has_axis_sites: bool,
) -> PlaceResult<()> {
    let left_sites = ring.free_left_sites();
    let all_sites = ring.free_sites();
    let m = left_sites.len();
    let ns = sym_nets.len();
    let na = free_nets.len();
    if ns + na == 0 {
        return Ok(());
    }
    if m < ns || all_sites.len() < ns + na {
        return Err(PlaceError::Infeasible {
            phase: "pin assignment",
        });
    }
    if all_sites.len() != 2 * m {
        return Err(PlaceError::internal(
            "ring sites are not fully mirror-paired".to_string(),
        ));
    }
    let site_pos: BTreeMap<usize, usize> = all_sites
        .iter()
        .enumerate()
        .map(|(pos, &site)| (site, pos))
        .collect();

    let mut lp = LpProblem::minimize("pin assignment");
    lp.set_num_threads(params.num_threads);
    // xs[i][j]: sym pair j anchored at left site i; ys[i][j]: free net j at site i.
    let xs: Vec<Vec<LpVar>> = left_sites
        .iter()
        .map(|&site| {
            sym_nets
                .iter()
                .map(|&(net, partner)| {
                    lp.add_unit_var(sym_pair_cost(bboxes, ring, net, partner, site) as f64)
                })
                .collect()
        })
        .collect();
    let ys: Vec<Vec<LpVar>> = all_sites
        .iter()
        .map(|&site| {
            free_nets
                .iter()
                .map(|&net| {
                    lp.add_unit_var(
                        free_net_cost(db, bboxes, ring, net, site, has_axis_sites) as f64,
                    )
                })
                .collect()
        })
        .collect();

    // Every net is assigned exactly once.
    for j in 0..ns {
        let terms: Vec<(LpVar, f64)> = (0..m).map(|i| (xs[i][j], 1.0)).collect();
        lp.add_constraint(&terms, LpOp::Eq, 1.0);
    }
    for j in 0..na {
        let terms: Vec<(LpVar, f64)> = (0..2 * m).map(|i| (ys[i][j], 1.0)).collect();
        lp.add_constraint(&terms, LpOp::Eq, 1.0);
    }
    // A pair consumes a left site and its mirror; neither may also serve a
    // free net, and no site serves two free nets.
    for (i, &left) in left_sites.iter().enumerate() {
        let right = ring.mirror[&left];
        for &conflict_site in &[left, right] {
            let pos = site_pos[&conflict_site];
            let mut terms: Vec<(LpVar, f64)> = (0..ns).map(|j| (xs[i][j], 1.0)).collect();
            terms.extend((0..na).map(|j| (ys[pos][j], 1.0)));
            lp.add_constraint(&terms, LpOp::Le, 1.0);
        }
    }

    let solution = lp.solve()?;

    for (i, &left) in left_sites.iter().enumerate() {
        for (j, &(net, partner)) in sym_nets.iter().enumerate() {
            let value = solution.value(xs[i][j]);
            if value > INTEGRALITY_LO && value < INTEGRALITY_HI {
                return Err(non_integral(db, sink, net, value));
            }
            if value >= INTEGRALITY_HI {
                assign_sym_pair(db, bboxes, ring, net, partner, left)?;
            }
        }
    }
    for (i, &site) in all_sites.iter().enumerate() {
        for (j, &net) in free_nets.iter().enumerate() {
            let value = solution.value(ys[i][j]);
            if value > INTEGRALITY_LO && value < INTEGRALITY_HI {
                return Err(non_integral(db, sink, net, value));
            }
            if value >= INTEGRALITY_HI {
                ring.assign(db, site, net)?;
            }
        }
    }
    Ok(())
}

/// Reports a fractional decision variable: diagnostic dump plus the fatal error.
fn non_integral(db: &PlaceDb, sink: &DiagnosticSink, net: NetId, value: f64) -> PlaceError {
    sink.emit(Diagnostic::error(
        DiagnosticCode::new(Phase::PinAssign, 301),
        format!(
            "pin assignment produced fractional value {value:.4} for net '{}'",
            db.net(net).name
        ),
    ));
    PlaceError::NonIntegralSolution {
        net: net.index(),
        value,
    }
}
