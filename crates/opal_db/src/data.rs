//! Core placement database data structures.
//!
//! Defines the design snapshot used throughout the placement pipeline: cells
//! (with mutable lower-left coordinates), pins (offset rectangles inside
//! cells), nets (pin lists with weight, symmetry, and IO attributes),
//! symmetry groups, and proximity groups. The [`PlaceDb`] is the central
//! structure that flows through global placement, legalization, pin
//! assignment, and grid alignment.

use crate::ids::{CellId, NetId, PinId, ProximityGroupId, SymGroupId, VirtualPinId};
use opal_common::{PlaceError, PlaceResult, Point, Rect};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A rectangular cell to be placed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    /// The unique ID of this cell.
    pub id: CellId,
    /// Human-readable cell name (e.g., "M1", "diffpair_left").
    pub name: String,
    /// Cell width in database units.
    pub width: i64,
    /// Cell height in database units.
    pub height: i64,
    /// Lower-left x coordinate.
    pub x: i64,
    /// Lower-left y coordinate.
    pub y: i64,
    /// Whether this cell's position is fixed and must not be moved.
    pub is_fixed: bool,
    /// The pins owned by this cell.
    pub pins: Vec<PinId>,
    /// The symmetry group this cell belongs to, if any.
    pub sym_group: Option<SymGroupId>,
}

impl Cell {
    /// The rectangle this cell currently occupies.
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    /// The area of this cell.
    pub fn area(&self) -> i64 {
        self.width * self.height
    }

    /// The x coordinate of the cell center.
    pub fn center_x(&self) -> i64 {
        self.x + self.width / 2
    }
}

/// A pin on a cell, stored as an offset rectangle inside the cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pin {
    /// The unique ID of this pin.
    pub id: PinId,
    /// Human-readable pin name (e.g., "G", "D", "S").
    pub name: String,
    /// The cell that owns this pin.
    pub cell: CellId,
    /// The pin shape relative to the cell's lower-left corner.
    pub offset: Rect,
    /// Whether this pin connects to an external IO net.
    pub is_io: bool,
}

impl Pin {
    /// The pin center offset from the owning cell's lower-left corner.
    pub fn offset_center(&self) -> Point {
        self.offset.center()
    }
}

/// A net connecting pins, with optional symmetry and IO attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Net {
    /// The unique ID of this net.
    pub id: NetId,
    /// Human-readable net name.
    pub name: String,
    /// The pins on this net, in input order.
    pub pins: Vec<PinId>,
    /// The net weight used by wirelength objectives.
    pub weight: f64,
    /// The symmetric partner net, if this net is part of a symmetric pair.
    pub sym_partner: Option<NetId>,
    /// Whether this net is the primary member of its symmetric pair.
    pub sym_primary: bool,
    /// Whether this net is symmetric to itself about the axis.
    pub is_self_sym: bool,
    /// Whether this net has an external terminal on the placement ring.
    pub is_io: bool,
    /// Whether the signal-flow (cosine alignment) objective applies to this net.
    pub is_signal_flow: bool,
    /// The ring terminal assigned by pin assignment (`None` = unassigned).
    pub virtual_pin: Option<VirtualPin>,
}

/// The compass direction of a ring pin site.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Direction {
    /// Top edge of the ring.
    North,
    /// Bottom edge of the ring.
    South,
    /// Right edge of the ring.
    East,
    /// Left edge of the ring.
    West,
}

/// An external net terminal site on the placement ring.
///
/// Pin assignment generates one per candidate ring location and records the
/// whole list in the database; an assigned site carries its net, and the net
/// carries a copy of the site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualPin {
    /// The unique ID of this ring site.
    pub id: VirtualPinId,
    /// The location of the terminal.
    pub location: Point,
    /// Which ring edge the terminal sits on.
    pub direction: Direction,
    /// The net anchored at this site (`None` = unassigned).
    pub net: Option<NetId>,
}

impl VirtualPin {
    /// Returns `true` once a net has been anchored at this site.
    pub fn assigned(&self) -> bool {
        self.net.is_some()
    }
}

/// A set of cell pairs sharing one vertical symmetry axis.
///
/// For every pair `(a, b)` the placer enforces `y_a = y_b` and
/// `center_x(a) + center_x(b) = 2·axis`; every self-symmetric cell is
/// centered on the axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymGroup {
    /// The unique ID of this group.
    pub id: SymGroupId,
    /// Mirrored cell pairs.
    pub pairs: Vec<(CellId, CellId)>,
    /// Cells centered on the axis.
    pub self_cells: Vec<CellId>,
    /// The axis resolved by legalization (`None` before legalization).
    pub axis: Option<f64>,
}

/// A set of cells that should be placed close to each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityGroup {
    /// The unique ID of this group.
    pub id: ProximityGroupId,
    /// The member cells.
    pub cells: Vec<CellId>,
}

/// The placement database.
///
/// Constructed by the caller, mutated only at pipeline handoff points (cell
/// coordinates at global-placement and legalization end, virtual pins at
/// pin-assignment end, group axes at legalization end), and read back after
/// grid alignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceDb {
    /// All cells in the design.
    pub cells: Vec<Cell>,
    /// All pins in the design.
    pub pins: Vec<Pin>,
    /// All nets in the design.
    pub nets: Vec<Net>,
    /// All symmetry groups.
    pub sym_groups: Vec<SymGroup>,
    /// All proximity groups.
    pub proximity_groups: Vec<ProximityGroup>,
    /// The ring pin sites generated by the last pin-assignment run.
    pub virtual_pins: Vec<VirtualPin>,
    /// Auxiliary index: cell name to ID (rebuilt on deserialization).
    #[serde(skip)]
    pub cell_by_name: HashMap<String, CellId>,
    /// Auxiliary index: net name to ID (rebuilt on deserialization).
    #[serde(skip)]
    pub net_by_name: HashMap<String, NetId>,
}

impl PlaceDb {
    /// Creates an empty placement database.
    pub fn new() -> Self {
        Self {
            cells: Vec::new(),
            pins: Vec::new(),
            nets: Vec::new(),
            sym_groups: Vec::new(),
            proximity_groups: Vec::new(),
            virtual_pins: Vec::new(),
            cell_by_name: HashMap::new(),
            net_by_name: HashMap::new(),
        }
    }

    /// Adds a cell and returns its ID.
    pub fn add_cell(&mut self, mut cell: Cell) -> CellId {
        let id = CellId::from_raw(self.cells.len() as u32);
        cell.id = id;
        self.cell_by_name.insert(cell.name.clone(), id);
        self.cells.push(cell);
        id
    }

    /// Adds a pin, wiring it into its owning cell, and returns its ID.
    pub fn add_pin(&mut self, mut pin: Pin) -> PinId {
        let id = PinId::from_raw(self.pins.len() as u32);
        pin.id = id;
        if let Some(cell) = self.cells.get_mut(pin.cell.index()) {
            cell.pins.push(id);
        }
        self.pins.push(pin);
        id
    }

    /// Adds a net and returns its ID.
    pub fn add_net(&mut self, mut net: Net) -> NetId {
        let id = NetId::from_raw(self.nets.len() as u32);
        net.id = id;
        self.net_by_name.insert(net.name.clone(), id);
        self.nets.push(net);
        id
    }

    /// Adds a symmetry group, marking its member cells, and returns its ID.
    pub fn add_sym_group(&mut self, pairs: Vec<(CellId, CellId)>, self_cells: Vec<CellId>) -> SymGroupId {
        let id = SymGroupId::from_raw(self.sym_groups.len() as u32);
        for &(a, b) in &pairs {
            if let Some(cell) = self.cells.get_mut(a.index()) {
                cell.sym_group = Some(id);
            }
            if let Some(cell) = self.cells.get_mut(b.index()) {
                cell.sym_group = Some(id);
            }
        }
        for &c in &self_cells {
            if let Some(cell) = self.cells.get_mut(c.index()) {
                cell.sym_group = Some(id);
            }
        }
        self.sym_groups.push(SymGroup {
            id,
            pairs,
            self_cells,
            axis: None,
        });
        id
    }

    /// Adds a proximity group and returns its ID.
    pub fn add_proximity_group(&mut self, cells: Vec<CellId>) -> ProximityGroupId {
        let id = ProximityGroupId::from_raw(self.proximity_groups.len() as u32);
        self.proximity_groups.push(ProximityGroup { id, cells });
        id
    }

    /// Marks `a` and `b` as a symmetric net pair with `a` as the primary member.
    pub fn set_sym_pair(&mut self, a: NetId, b: NetId) {
        self.nets[a.index()].sym_partner = Some(b);
        self.nets[a.index()].sym_primary = true;
        self.nets[b.index()].sym_partner = Some(a);
        self.nets[b.index()].sym_primary = false;
    }

    /// Returns the cell with the given ID.
    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id.index()]
    }

    /// Returns a mutable reference to the cell with the given ID.
    pub fn cell_mut(&mut self, id: CellId) -> &mut Cell {
        &mut self.cells[id.index()]
    }

    /// Returns the pin with the given ID.
    pub fn pin(&self, id: PinId) -> &Pin {
        &self.pins[id.index()]
    }

    /// Returns the net with the given ID.
    pub fn net(&self, id: NetId) -> &Net {
        &self.nets[id.index()]
    }

    /// Returns a mutable reference to the net with the given ID.
    pub fn net_mut(&mut self, id: NetId) -> &mut Net {
        &mut self.nets[id.index()]
    }

    /// Returns the number of cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Returns the number of nets.
    pub fn net_count(&self) -> usize {
        self.nets.len()
    }

    /// Returns the number of pins.
    pub fn pin_count(&self) -> usize {
        self.pins.len()
    }

    /// Returns the ring site with the given ID.
    pub fn virtual_pin(&self, id: VirtualPinId) -> &VirtualPin {
        &self.virtual_pins[id.index()]
    }

    /// The absolute location of a pin: cell lower-left plus the pin's offset center.
    pub fn pin_location(&self, id: PinId) -> Point {
        let pin = self.pin(id);
        let cell = self.cell(pin.cell);
        let off = pin.offset_center();
        Point::new(cell.x + off.x, cell.y + off.y)
    }

    /// The bounding box of all cells; the empty rectangle when there are none.
    pub fn bounding_box(&self) -> Rect {
        let mut bbox = Rect::empty();
        for cell in &self.cells {
            bbox = bbox.union(&cell.rect());
        }
        bbox
    }

    /// The summed area of all cells.
    pub fn total_cell_area(&self) -> i64 {
        self.cells.iter().map(Cell::area).sum()
    }

    /// The bounding box of a net's pins, optionally including its virtual pin.
    pub fn net_bbox(&self, id: NetId, include_virtual: bool) -> Rect {
        let net = self.net(id);
        let mut bbox = Rect::empty();
        for &pin in &net.pins {
            bbox.join_point(self.pin_location(pin));
        }
        if include_virtual {
            if let Some(vp) = net.virtual_pin {
                bbox.join_point(vp.location);
            }
        }
        bbox
    }

    /// Total half-perimeter wirelength over all nets, ignoring virtual pins.
    ///
    /// HPWL is the half-perimeter of the bounding box of each net's pins.
    /// It is the standard placement metric; minimizing it tends to produce
    /// good routability.
    pub fn hpwl(&self) -> i64 {
        self.hpwl_impl(false)
    }

    /// Total half-perimeter wirelength including assigned virtual pins.
    pub fn hpwl_with_virtual_pins(&self) -> i64 {
        self.hpwl_impl(true)
    }

    fn hpwl_impl(&self, include_virtual: bool) -> i64 {
        let mut total = 0;
        for i in 0..self.nets.len() {
            let bbox = self.net_bbox(NetId::from_raw(i as u32), include_virtual);
            if !bbox.is_empty() {
                total += bbox.width() + bbox.height();
            }
        }
        total
    }

    /// Pads every cell's width and height up to the next multiple of `grid_step`.
    ///
    /// Run before placement when a grid step is configured so that legalized
    /// lower-left coordinates can snap without reintroducing overlap.
    pub fn expand_to_grid(&mut self, grid_step: i64) {
        if grid_step <= 0 {
            return;
        }
        for cell in &mut self.cells {
            let rem_w = cell.width % grid_step;
            if rem_w != 0 {
                cell.width += grid_step - rem_w;
            }
            let rem_h = cell.height % grid_step;
            if rem_h != 0 {
                cell.height += grid_step - rem_h;
            }
        }
    }

    /// Checks referential integrity of the database.
    ///
    /// Verifies that every pin points at an existing cell, every net lists
    /// only existing pins and is non-empty, and every symmetry or proximity
    /// group references existing cells. Cells in more than one symmetry pair
    /// of the same group are rejected.
    pub fn validate(&self) -> PlaceResult<()> {
        for pin in &self.pins {
            if pin.cell.index() >= self.cells.len() {
                return Err(PlaceError::InvalidInput(format!(
                    "pin '{}' refers to unknown cell {}",
                    pin.name, pin.cell
                )));
            }
        }
        for net in &self.nets {
            if net.pins.is_empty() {
                return Err(PlaceError::InvalidInput(format!(
                    "net '{}' has no pins",
                    net.name
                )));
            }
            for &pin in &net.pins {
                if pin.index() >= self.pins.len() {
                    return Err(PlaceError::InvalidInput(format!(
                        "net '{}' refers to unknown pin {}",
                        net.name, pin
                    )));
                }
            }
            if let Some(partner) = net.sym_partner {
                if partner.index() >= self.nets.len() {
                    return Err(PlaceError::InvalidInput(format!(
                        "net '{}' refers to unknown partner net {}",
                        net.name, partner
                    )));
                }
            }
        }
        for group in &self.sym_groups {
            let mut seen = std::collections::HashSet::new();
            for &(a, b) in &group.pairs {
                for id in [a, b] {
                    if id.index() >= self.cells.len() {
                        return Err(PlaceError::InvalidInput(format!(
                            "symmetry group {} refers to unknown cell {}",
                            group.id, id
                        )));
                    }
                    if !seen.insert(id) {
                        return Err(PlaceError::InvalidInput(format!(
                            "cell {} appears twice in symmetry group {}",
                            id, group.id
                        )));
                    }
                }
            }
            for &c in &group.self_cells {
                if c.index() >= self.cells.len() {
                    return Err(PlaceError::InvalidInput(format!(
                        "symmetry group {} refers to unknown cell {}",
                        group.id, c
                    )));
                }
                if !seen.insert(c) {
                    return Err(PlaceError::InvalidInput(format!(
                        "cell {} appears twice in symmetry group {}",
                        c, group.id
                    )));
                }
            }
        }
        for group in &self.proximity_groups {
            for &c in &group.cells {
                if c.index() >= self.cells.len() {
                    return Err(PlaceError::InvalidInput(format!(
                        "proximity group {} refers to unknown cell {}",
                        group.id, c
                    )));
                }
            }
        }
        Ok(())
    }

    /// Rebuilds auxiliary name indices after deserialization.
    pub fn rebuild_indices(&mut self) {
        self.cell_by_name.clear();
        for (i, cell) in self.cells.iter().enumerate() {
            self.cell_by_name
                .insert(cell.name.clone(), CellId::from_raw(i as u32));
        }
        self.net_by_name.clear();
        for (i, net) in self.nets.iter().enumerate() {
            self.net_by_name
                .insert(net.name.clone(), NetId::from_raw(i as u32));
        }
    }
}

impl Default for PlaceDb {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_cell(name: &str, w: i64, h: i64) -> Cell {
        Cell {
            id: CellId::from_raw(0),
            name: name.to_string(),
            width: w,
            height: h,
            x: 0,
            y: 0,
            is_fixed: false,
            pins: Vec::new(),
            sym_group: None,
        }
    }

    fn make_pin(cell: CellId, name: &str, off_x: i64, off_y: i64) -> Pin {
        Pin {
            id: PinId::from_raw(0),
            name: name.to_string(),
            cell,
            offset: Rect::new(off_x, off_y, off_x, off_y),
            is_io: false,
        }
    }

    fn make_net(name: &str, pins: Vec<PinId>) -> Net {
        Net {
            id: NetId::from_raw(0),
            name: name.to_string(),
            pins,
            weight: 1.0,
            sym_partner: None,
            sym_primary: false,
            is_self_sym: false,
            is_io: false,
            is_signal_flow: false,
            virtual_pin: None,
        }
    }

    #[test]
    fn empty_db() {
        let db = PlaceDb::new();
        assert_eq!(db.cell_count(), 0);
        assert_eq!(db.net_count(), 0);
        assert_eq!(db.pin_count(), 0);
        assert!(db.validate().is_ok());
        assert_eq!(db.hpwl(), 0);
    }

    #[test]
    fn add_cell_indexes_name() {
        let mut db = PlaceDb::new();
        let id = db.add_cell(make_cell("m1", 10, 10));
        assert_eq!(db.cell(id).name, "m1");
        assert_eq!(db.cell_by_name.get("m1"), Some(&id));
    }

    #[test]
    fn add_pin_wires_into_cell() {
        let mut db = PlaceDb::new();
        let c = db.add_cell(make_cell("m1", 10, 10));
        let p = db.add_pin(make_pin(c, "g", 5, 5));
        assert_eq!(db.cell(c).pins, vec![p]);
        assert_eq!(db.pin(p).cell, c);
    }

    #[test]
    fn pin_location_is_cell_plus_offset() {
        let mut db = PlaceDb::new();
        let c = db.add_cell(make_cell("m1", 10, 10));
        let p = db.add_pin(make_pin(c, "g", 5, 7));
        db.cell_mut(c).x = 100;
        db.cell_mut(c).y = 200;
        assert_eq!(db.pin_location(p), Point::new(105, 207));
    }

    #[test]
    fn hpwl_two_cell_net() {
        let mut db = PlaceDb::new();
        let c0 = db.add_cell(make_cell("a", 10, 10));
        let c1 = db.add_cell(make_cell("b", 10, 10));
        let p0 = db.add_pin(make_pin(c0, "p", 5, 5));
        let p1 = db.add_pin(make_pin(c1, "p", 5, 5));
        db.add_net(make_net("n", vec![p0, p1]));
        db.cell_mut(c1).x = 30;
        db.cell_mut(c1).y = 40;
        assert_eq!(db.hpwl(), 30 + 40);
    }

    #[test]
    fn hpwl_with_virtual_pin_extends_bbox() {
        let mut db = PlaceDb::new();
        let c0 = db.add_cell(make_cell("a", 10, 10));
        let p0 = db.add_pin(make_pin(c0, "p", 5, 5));
        let n = db.add_net(make_net("n", vec![p0]));
        assert_eq!(db.hpwl(), 0);
        db.net_mut(n).virtual_pin = Some(VirtualPin {
            id: VirtualPinId::from_raw(0),
            location: Point::new(105, 5),
            direction: Direction::East,
            net: Some(n),
        });
        assert_eq!(db.hpwl(), 0);
        assert_eq!(db.hpwl_with_virtual_pins(), 100);
    }

    #[test]
    fn virtual_pin_assignment_state() {
        let mut db = PlaceDb::new();
        let c = db.add_cell(make_cell("a", 10, 10));
        let p = db.add_pin(make_pin(c, "p", 5, 5));
        let n = db.add_net(make_net("io", vec![p]));
        db.virtual_pins.push(VirtualPin {
            id: VirtualPinId::from_raw(0),
            location: Point::new(-10, 5),
            direction: Direction::West,
            net: None,
        });
        assert!(!db.virtual_pin(VirtualPinId::from_raw(0)).assigned());

        db.virtual_pins[0].net = Some(n);
        assert!(db.virtual_pin(VirtualPinId::from_raw(0)).assigned());
        assert_eq!(db.virtual_pins[0].net, Some(n));
    }

    #[test]
    fn sym_pair_marks_primary() {
        let mut db = PlaceDb::new();
        let c = db.add_cell(make_cell("a", 10, 10));
        let p0 = db.add_pin(make_pin(c, "p0", 1, 1));
        let p1 = db.add_pin(make_pin(c, "p1", 2, 2));
        let n0 = db.add_net(make_net("n0", vec![p0]));
        let n1 = db.add_net(make_net("n1", vec![p1]));
        db.set_sym_pair(n0, n1);
        assert_eq!(db.net(n0).sym_partner, Some(n1));
        assert!(db.net(n0).sym_primary);
        assert_eq!(db.net(n1).sym_partner, Some(n0));
        assert!(!db.net(n1).sym_primary);
    }

    #[test]
    fn sym_group_marks_cells() {
        let mut db = PlaceDb::new();
        let a = db.add_cell(make_cell("a", 10, 10));
        let b = db.add_cell(make_cell("b", 10, 10));
        let c = db.add_cell(make_cell("c", 10, 10));
        let g = db.add_sym_group(vec![(a, b)], vec![c]);
        assert_eq!(db.cell(a).sym_group, Some(g));
        assert_eq!(db.cell(b).sym_group, Some(g));
        assert_eq!(db.cell(c).sym_group, Some(g));
    }

    #[test]
    fn validate_rejects_empty_net() {
        let mut db = PlaceDb::new();
        db.add_net(make_net("n", vec![]));
        assert!(db.validate().is_err());
    }

    #[test]
    fn validate_rejects_dangling_pin() {
        let mut db = PlaceDb::new();
        db.pins.push(make_pin(CellId::from_raw(5), "p", 0, 0));
        assert!(db.validate().is_err());
    }

    #[test]
    fn validate_rejects_repeated_sym_cell() {
        let mut db = PlaceDb::new();
        let a = db.add_cell(make_cell("a", 10, 10));
        let b = db.add_cell(make_cell("b", 10, 10));
        db.add_sym_group(vec![(a, b), (a, b)], vec![]);
        assert!(db.validate().is_err());
    }

    #[test]
    fn expand_to_grid_pads_dimensions() {
        let mut db = PlaceDb::new();
        db.add_cell(make_cell("a", 13, 20));
        db.expand_to_grid(4);
        assert_eq!(db.cells[0].width, 16);
        assert_eq!(db.cells[0].height, 20);
    }

    #[test]
    fn expand_to_grid_zero_is_noop() {
        let mut db = PlaceDb::new();
        db.add_cell(make_cell("a", 13, 20));
        db.expand_to_grid(0);
        assert_eq!(db.cells[0].width, 13);
    }

    #[test]
    fn bounding_box_covers_all_cells() {
        let mut db = PlaceDb::new();
        let a = db.add_cell(make_cell("a", 10, 10));
        let b = db.add_cell(make_cell("b", 5, 5));
        db.cell_mut(a).x = -5;
        db.cell_mut(b).x = 20;
        db.cell_mut(b).y = 30;
        assert_eq!(db.bounding_box(), Rect::new(-5, 0, 25, 35));
    }

    #[test]
    fn total_cell_area_sums() {
        let mut db = PlaceDb::new();
        db.add_cell(make_cell("a", 10, 10));
        db.add_cell(make_cell("b", 5, 4));
        assert_eq!(db.total_cell_area(), 120);
    }

    #[test]
    fn serde_roundtrip_rebuilds_indices() {
        let mut db = PlaceDb::new();
        let c = db.add_cell(make_cell("m1", 10, 10));
        let p = db.add_pin(make_pin(c, "g", 5, 5));
        db.add_net(make_net("n0", vec![p]));

        let json = serde_json::to_string(&db).unwrap();
        let mut restored: PlaceDb = serde_json::from_str(&json).unwrap();
        restored.rebuild_indices();

        assert_eq!(restored.cell_count(), 1);
        assert!(restored.cell_by_name.contains_key("m1"));
        assert!(restored.net_by_name.contains_key("n0"));
    }
}
