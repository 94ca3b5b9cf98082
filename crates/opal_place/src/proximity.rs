//! Proximity groups realized as temporary synthetic nets.
//!
//! Before global placement each proximity group receives one high-weight net
//! with a synthetic center pin per member cell, pulling the members together
//! through the ordinary wirelength objective. The manager records the
//! pre-injection database extents and restores them after legalization, on
//! every exit path.

use opal_common::Rect;
use opal_db::{Net, NetId, Pin, PinId, PlaceDb};

/// Tracks synthetic proximity nets so they can be removed again.
pub(crate) struct ProximityMgr {
    saved_nets: usize,
    saved_pins: usize,
    saved_cell_pins: Vec<usize>,
    applied: bool,
}

impl ProximityMgr {
    /// Creates a manager that has not injected anything yet.
    pub fn new() -> Self {
        Self {
            saved_nets: 0,
            saved_pins: 0,
            saved_cell_pins: Vec::new(),
            applied: false,
        }
    }

    /// Injects one synthetic net per proximity group with at least two cells.
    ///
    /// Each member contributes a zero-size pin at its center, so the net's
    /// wirelength is the spread of the group's cell centers.
    pub fn apply(&mut self, db: &mut PlaceDb, weight: f64) {
        self.saved_nets = db.nets.len();
        self.saved_pins = db.pins.len();
        self.saved_cell_pins = db.cells.iter().map(|c| c.pins.len()).collect();
        self.applied = true;

        for g in 0..db.proximity_groups.len() {
            let members = db.proximity_groups[g].cells.clone();
            if members.len() < 2 {
                continue;
            }
            let mut pins = Vec::with_capacity(members.len());
            for cell_id in members {
                let (cx, cy) = {
                    let cell = db.cell(cell_id);
                    (cell.width / 2, cell.height / 2)
                };
                pins.push(db.add_pin(Pin {
                    id: PinId::from_raw(0),
                    name: format!("prox_{g}_{}", cell_id),
                    cell: cell_id,
                    offset: Rect::new(cx, cy, cx, cy),
                    is_io: false,
                }));
            }
            db.add_net(Net {
                id: NetId::from_raw(0),
                name: format!("prox_net_{g}"),
                pins,
                weight,
                sym_partner: None,
                sym_primary: false,
                is_self_sym: false,
                is_io: false,
                is_signal_flow: false,
                virtual_pin: None,
            });
        }
    }

    /// Removes every injected net and pin, restoring the recorded extents.
    pub fn restore(&self, db: &mut PlaceDb) {
        if !self.applied {
            return;
        }
        for net in db.nets.drain(self.saved_nets..) {
            db.net_by_name.remove(&net.name);
        }
        db.pins.truncate(self.saved_pins);
        for (cell, &count) in db.cells.iter_mut().zip(self.saved_cell_pins.iter()) {
            cell.pins.truncate(count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_db::{Cell, CellId};

    fn add_cell(db: &mut PlaceDb, name: &str, w: i64, h: i64) -> CellId {
        db.add_cell(Cell {
            id: CellId::from_raw(0),
            name: name.to_string(),
            width: w,
            height: h,
            x: 0,
            y: 0,
            is_fixed: false,
            pins: Vec::new(),
            sym_group: None,
        })
    }

    #[test]
    fn apply_injects_one_net_per_group() {
        let mut db = PlaceDb::new();
        let a = add_cell(&mut db, "a", 10, 10);
        let b = add_cell(&mut db, "b", 10, 10);
        let c = add_cell(&mut db, "c", 10, 10);
        db.add_proximity_group(vec![a, b]);
        db.add_proximity_group(vec![c]); // singleton, skipped

        let mut mgr = ProximityMgr::new();
        mgr.apply(&mut db, 16.0);

        assert_eq!(db.net_count(), 1);
        assert_eq!(db.pin_count(), 2);
        assert_eq!(db.nets[0].weight, 16.0);
        assert_eq!(db.cell(a).pins.len(), 1);
        assert_eq!(db.cell(c).pins.len(), 0);
    }

    #[test]
    fn synthetic_pins_sit_at_cell_centers() {
        let mut db = PlaceDb::new();
        let a = add_cell(&mut db, "a", 10, 20);
        let b = add_cell(&mut db, "b", 6, 8);
        db.add_proximity_group(vec![a, b]);

        let mut mgr = ProximityMgr::new();
        mgr.apply(&mut db, 8.0);
        db.cell_mut(a).x = 100;
        db.cell_mut(a).y = 200;

        let pin = db.cell(a).pins[0];
        let loc = db.pin_location(pin);
        assert_eq!((loc.x, loc.y), (105, 210));
    }

    #[test]
    fn restore_removes_everything_injected() {
        let mut db = PlaceDb::new();
        let a = add_cell(&mut db, "a", 10, 10);
        let b = add_cell(&mut db, "b", 10, 10);
        db.add_proximity_group(vec![a, b]);

        let mut mgr = ProximityMgr::new();
        mgr.apply(&mut db, 16.0);
        assert_eq!(db.net_count(), 1);
        mgr.restore(&mut db);

        assert_eq!(db.net_count(), 0);
        assert_eq!(db.pin_count(), 0);
        assert_eq!(db.cell(a).pins.len(), 0);
        assert!(!db.net_by_name.contains_key("prox_net_0"));
    }

    #[test]
    fn restore_without_apply_is_a_noop() {
        let mut db = PlaceDb::new();
        let a = add_cell(&mut db, "a", 10, 10);
        let b = add_cell(&mut db, "b", 10, 10);
        db.add_proximity_group(vec![a, b]);
        let mgr = ProximityMgr::new();
        mgr.restore(&mut db);
        assert_eq!(db.cell_count(), 2);
    }

    #[test]
    fn restore_keeps_preexisting_nets() {
        let mut db = PlaceDb::new();
        let a = add_cell(&mut db, "a", 10, 10);
        let b = add_cell(&mut db, "b", 10, 10);
        let p = db.add_pin(Pin {
            id: PinId::from_raw(0),
            name: "p".to_string(),
            cell: a,
            offset: Rect::new(5, 5, 5, 5),
            is_io: false,
        });
        db.add_net(Net {
            id: NetId::from_raw(0),
            name: "keep".to_string(),
            pins: vec![p],
            weight: 1.0,
            sym_partner: None,
            sym_primary: false,
            is_self_sym: false,
            is_io: false,
            is_signal_flow: false,
            virtual_pin: None,
        });
        db.add_proximity_group(vec![a, b]);

        let mut mgr = ProximityMgr::new();
        mgr.apply(&mut db, 16.0);
        assert_eq!(db.net_count(), 2);
        mgr.restore(&mut db);
        assert_eq!(db.net_count(), 1);
        assert!(db.net_by_name.contains_key("keep"));
        assert_eq!(db.cell(a).pins.len(), 1);
    }
}
