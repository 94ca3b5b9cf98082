//! Opaque ID newtypes for placement database entities.
//!
//! [`CellId`], [`PinId`], [`NetId`], [`SymGroupId`], [`ProximityGroupId`],
//! and [`VirtualPinId`] are thin `u32` wrappers used as arena indices into
//! the placement database. They are `Copy`, `Hash`, and
//! `Serialize`/`Deserialize`.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }

            /// Returns the index as a `usize` for direct vector indexing.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Opaque, copyable ID for a cell in the placement database.
    CellId
);

define_id!(
    /// Opaque, copyable ID for a pin in the placement database.
    PinId
);

define_id!(
    /// Opaque, copyable ID for a net in the placement database.
    NetId
);

define_id!(
    /// Opaque, copyable ID for a symmetry group.
    SymGroupId
);

define_id!(
    /// Opaque, copyable ID for a proximity group.
    ProximityGroupId
);

define_id!(
    /// Opaque, copyable ID for a virtual pin site on the placement ring.
    VirtualPinId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn cell_id_roundtrip() {
        let id = CellId::from_raw(42);
        assert_eq!(id.as_raw(), 42);
        assert_eq!(id.index(), 42);
    }

    #[test]
    fn id_equality() {
        let a = NetId::from_raw(3);
        let b = NetId::from_raw(3);
        let c = NetId::from_raw(4);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn id_hash_in_set() {
        let mut set = HashSet::new();
        set.insert(PinId::from_raw(1));
        set.insert(PinId::from_raw(2));
        set.insert(PinId::from_raw(1));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn id_serde_roundtrip() {
        let id = SymGroupId::from_raw(55);
        let json = serde_json::to_string(&id).unwrap();
        let restored: SymGroupId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, restored);
    }

    #[test]
    fn id_display() {
        let id = ProximityGroupId::from_raw(7);
        assert_eq!(format!("{id}"), "7");
    }

    #[test]
    fn virtual_pin_id_roundtrip() {
        let id = VirtualPinId::from_raw(9);
        assert_eq!(id.as_raw(), 9);
        assert_eq!(id.index(), 9);
    }
}
