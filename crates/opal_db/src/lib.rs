//! Placement database for the Opal analog placement engine.
//!
//! This crate defines the design snapshot the placer operates on: cells
//! (rectangular blocks with mutable lower-left coordinates), pins (offset
//! rectangles inside cells), nets (pin lists with symmetry and IO
//! attributes), symmetry groups, proximity groups, and the placer
//! configuration. The [`PlaceDb`] is constructed by the caller, mutated only
//! at the placement pipeline's handoff points, and read back afterwards.

#![warn(missing_docs)]

pub mod data;
pub mod ids;
pub mod params;

pub use data::{
    Cell, Direction, Net, PlaceDb, ProximityGroup, Pin, SymGroup, VirtualPin,
};
pub use ids::{CellId, NetId, PinId, ProximityGroupId, SymGroupId, VirtualPinId};
pub use params::PlacerParams;
