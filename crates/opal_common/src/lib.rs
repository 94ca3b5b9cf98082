//! Shared foundational types used across the Opal analog placement engine.
//!
//! This crate provides the integer geometry primitives the placement database
//! is built on ([`Point`], [`Rect`]) and the common result and error types
//! returned by every fallible placement operation.

#![warn(missing_docs)]

pub mod geom;
pub mod result;

pub use geom::{Point, Rect};
pub use result::{PlaceError, PlaceResult};
