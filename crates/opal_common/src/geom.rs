//! Integer geometry primitives for the placement database.
//!
//! Coordinates are signed 64-bit database units. Rectangles are closed on the
//! low edge and open on the high edge, so two abutting cells do not overlap.

use serde::{Deserialize, Serialize};

/// A point in database units.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: i64,
    /// Vertical coordinate.
    pub y: i64,
}

impl Point {
    /// Creates a point from its coordinates.
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in database units.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Rect {
    /// Low x edge.
    pub xlo: i64,
    /// Low y edge.
    pub ylo: i64,
    /// High x edge.
    pub xhi: i64,
    /// High y edge.
    pub yhi: i64,
}

impl Rect {
    /// Creates a rectangle from its edges.
    pub fn new(xlo: i64, ylo: i64, xhi: i64, yhi: i64) -> Self {
        Self { xlo, ylo, xhi, yhi }
    }

    /// The empty rectangle used as the identity for [`union`](Self::union).
    pub fn empty() -> Self {
        Self {
            xlo: i64::MAX,
            ylo: i64::MAX,
            xhi: i64::MIN,
            yhi: i64::MIN,
        }
    }

    /// Returns `true` if this rectangle is the empty identity.
    pub fn is_empty(&self) -> bool {
        self.xlo > self.xhi || self.ylo > self.yhi
    }

    /// Width of the rectangle.
    pub fn width(&self) -> i64 {
        self.xhi - self.xlo
    }

    /// Height of the rectangle.
    pub fn height(&self) -> i64 {
        self.yhi - self.ylo
    }

    /// Area of the rectangle; zero for the empty rectangle.
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width() * self.height()
        }
    }

    /// Center point, rounded down.
    pub fn center(&self) -> Point {
        Point::new((self.xlo + self.xhi) / 2, (self.ylo + self.yhi) / 2)
    }

    /// Grows this rectangle to contain `p`.
    pub fn join_point(&mut self, p: Point) {
        self.xlo = self.xlo.min(p.x);
        self.ylo = self.ylo.min(p.y);
        self.xhi = self.xhi.max(p.x);
        self.yhi = self.yhi.max(p.y);
    }

    /// Returns the union of two rectangles.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            xlo: self.xlo.min(other.xlo),
            ylo: self.ylo.min(other.ylo),
            xhi: self.xhi.max(other.xhi),
            yhi: self.yhi.max(other.yhi),
        }
    }

    /// Expands all four edges outward by `amount`.
    pub fn expand(&self, amount: i64) -> Rect {
        Rect {
            xlo: self.xlo - amount,
            ylo: self.ylo - amount,
            xhi: self.xhi + amount,
            yhi: self.yhi + amount,
        }
    }

    /// Length of the overlap of the two x projections; zero when disjoint or abutting.
    pub fn overlap_x(&self, other: &Rect) -> i64 {
        (self.xhi.min(other.xhi) - self.xlo.max(other.xlo)).max(0)
    }

    /// Length of the overlap of the two y projections; zero when disjoint or abutting.
    pub fn overlap_y(&self, other: &Rect) -> i64 {
        (self.yhi.min(other.yhi) - self.ylo.max(other.ylo)).max(0)
    }

    /// Area of the intersection of two rectangles.
    pub fn overlap_area(&self, other: &Rect) -> i64 {
        self.overlap_x(other) * self.overlap_y(other)
    }

    /// Returns `true` if `other` lies entirely inside this rectangle.
    pub fn contains(&self, other: &Rect) -> bool {
        self.xlo <= other.xlo && self.ylo <= other.ylo && self.xhi >= other.xhi && self.yhi >= other.yhi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_height_area() {
        let r = Rect::new(0, 0, 10, 20);
        assert_eq!(r.width(), 10);
        assert_eq!(r.height(), 20);
        assert_eq!(r.area(), 200);
    }

    #[test]
    fn empty_rect() {
        let r = Rect::empty();
        assert!(r.is_empty());
        assert_eq!(r.area(), 0);
    }

    #[test]
    fn join_point_grows() {
        let mut r = Rect::empty();
        r.join_point(Point::new(3, 4));
        r.join_point(Point::new(-1, 10));
        assert_eq!(r, Rect::new(-1, 4, 3, 10));
    }

    #[test]
    fn union_covers_both() {
        let a = Rect::new(0, 0, 5, 5);
        let b = Rect::new(3, -2, 8, 4);
        assert_eq!(a.union(&b), Rect::new(0, -2, 8, 5));
    }

    #[test]
    fn expand_moves_all_edges() {
        let r = Rect::new(0, 0, 10, 10).expand(3);
        assert_eq!(r, Rect::new(-3, -3, 13, 13));
    }

    #[test]
    fn overlap_lengths() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(6, 8, 20, 20);
        assert_eq!(a.overlap_x(&b), 4);
        assert_eq!(a.overlap_y(&b), 2);
        assert_eq!(a.overlap_area(&b), 8);
    }

    #[test]
    fn abutting_cells_do_not_overlap() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(10, 0, 20, 10);
        assert_eq!(a.overlap_x(&b), 0);
        assert_eq!(a.overlap_area(&b), 0);
    }

    #[test]
    fn contains_inner_rect() {
        let outer = Rect::new(0, 0, 100, 100);
        let inner = Rect::new(10, 10, 20, 20);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
    }

    #[test]
    fn center_point() {
        let r = Rect::new(0, 0, 10, 20);
        assert_eq!(r.center(), Point::new(5, 10));
    }

    #[test]
    fn serde_roundtrip() {
        let r = Rect::new(-5, 0, 7, 9);
        let json = serde_json::to_string(&r).unwrap();
        let back: Rect = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
    }
}
