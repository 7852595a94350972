//! Viewport geometry
//!
//! Client-space rectangles and the containment predicate behind the polling
//! strategy. Coordinates are CSS pixels relative to the window's top-left
//! corner, as reported by `getBoundingClientRect()`.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in client coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const ZERO: Rect = Rect::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle anchored at the origin, e.g. the window viewport
    pub const fn from_size(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Translate by the given offset
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Grow each edge outward by the matching tolerance
    ///
    /// Negative tolerances shrink the rectangle, mirroring CSS margin syntax
    /// for an observer's root margin.
    pub fn inflate(&self, tolerance: &ViewportTolerance) -> Self {
        Self::new(
            self.x - tolerance.left,
            self.y - tolerance.top,
            self.width + tolerance.left + tolerance.right,
            self.height + tolerance.top + tolerance.bottom,
        )
    }

    /// Overlapping region, if the rectangles touch or overlap
    ///
    /// Edge-adjacent rectangles produce a zero-area intersection rather than
    /// `None`, matching how intersection observers treat touching boxes.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.left().max(other.left());
        let top = self.top().max(other.top());
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right >= left && bottom >= top {
            Some(Rect::new(left, top, right - left, bottom - top))
        } else {
            None
        }
    }
}

/// Per-edge pixel margin around the viewport
///
/// Positive values extend the effective viewport past its edge, so an element
/// counts as "in viewport" before it is actually visible.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportTolerance {
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
}

impl ViewportTolerance {
    /// Edges in CSS margin order: top, right, bottom, left
    pub const fn new(top: f64, right: f64, bottom: f64, left: f64) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    /// Same tolerance on all four edges
    pub const fn uniform(value: f64) -> Self {
        Self::new(value, value, value, value)
    }

    pub const fn top(value: f64) -> Self {
        Self::new(value, 0.0, 0.0, 0.0)
    }

    pub const fn bottom(value: f64) -> Self {
        Self::new(0.0, 0.0, value, 0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.top.is_finite()
            && self.left.is_finite()
            && self.bottom.is_finite()
            && self.right.is_finite()
    }
}

/// Whether `bounds` lies within `area`, allowing `tolerance` on each edge
///
/// Bottom and right edges are rounded to whole pixels on both sides, so
/// sub-pixel layout jitter does not flip the result.
pub fn is_in_viewport(bounds: &Rect, area: &Rect, tolerance: &ViewportTolerance) -> bool {
    bounds.top() + tolerance.top >= area.top()
        && bounds.left() + tolerance.left >= area.left()
        && bounds.bottom().round() - tolerance.bottom <= area.bottom().round()
        && bounds.right().round() - tolerance.right <= area.right().round()
}

/// Fraction of `target`'s area that lies inside `root`
///
/// Returns `None` when the rectangles do not touch. A zero-area target that
/// touches the root counts as fully inside.
pub fn intersection_ratio(target: &Rect, root: &Rect) -> Option<f64> {
    let overlap = target.intersection(root)?;
    let area = target.area();
    if area <= 0.0 {
        return Some(1.0);
    }
    Some((overlap.area() / area).clamp(0.0, 1.0))
}
